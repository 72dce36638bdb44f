use super::{HeadcastPipeline, ShutdownReason};
use crate::error::{HeadcastError, Result};
use crate::events::HeadcastEvent;
use chrono::Utc;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

impl HeadcastPipeline {
    /// Run until a shutdown signal or request arrives, then shut down
    ///
    /// Starts the performance reporter and, when configured, tracking.
    /// Streaming is started by the caller.
    pub async fn run(self: &Arc<Self>) -> Result<i32> {
        info!("Headcast pipeline is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .lock()
            .take()
            .ok_or_else(|| HeadcastError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();
        let reporter = self.spawn_performance_reporter();

        if self.config.tracking.auto_start {
            if let Err(e) = self.start_tracking().await {
                warn!("Head tracking not started: {}", e);
            }
        }

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| HeadcastError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);
        let _ = self.event_bus.publish(HeadcastEvent::ShutdownRequested {
            reason: format!("{:?}", shutdown_reason),
            timestamp: Utc::now(),
        });

        let exit_code = self.shutdown().await?;
        if let Err(e) = reporter.await {
            warn!("Performance reporter ended abnormally: {}", e);
        }

        info!("Headcast pipeline shutdown complete");
        Ok(exit_code)
    }

    /// Ask a running pipeline to shut down; false if already requested
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }

    fn setup_signal_handlers(self: &Arc<Self>) {
        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let pipeline = Arc::clone(self);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    pipeline.request_shutdown(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                pipeline.request_shutdown(ShutdownReason::Signal("SIGINT".to_string()));
            }
        });
    }
}
