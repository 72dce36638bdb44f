use super::{ComponentState, HeadcastPipeline};
use crate::error::{HeadcastError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

/// Upper bound for one component to stop
const COMPONENT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl HeadcastPipeline {
    /// Stop every component: injection first, then broadcast and capture
    ///
    /// Returns the process exit code; 1 when any component failed to stop
    /// in time.
    pub async fn shutdown(&self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Err(e) = self.stop_component("tracking").await {
            error!("Error stopping tracking: {}", e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_component("streaming").await {
            error!("Error stopping streaming: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);

        let stopped = match component {
            "tracking" => timeout(COMPONENT_STOP_TIMEOUT, async {
                self.stop_tracking().await;
                Ok::<(), HeadcastError>(())
            })
            .await,
            "streaming" => {
                // Each worker already bounds its own join; allow for both
                timeout(
                    COMPONENT_STOP_TIMEOUT.max(self.stop_timeout() * 2),
                    self.stop_streaming(),
                )
                .await
            }
            other => {
                return Err(HeadcastError::system(format!(
                    "Unknown component '{}'",
                    other
                )))
            }
        };

        match stopped {
            Ok(Ok(())) => {
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(HeadcastError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
