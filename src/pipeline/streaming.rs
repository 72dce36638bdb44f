use super::{ComponentState, HeadcastPipeline};
use crate::capture::CaptureMethod;
use crate::error::{HeadcastError, Result};
use crate::events::HeadcastEvent;
use crate::streaming::{ChannelSession, ControlMessage, ControlReply, EncodedFrame, ViewerSession};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{error, info, warn};

impl HeadcastPipeline {
    /// Change capture resolution, rate and monitor
    pub fn configure_capture(
        &self,
        width: u32,
        height: u32,
        fps: u32,
        monitor_index: u32,
    ) -> Result<()> {
        Ok(self.capture.configure(width, height, fps, monitor_index)?)
    }

    /// Change stream resolution, rate and JPEG quality
    pub fn configure_stream(&self, width: u32, height: u32, fps: u32, quality: i64) -> Result<()> {
        Ok(self.broadcaster.configure(width, height, fps, quality)?)
    }

    /// Start capture, then broadcast
    ///
    /// Capture backend selection blocks, so it runs off the async runtime.
    /// If broadcast fails to start, capture is stopped again.
    pub async fn start_streaming(&self) -> Result<CaptureMethod> {
        self.set_component_state("capture", ComponentState::Starting)
            .await;

        let capture = Arc::clone(&self.capture);
        let started = task::spawn_blocking(move || capture.start())
            .await
            .map_err(|e| HeadcastError::component("capture", e.to_string()))?;

        let method = match started {
            Ok(method) => method,
            Err(e) => {
                self.set_component_state("capture", ComponentState::Failed)
                    .await;
                error!("Failed to start capture: {}", e);
                let _ = self.event_bus.publish(HeadcastEvent::SystemError {
                    component: "capture".to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        self.set_component_state("capture", ComponentState::Running)
            .await;

        self.set_component_state("stream", ComponentState::Starting)
            .await;
        if let Err(e) = self.broadcaster.start(self.capture.relay()) {
            self.set_component_state("stream", ComponentState::Failed)
                .await;
            error!("Failed to start broadcaster: {}", e);
            let _ = self.event_bus.publish(HeadcastEvent::SystemError {
                component: "stream".to_string(),
                error: e.to_string(),
            });
            self.stop_capture().await;
            return Err(e);
        }
        self.set_component_state("stream", ComponentState::Running)
            .await;

        let stream = self.broadcaster.stats();
        let _ = self.event_bus.publish(HeadcastEvent::StreamingStarted {
            width: stream.width,
            height: stream.height,
            fps: stream.target_fps,
            timestamp: Utc::now(),
        });
        Ok(method)
    }

    /// Stop broadcast, then capture
    pub async fn stop_streaming(&self) -> Result<()> {
        let was_running = self.broadcaster.is_running() || self.capture.is_running();

        self.set_component_state("stream", ComponentState::Stopping)
            .await;
        let broadcaster = Arc::clone(&self.broadcaster);
        task::spawn_blocking(move || broadcaster.stop())
            .await
            .map_err(|e| HeadcastError::component("stream", e.to_string()))?;
        self.set_component_state("stream", ComponentState::Stopped)
            .await;

        self.stop_capture().await;

        if was_running {
            let _ = self.event_bus.publish(HeadcastEvent::StreamingStopped {
                reason: "requested".to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn stop_capture(&self) {
        self.set_component_state("capture", ComponentState::Stopping)
            .await;
        let capture = Arc::clone(&self.capture);
        match task::spawn_blocking(move || capture.stop()).await {
            Ok(()) => {
                self.set_component_state("capture", ComponentState::Stopped)
                    .await
            }
            Err(e) => {
                warn!("Capture stop task failed: {}", e);
                self.set_component_state("capture", ComponentState::Failed)
                    .await
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.broadcaster.is_running()
    }

    /// Register a viewer; returns the viewer count
    pub fn add_session(&self, session: Arc<dyn ViewerSession>) -> usize {
        self.broadcaster.add_session(session)
    }

    /// Create a channel-backed viewer sized by the configured buffer
    pub fn open_channel_session(&self) -> (String, mpsc::Receiver<Arc<EncodedFrame>>) {
        let (session, receiver) = ChannelSession::new(self.config.stream.session_buffer);
        let id = session.id().to_string();
        self.broadcaster.add_session(Arc::new(session));
        info!("Channel session {} opened", id);
        (id, receiver)
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        self.broadcaster.remove_session(session_id)
    }

    /// Apply a viewer control message given as JSON text
    pub fn handle_control_message(&self, text: &str) -> Result<ControlReply> {
        let message = ControlMessage::parse(text)?;
        Ok(self.broadcaster.handle_control(&message)?)
    }
}
