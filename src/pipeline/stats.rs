use super::{HeadcastPipeline, PipelineStats};
use crate::events::HeadcastEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

impl HeadcastPipeline {
    /// Snapshot of every component
    pub async fn get_stats(&self) -> PipelineStats {
        let (tracker, gesture) = {
            let session = self.tracking.lock().await;
            (session.tracker.stats(), session.gestures.stats())
        };
        let active_profile = self.active_profile.read().name.clone();

        PipelineStats {
            active_profile,
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            components: self.get_all_component_states().await,
            capture: self.capture.stats(),
            relay: self.relay.stats(),
            stream: self.broadcaster.stats(),
            tracker,
            gesture,
            injection: self.dispatcher.stats(),
        }
    }

    /// Publish a performance update every `stats_interval_seconds`
    ///
    /// Stops with the pipeline's cancellation token.
    pub fn spawn_performance_reporter(self: &Arc<Self>) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        let period = Duration::from_secs(self.config.system.stats_interval_seconds.max(1));
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            info!("Performance reporter running every {:?}", period);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let stats = pipeline.get_stats().await;
                        debug!(
                            "Capture {:.1}fps, stream {:.1}fps, {} viewers, relay drops {}",
                            stats.capture.fps,
                            stats.stream.fps,
                            stats.stream.viewers,
                            stats.relay.frames_dropped
                        );
                        let _ = pipeline.event_bus.publish(HeadcastEvent::PerformanceUpdate {
                            capture_fps: stats.capture.fps,
                            stream_fps: stats.stream.fps,
                            viewers: stats.stream.viewers,
                            injection_rate: stats.injection.actions_per_sec,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
            debug!("Performance reporter stopped");
        })
    }
}
