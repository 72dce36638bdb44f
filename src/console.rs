use crate::error::Result;
use crate::events::{EventBus, EventFilter, EventReceiver};
use crate::pipeline::{HeadcastPipeline, ShutdownReason};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operator command bound to a console key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Calibrate,
    Reset,
    ToggleTracking,
    NextProfile,
    Quit,
}

impl ConsoleCommand {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(Self::Calibrate),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(Self::Reset),
            KeyCode::Char('t') | KeyCode::Char('T') => Some(Self::ToggleTracking),
            KeyCode::Char('p') | KeyCode::Char('P') => Some(Self::NextProfile),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Run one console command against the pipeline
pub async fn execute(pipeline: &HeadcastPipeline, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Calibrate => {
            let calibration = pipeline.calibrate().await?;
            info!(
                "Calibrated at yaw {:.3}, pitch {:.3}",
                calibration.yaw_offset, calibration.pitch_offset
            );
        }
        ConsoleCommand::Reset => pipeline.reset_tracking().await,
        ConsoleCommand::ToggleTracking => {
            if pipeline.is_tracking().await {
                pipeline.stop_tracking().await;
                info!("Head tracking paused");
            } else {
                let surface = pipeline.start_tracking().await?;
                info!("Head tracking resumed on {}", surface);
            }
        }
        ConsoleCommand::NextProfile => {
            let next = next_profile(&pipeline.profile_names(), &pipeline.active_profile().name);
            if let Some(name) = next {
                pipeline.switch_profile(&name).await?;
            }
        }
        ConsoleCommand::Quit => {
            pipeline.request_shutdown(ShutdownReason::UserRequest);
        }
    }
    Ok(())
}

/// Events echoed to the operator while the console is active
pub const OPERATOR_EVENTS: [&str; 7] = [
    "gesture_fired",
    "profile_switched",
    "tracking_calibrated",
    "tracking_reset",
    "session_added",
    "session_removed",
    "system_error",
];

/// Receiver for the events an operator cares about
pub fn operator_feed(event_bus: &EventBus) -> EventReceiver {
    EventReceiver::new(
        event_bus.subscribe(),
        EventFilter::EventTypes(OPERATOR_EVENTS.to_vec()),
        "operator-console",
    )
}

/// Profile following `current` in sorted order, wrapping around
fn next_profile(names: &[String], current: &str) -> Option<String> {
    let mut sorted = names.to_vec();
    sorted.sort();
    if sorted.is_empty() {
        return None;
    }
    let index = sorted
        .iter()
        .position(|name| name == current)
        .map(|i| (i + 1) % sorted.len())
        .unwrap_or(0);
    Some(sorted[index].clone())
}

/// Raw-mode terminal hotkeys for a local operator
pub struct OperatorConsole {
    pipeline: Arc<HeadcastPipeline>,
    cancellation_token: CancellationToken,
}

impl OperatorConsole {
    pub fn new(pipeline: Arc<HeadcastPipeline>) -> Self {
        Self {
            pipeline,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the key listener and echo operator events to the log
    pub fn start(&self) {
        info!("Operator console active: c=calibrate r=reset t=tracking p=profile q=quit");

        let mut feed = operator_feed(self.pipeline.event_bus());
        let feed_cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = feed_cancel.cancelled() => break,
                    event = feed.recv() => match event {
                        Ok(event) => info!("[console] {}", event.description()),
                        Err(_) => break,
                    },
                }
            }
        });

        let pipeline = Arc::clone(&self.pipeline);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for the operator console: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key_event = match event::read() {
                            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                                key_event
                            }
                            _ => continue,
                        };
                        let Some(command) = ConsoleCommand::from_key(key_event.code) else {
                            debug!("Unbound key: {:?}", key_event.code);
                            continue;
                        };

                        let pipeline = Arc::clone(&pipeline);
                        runtime_handle.spawn(async move {
                            if let Err(e) = execute(&pipeline, command).await {
                                warn!("Console command {:?} failed: {}", command, e);
                            }
                        });
                        if command == ConsoleCommand::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for console keys: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Operator console exited");
        });
    }

    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        // Let the polling task restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
    }
}
