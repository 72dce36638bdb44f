//! Running external tools with a deadline.

use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub(crate) enum ToolError {
    #[error("failed to start: {0}")]
    Spawn(io::Error),

    #[error("waiting failed: {0}")]
    Wait(io::Error),

    #[error("no exit within {0:?}")]
    TimedOut(Duration),
}

pub(crate) fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Run `command` with null stdio, killing it at the deadline
pub(crate) fn run_with_deadline(
    command: &mut Command,
    timeout: Duration,
) -> Result<ExitStatus, ToolError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(ToolError::Spawn)?;
    wait_with_deadline(&mut child, timeout)
}

/// Run `command` and collect its stdout, killing it at the deadline
pub(crate) fn output_with_deadline(
    command: &mut Command,
    timeout: Duration,
) -> Result<(ExitStatus, Vec<u8>), ToolError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(ToolError::Spawn)?;

    // Drain stdout on its own thread so a full pipe cannot stall the child
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stdout.read_to_end(&mut buffer);
            buffer
        })
    });

    let status = wait_with_deadline(&mut child, timeout)?;
    let stdout = reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();
    Ok((status, stdout))
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<ExitStatus, ToolError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::TimedOut(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Wait(e));
            }
        }
    }
}
