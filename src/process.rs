// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-over-stdio helper processes with a bounded runtime.

use serde_json::Value;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs `sh -c <command>`, writes `payload` to its stdin and parses stdout as JSON.
///
/// The child is killed if it has not exited after `timeout`. Output must also
/// be complete by then: a background process still holding the pipes past
/// the deadline counts as a timeout.
pub fn run_json_command(
    command: &str,
    payload: &Value,
    timeout: Duration,
) -> Result<Value, CommandError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    // Written from a thread so a child that does not drain stdin cannot
    // block us past the deadline.
    let stdin = child.stdin.take();
    let payload_str = payload.to_string();
    let writer = thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(payload_str.as_bytes())?;
        }
        Ok(())
    });

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = wait_with_deadline(&mut child, command, deadline, timeout)?;
    let stdout = collect_output(&stdout_reader, command, deadline, timeout)?;
    let stderr = collect_output(&stderr_reader, command, deadline, timeout)?;
    if let Ok(Err(err)) = writer.join() {
        debug!(command, "helper process did not read its input: {}", err);
    }

    if !status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&stdout);
    debug!(command, bytes = stdout.len(), "helper process finished");
    serde_json::from_str(stdout.trim()).map_err(|err| CommandError::InvalidOutput {
        command: command.to_string(),
        message: err.to_string(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect_output(
    reader: &Receiver<Vec<u8>>,
    command: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>, CommandError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match reader.recv_timeout(remaining) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        Err(RecvTimeoutError::Timeout) => Err(CommandError::Timeout {
            command: command.to_string(),
            timeout,
        }),
    }
}

fn wait_with_deadline(
    child: &mut Child,
    command: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<std::process::ExitStatus, CommandError> {
    loop {
        let polled = child.try_wait().map_err(|source| CommandError::Io {
            command: command.to_string(),
            source,
        })?;
        if let Some(status) = polled {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::Timeout {
                command: command.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}
