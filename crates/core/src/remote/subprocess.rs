//! Child-process runner shared by the local and SSH transports.
//!
//! Spawns a prepared [`tokio::process::Command`], optionally feeds stdin,
//! captures stdout/stderr and enforces the timeout. A timed-out child is
//! killed and reported as a [`CommandOutcome`] with `timed_out = true`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::CommandOutcome;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How long to keep reading output after a timed-out child is killed.
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Spawn `cmd`, write `stdin` (if any), and wait up to `timeout`.
///
/// The caller sets the program, arguments, environment and working
/// directory. Returns `Err` only if the process could not be spawned or
/// waited on.
pub async fn run_command(
    cmd: &mut Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutcome, std::io::Error> {
    // `kill_on_drop(true)` kills the child when dropped on timeout.
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), stdin) {
        // Best-effort write; the process may close stdin early.
        let _ = pipe.write_all(bytes).await;
        drop(pipe);
    }

    // Read the streams in tasks so `child.wait()` can borrow `child`.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = tokio::time::timeout(timeout, child.wait()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match wait_result {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            Ok(CommandOutcome {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                duration_ms,
                timed_out: false,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => {
            let _ = child.kill().await;
            // Grandchildren may still hold the pipes open; don't wait on them.
            let stdout_bytes = tokio::time::timeout(DRAIN_AFTER_KILL, stdout_task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            let stderr_bytes = tokio::time::timeout(DRAIN_AFTER_KILL, stderr_task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            Ok(CommandOutcome {
                exit_code: None,
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                duration_ms,
                timed_out: true,
            })
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
