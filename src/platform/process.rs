//! External process execution with a wall-clock timeout

use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::CerberusError;
use crate::Result;

/// How a child's stdout and stderr are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Collect both streams into the returned `Output`
    Capture,
    /// Let the child write straight to this process's console
    Inherit,
}

/// Run `program` to completion, killing it once `limit` elapses.
///
/// A program that cannot be found is a `MissingDependency`; a timeout is an
/// `ExternalTool` error. A nonzero exit is returned as-is in the `Output`.
pub async fn run_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
    mode: OutputMode,
) -> Result<Output> {
    debug!("Running {} {}", program, args.join(" "));

    let (out, err) = match mode {
        OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
        OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(out)
        .stderr(err)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                CerberusError::MissingDependency(format!("{} not found on PATH", program))
            }
            _ => CerberusError::ExternalTool(format!("Failed to start {}: {}", program, e)),
        })?;

    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).await.map(|_| buf)
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).await.map(|_| buf)
        })
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status?;
            let stdout = collect(stdout_task).await?;
            let stderr = collect(stderr_task).await?;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            Err(CerberusError::ExternalTool(format!(
                "{} timed out after {}s",
                program,
                limit.as_secs()
            )))
        }
    }
}

async fn collect(
    task: Option<tokio::task::JoinHandle<std::io::Result<Vec<u8>>>>,
) -> Result<Vec<u8>> {
    match task {
        Some(handle) => handle
            .await
            .map_err(|e| CerberusError::ExternalTool(format!("Output reader failed: {}", e)))?
            .map_err(CerberusError::from),
        None => Ok(Vec::new()),
    }
}

/// First `limit` bytes of a child's stderr, lossily decoded
pub fn stderr_excerpt(output: &Output, limit: usize) -> String {
    let end = output.stderr.len().min(limit);
    String::from_utf8_lossy(&output.stderr[..end]).trim().to_string()
}
