//! External process execution with a hard timeout and bounded output capture.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

const READ_CHUNK: usize = 8 * 1024;

/// Limits applied to one invocation.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Stdout larger than this fails the invocation.
    pub max_stdout_bytes: usize,
    /// Only the last `max_stderr_bytes` of stderr are kept.
    pub max_stderr_bytes: usize,
}

impl ProcessLimits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_stdout_bytes: 10 * 1024 * 1024,
            max_stderr_bytes: 64 * 1024,
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Spawn `binary` with `args` and wait for it under `limits`.
///
/// The child is killed when the timeout fires and also when the returned
/// future is dropped, so an outer job timeout aborts the process too.
pub async fn run_process(
    tool: &'static str,
    binary: &Path,
    args: &[String],
    limits: ProcessLimits,
) -> MediaResult<ProcessOutput> {
    debug!("Running {}: {} {}", tool, binary.display(), args.join(" "));
    let started = Instant::now();

    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::ToolNotFound {
                    tool,
                    path: binary.to_path_buf(),
                }
            } else {
                MediaError::Io(e)
            }
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("stderr not captured"))?;

    let stdout_task = tokio::spawn(read_limited(stdout, limits.max_stdout_bytes));
    let stderr_task = tokio::spawn(read_tail(stderr, limits.max_stderr_bytes));

    let status = match tokio::time::timeout(limits.timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            warn!(
                "{} timed out after {:?}, killing process",
                tool, limits.timeout
            );
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(MediaError::Timeout {
                tool,
                elapsed: started.elapsed(),
            });
        }
    };

    let stdout = stdout_task
        .await
        .map_err(|e| MediaError::internal(format!("stdout reader failed: {}", e)))??;
    let stderr = stderr_task
        .await
        .map_err(|e| MediaError::internal(format!("stderr reader failed: {}", e)))??;

    let stdout = match stdout {
        Some(bytes) => bytes,
        None => {
            return Err(MediaError::ResourceLimit(format!(
                "{} stdout exceeded {} bytes",
                tool, limits.max_stdout_bytes
            )))
        }
    };

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        elapsed: started.elapsed(),
    })
}

/// Read everything, returning `None` once more than `limit` bytes arrive.
/// Keeps draining past the limit so the child never blocks on a full pipe.
async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut overflowed = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if overflowed {
            continue;
        }
        if buf.len() + n > limit {
            overflowed = true;
            buf.clear();
            continue;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(if overflowed { None } else { Some(buf) })
}

/// Read everything, keeping only the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > limit {
            let excess = buf.len() - limit;
            buf.drain(..excess);
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_tail_keeps_last_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();
        let tail = read_tail(&data[..], 100).await.unwrap();
        assert_eq!(tail.len(), 100);
        assert_eq!(&tail[..], &data[data.len() - 100..]);
    }

    #[tokio::test]
    async fn test_read_limited_overflow() {
        let data = vec![1u8; 1000];
        assert_eq!(read_limited(&data[..], 2000).await.unwrap().map(|b| b.len()), Some(1000));
        assert!(read_limited(&data[..], 999).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary() {
        let result = run_process(
            "ffmpeg",
            Path::new("/nonexistent/ffmpeg-binary"),
            &[],
            ProcessLimits::new(Duration::from_secs(1)),
        )
        .await;
        assert!(matches!(result, Err(MediaError::ToolNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let result = run_process(
            "sleep",
            Path::new("sleep"),
            &["5".to_string()],
            ProcessLimits::new(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(MediaError::Timeout { tool: "sleep", .. })));
    }
}
