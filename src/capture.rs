use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

/// Last bytes of stderr kept for the failure message
const STDERR_TAIL: usize = 4096;

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub input_url: String,
    pub output: PathBuf,
    /// Passed as `-t`, unbounded when `None`
    pub duration_seconds: Option<i64>,
}

/// A running capture subprocess
#[async_trait]
pub trait CaptureProcess: Send {
    /// Resolves with the exit code once the process is gone; `None` when killed by a signal.
    /// Must be cancel safe.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Ask for a graceful shutdown without waiting for it
    async fn request_stop(&mut self) -> std::io::Result<()>;

    async fn kill(&mut self) -> std::io::Result<()>;

    /// Captured diagnostic output, possibly truncated
    fn stderr(&self) -> String;
}

#[async_trait]
pub trait CaptureTool: Send + Sync {
    async fn spawn(&self, req: &CaptureRequest) -> Result<Box<dyn CaptureProcess>>;
}

/// Graceful stop, force-kill once `timeout` elapses
pub async fn stop_with_timeout(
    process: &mut dyn CaptureProcess,
    timeout: Duration,
) -> std::io::Result<Option<i32>> {
    if let Err(e) = process.request_stop().await {
        debug!("[capture] stop request failed: {}", e);
    }
    match tokio::time::timeout(timeout, process.wait()).await {
        Ok(exit) => exit,
        Err(_) => {
            warn!("[capture] no exit {:?} after stop request, killing", timeout);
            process.kill().await?;
            process.wait().await
        }
    }
}

pub struct FfmpegCapture {
    ffmpeg: String,
}

impl FfmpegCapture {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn args(req: &CaptureRequest) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            req.input_url.clone(),
            "-c".to_string(),
            "copy".to_string(),
        ];
        if let Some(seconds) = req.duration_seconds.filter(|s| *s > 0) {
            args.push("-t".to_string());
            args.push(seconds.to_string());
        }
        args.push(req.output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl CaptureTool for FfmpegCapture {
    async fn spawn(&self, req: &CaptureRequest) -> Result<Box<dyn CaptureProcess>> {
        let args = Self::args(req);
        debug!("[capture] {} {}", self.ffmpeg, args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("spawn {}: {}", self.ffmpeg, e))?;

        let stdin = child.stdin.take();
        let stderr = Arc::new(Mutex::new(String::new()));
        if let Some(pipe) = child.stderr.take() {
            let sink = stderr.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                    push_tail(&mut buf, &line);
                }
            });
        }

        Ok(Box::new(FfmpegProcess {
            child,
            stdin,
            stderr,
        }))
    }
}

struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Arc<Mutex<String>>,
}

#[async_trait]
impl CaptureProcess for FfmpegProcess {
    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn request_stop(&mut self) -> std::io::Result<()> {
        // ffmpeg finishes the container and exits on `q`
        match self.stdin.take() {
            Some(mut stdin) => {
                stdin.write_all(b"q").await?;
                stdin.flush().await
            }
            None => Ok(()),
        }
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    fn stderr(&self) -> String {
        self.stderr
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn push_tail(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
    if buf.len() > STDERR_TAIL {
        let mut cut = buf.len() - STDERR_TAIL;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

/// Joins the files listed in a concat manifest into one output
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()>;
}

pub struct FfmpegConcat {
    ffmpeg: String,
    timeout: Duration,
}

impl FfmpegConcat {
    pub fn new(ffmpeg: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Concatenator for FfmpegConcat {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let out = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("concat timed out after {:?}", self.timeout))??;

        if out.status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "concat exited with {:?}: {}",
                out.status.code(),
                String::from_utf8_lossy(&out.stderr).trim()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args_with_duration() {
        let req = CaptureRequest {
            input_url: "http://proxy/stream/abc".to_string(),
            output: PathBuf::from("/tmp/rec/segment_001.ts"),
            duration_seconds: Some(3900),
        };
        let args = FfmpegCapture::args(&req);
        let joined = args.join(" ");
        assert!(joined.contains("-i http://proxy/stream/abc -c copy -t 3900"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/rec/segment_001.ts"));
    }

    #[test]
    fn test_capture_args_without_duration() {
        let req = CaptureRequest {
            input_url: "http://proxy/stream/abc".to_string(),
            output: PathBuf::from("out.ts"),
            duration_seconds: None,
        };
        assert!(!FfmpegCapture::args(&req).contains(&"-t".to_string()));
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut buf = String::new();
        for _ in 0..1000 {
            push_tail(&mut buf, "Connection reset by peer");
        }
        assert!(buf.len() <= STDERR_TAIL);
        assert!(buf.ends_with("Connection reset by peer"));
    }
}
