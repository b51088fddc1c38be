//! External 3D reconstruction tool invocation
//!
//! The reconstruction itself is an opaque external CLI (`sharp`), invoked as
//! `sharp predict -i <input_dir> -o <output_dir>`. It reads images placed
//! flat in the input directory and writes one `.ply` model into the output
//! directory. A hung tool would otherwise block the poll loop forever, so
//! the child runs under a timeout and is killed when it fires.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Result, SplatError};

/// Maximum stderr captured from the tool (1 MiB)
const MAX_STDERR_BYTES: usize = 1024 * 1024;

/// Reconstruction step of the task pipeline
#[async_trait]
pub trait Reconstructor: Send + Sync {
    /// Run the tool over a flat input directory, writing into `output_dir`
    async fn predict(&self, input_dir: &Path, output_dir: &Path) -> Result<()>;
}

/// `sharp predict` subprocess wrapper
pub struct SharpCommand {
    program: String,
    timeout: Duration,
}

impl SharpCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Reconstructor for SharpCommand {
    async fn predict(&self, input_dir: &Path, output_dir: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("predict")
            .arg("-i")
            .arg(input_dir)
            .arg("-o")
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            // Killed when dropped, which is how the timeout path reaps it
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SplatError::ToolNotFound(self.program.clone())
            } else {
                SplatError::FsError(e)
            }
        })?;

        let stderr_handle = child.stderr.take();
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let elapsed = start.elapsed();
                if status.success() {
                    info!("Reconstruction finished in {:.2}s", elapsed.as_secs_f64());
                    Ok(())
                } else {
                    let stderr_bytes = stderr_task.await.unwrap_or_default();
                    Err(SplatError::ToolFailed {
                        code: status.code().unwrap_or(-1),
                        stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
                    })
                }
            }
            Ok(Err(e)) => Err(SplatError::FsError(e)),
            Err(_elapsed) => {
                // Dropping `child` kills the process via kill_on_drop
                Err(SplatError::ToolTimeout {
                    elapsed_secs: start.elapsed().as_secs(),
                })
            }
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_STDERR_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

/// Find the model artifact the tool produced.
///
/// The tool is expected to emit exactly one file with the model extension.
/// If it ever emits several, the lexicographically first is taken so the
/// choice is at least deterministic, and the situation is logged.
pub fn find_artifact(output_dir: &Path, extension: &str) -> Result<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();

    matches.sort();

    match matches.len() {
        0 => Err(SplatError::NoArtifact {
            dir: output_dir.to_path_buf(),
            extension: extension.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        n => {
            warn!(
                "Tool produced {} .{} files in {}; taking the first by name",
                n,
                extension,
                output_dir.display()
            );
            Ok(matches.remove(0))
        }
    }
}
