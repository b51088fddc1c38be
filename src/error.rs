//! Error types for splat-node

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplatError {
    #[error("Failed to fetch {path} from hub")]
    FetchError {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {path}")]
    HttpStatusError { path: String, status: u16 },

    #[error("Failed to upload {path} to hub: {message}")]
    UploadError { path: String, message: String },

    #[error("Task list changed on the hub since it was read (expected revision {expected})")]
    TaskListConflict { expected: String },

    #[error("Reconstruction tool not found: {0}")]
    ToolNotFound(String),

    #[error("Reconstruction tool exited with status {code}: {stderr}")]
    ToolFailed { code: i32, stderr: String },

    #[error("Reconstruction tool timed out after {elapsed_secs}s")]
    ToolTimeout { elapsed_secs: u64 },

    #[error("No .{extension} artifact found in {dir}")]
    NoArtifact { dir: PathBuf, extension: String },

    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("File system error")]
    FsError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SplatError>;
