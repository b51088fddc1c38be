//! Task processor for handling individual reconstruction tasks

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, SplatError};
use crate::hub::RemoteStore;
use crate::reconstruct::{find_artifact, Reconstructor};
use crate::tasks::Task;
use crate::worker::WorkerConfig;

/// Task processor that stages inputs, runs the tool and uploads the result
pub struct TaskProcessor {
    config: WorkerConfig,
    store: Arc<dyn RemoteStore>,
    reconstructor: Arc<dyn Reconstructor>,
}

impl TaskProcessor {
    /// Create a new task processor
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn RemoteStore>,
        reconstructor: Arc<dyn Reconstructor>,
    ) -> Self {
        Self {
            config,
            store,
            reconstructor,
        }
    }

    /// Process a single task.
    ///
    /// Returns the remote path of the uploaded artifact on success. The task
    /// record itself is not mutated here; the runner commits status changes.
    pub async fn process(&self, task: &Task) -> Result<String> {
        let id = task.id.dir_name()?;
        info!("Processing task {}: {}", id, task.photo_path);

        // Step 1: fresh, isolated workspace for this attempt
        let (input_dir, output_dir) = self.stage_workspace(&id).await?;

        // Step 2: fetch the source image and flatten it into the input dir.
        // The tool requires its inputs in a flat directory it fully controls,
        // while the cache mirrors the repo layout (e.g. inputs/xxx.jpg).
        let cached = self.store.download_file(&task.photo_path).await?;
        let file_name = cached
            .file_name()
            .ok_or_else(|| SplatError::ConfigError(format!("no file name in {}", cached.display())))?
            .to_owned();
        tokio::fs::copy(&cached, input_dir.join(&file_name)).await?;
        info!("Staged input image: {}", file_name.to_string_lossy());

        // Step 3: run the reconstruction tool
        info!("Running 3D reconstruction...");
        self.reconstructor.predict(&input_dir, &output_dir).await?;

        // Step 4: locate the produced model
        let artifact = find_artifact(&output_dir, &self.config.artifact_extension)?;
        info!("Found model file: {}", artifact.display());

        // Step 5: upload under a path derived from the task id
        let remote_path = format!("outputs/{}.{}", id, self.config.artifact_extension);
        self.store.upload_file(&artifact, &remote_path).await?;
        info!("Uploaded result: {}", remote_path);

        // Work directory intentionally left behind for inspection
        Ok(remote_path)
    }

    /// Create a clean `input`/`output` pair for the given task id.
    ///
    /// Any prior workspace for the same id is deleted first, so a retry
    /// never sees leftovers from an earlier partial attempt.
    pub async fn stage_workspace(&self, id: &str) -> Result<(PathBuf, PathBuf)> {
        let task_dir = self.config.work_dir.join(id);
        if task_dir.exists() {
            tokio::fs::remove_dir_all(&task_dir).await?;
        }

        let input_dir = task_dir.join("input");
        let output_dir = task_dir.join("output");
        tokio::fs::create_dir_all(&input_dir).await?;
        tokio::fs::create_dir_all(&output_dir).await?;

        Ok((input_dir, output_dir))
    }
}
