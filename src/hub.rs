//! Dataset hub client
//!
//! Talks to the Hugging Face Hub REST API for a dataset repo: raw file
//! downloads via the `resolve` endpoint and uploads via the NDJSON commit
//! API. The worker only ever needs four operations, expressed as the
//! [`RemoteStore`] trait so the processing pipeline can be exercised against
//! an in-memory fake in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::error::{Result, SplatError};
use crate::tasks::{Task, TaskList, TASK_LIST_PATH};

/// Revision header set by the hub on `resolve` responses
const REPO_COMMIT_HEADER: &str = "x-repo-commit";

/// Remote dataset repository operations used by the worker
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the current task list, bypassing caches, together with the
    /// revision it was read at.
    async fn fetch_task_list(&self) -> Result<TaskList>;

    /// Overwrite the task list document.
    ///
    /// When `parent_revision` is given the write is conditional: if the
    /// document moved since that revision the store must return
    /// [`SplatError::TaskListConflict`] instead of overwriting.
    async fn put_task_list(&self, tasks: &[Task], parent_revision: Option<&str>) -> Result<()>;

    /// Download a repo file into the local cache, returning the local path
    async fn download_file(&self, path: &str) -> Result<PathBuf>;

    /// Upload a local file to the given repo path
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;
}

/// Configuration for the hub client
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub endpoint (default: https://huggingface.co)
    pub endpoint: String,
    /// Dataset repo id, e.g. `someuser/my-gaussian-world`
    pub repo_id: String,
    /// Bearer token (from `HF_TOKEN`)
    pub token: String,
    /// Local cache directory for downloads
    pub cache_dir: PathBuf,
    /// Connection timeout (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Per-request timeout; covers full image/artifact transfers
    pub request_timeout: Duration,
}

impl HubConfig {
    pub fn new(repo_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            repo_id: repo_id.into(),
            token: token.into(),
            cache_dir: PathBuf::from("./local_cache"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Hugging Face Hub implementation of [`RemoteStore`]
pub struct HubClient {
    client: Client,
    config: HubConfig,
}

impl HubClient {
    pub fn new(config: HubConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SplatError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn resolve_url(&self, path: &str) -> String {
        format!(
            "{}/datasets/{}/resolve/main/{}",
            self.config.endpoint, self.config.repo_id, path
        )
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/commit/main",
            self.config.endpoint, self.config.repo_id
        )
    }

    async fn fetch_bytes(&self, path: &str, no_cache: bool) -> Result<(Vec<u8>, Option<String>)> {
        let url = self.resolve_url(path);
        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token);
        if no_cache {
            request = request.header(reqwest::header::CACHE_CONTROL, "no-cache");
        }

        let response = request.send().await.map_err(|e| SplatError::FetchError {
            path: path.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SplatError::HttpStatusError {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let revision = response
            .headers()
            .get(REPO_COMMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SplatError::FetchError {
                path: path.to_string(),
                source: e,
            })?;

        debug!("Fetched {} bytes from {}", bytes.len(), path);
        Ok((bytes.to_vec(), revision))
    }

    /// Commit a single file to the repo via the NDJSON commit API.
    ///
    /// The payload is two NDJSON lines: a commit header (summary plus an
    /// optional `parentCommit` for conditional writes) and one base64 file
    /// entry.
    async fn commit_file(
        &self,
        remote_path: &str,
        content: &[u8],
        summary: &str,
        parent_revision: Option<&str>,
    ) -> Result<()> {
        let mut header = serde_json::json!({ "summary": summary });
        if let Some(parent) = parent_revision {
            header["parentCommit"] = serde_json::Value::String(parent.to_string());
        }

        let file = serde_json::json!({
            "path": remote_path,
            "content": BASE64.encode(content),
            "encoding": "base64",
        });

        let body = format!(
            "{}\n{}\n",
            serde_json::json!({ "key": "header", "value": header }),
            serde_json::json!({ "key": "file", "value": file }),
        );

        let response = self
            .client
            .post(self.commit_url())
            .bearer_auth(&self.config.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| SplatError::UploadError {
                path: remote_path.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED || status == StatusCode::CONFLICT {
            return Err(SplatError::TaskListConflict {
                expected: parent_revision.unwrap_or("<none>").to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SplatError::UploadError {
                path: remote_path.to_string(),
                message: format!("HTTP {status}: {message}"),
            });
        }

        info!("Committed {} ({} bytes)", remote_path, content.len());
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for HubClient {
    async fn fetch_task_list(&self) -> Result<TaskList> {
        let (bytes, revision) = self.fetch_bytes(TASK_LIST_PATH, true).await?;
        TaskList::parse(&bytes, revision)
    }

    async fn put_task_list(&self, tasks: &[Task], parent_revision: Option<&str>) -> Result<()> {
        let json = TaskList::to_json(tasks)?;
        self.commit_file(
            TASK_LIST_PATH,
            json.as_bytes(),
            "Update job status by GPU node",
            parent_revision,
        )
        .await
    }

    async fn download_file(&self, path: &str) -> Result<PathBuf> {
        let (bytes, _) = self.fetch_bytes(path, false).await?;

        // Mirror the repo layout under the cache directory
        let local = self.config.cache_dir.join(path);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local, &bytes).await?;

        info!("Downloaded {} -> {}", path, local.display());
        Ok(local)
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let content = tokio::fs::read(local).await?;
        let summary = format!("Add {} at {}", remote, chrono::Utc::now().to_rfc3339());
        self.commit_file(remote, &content, &summary, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskId, TaskStatus};

    fn test_client(server: &mockito::ServerGuard, cache_dir: PathBuf) -> HubClient {
        let mut config = HubConfig::new("user/test-repo", "hf_test_token");
        config.endpoint = server.url();
        config.cache_dir = cache_dir;
        HubClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn fetch_task_list_captures_revision() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/datasets/user/test-repo/resolve/main/locations.json")
            .match_header("authorization", "Bearer hf_test_token")
            .match_header("cache-control", "no-cache")
            .with_status(200)
            .with_header("x-repo-commit", "abc123")
            .with_body(r#"[{"id": 1, "photoPath": "inputs/a.jpg", "status": "processing"}]"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().to_path_buf());
        let list = client.fetch_task_list().await.unwrap();

        mock.assert_async().await;
        assert_eq!(list.revision.as_deref(), Some("abc123"));
        assert_eq!(list.tasks.len(), 1);
        assert_eq!(list.tasks[0].id, TaskId::Int(1));
        assert_eq!(list.tasks[0].status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn fetch_task_list_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/datasets/user/test-repo/resolve/main/locations.json")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().to_path_buf());
        let err = client.fetch_task_list().await.unwrap_err();

        match err {
            SplatError::HttpStatusError { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatusError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_file_mirrors_repo_layout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/datasets/user/test-repo/resolve/main/inputs/photo.jpg")
            .with_status(200)
            .with_body(b"jpeg-bytes".to_vec())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().to_path_buf());
        let local = client.download_file("inputs/photo.jpg").await.unwrap();

        assert_eq!(local, dir.path().join("inputs/photo.jpg"));
        assert_eq!(std::fs::read(&local).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn put_task_list_sends_parent_commit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/datasets/user/test-repo/commit/main")
            .match_header("content-type", "application/x-ndjson")
            .match_body(mockito::Matcher::Regex(
                r#""parentCommit":"rev-1""#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"commitUrl": "whatever"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().to_path_buf());
        let tasks = vec![Task {
            id: TaskId::Int(1),
            photo_path: "inputs/a.jpg".into(),
            status: TaskStatus::Ready,
            splat_path: Some("outputs/1.ply".into()),
            failure_reason: None,
            retry_count: None,
            extra: serde_json::Map::new(),
        }];

        client.put_task_list(&tasks, Some("rev-1")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn put_task_list_maps_stale_revision_to_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/datasets/user/test-repo/commit/main")
            .with_status(412)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().to_path_buf());
        let err = client.put_task_list(&[], Some("stale")).await.unwrap_err();

        match err {
            SplatError::TaskListConflict { expected } => assert_eq!(expected, "stale"),
            other => panic!("expected TaskListConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_file_commits_base64_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/datasets/user/test-repo/commit/main")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#""path":"outputs/1.ply""#.to_string()),
                mockito::Matcher::Regex(format!(r#""content":"{}""#, BASE64.encode(b"ply-data"))),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("model.ply");
        std::fs::write(&local, b"ply-data").unwrap();

        let client = test_client(&server, dir.path().to_path_buf());
        client.upload_file(&local, "outputs/1.ply").await.unwrap();
        mock.assert_async().await;
    }
}
