//! Task list data model
//!
//! The shared task list is a single JSON document (`locations.json`) on the
//! dataset repo. It is produced and appended to externally; this worker only
//! flips individual entries from `processing` to `ready` (or `failed` when
//! failure tracking is enabled). Everything else in the document, including
//! fields this worker knows nothing about, must survive a read-modify-write
//! cycle unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplatError};

/// Well-known path of the task list inside the dataset repo
pub const TASK_LIST_PATH: &str = "locations.json";

/// Opaque task identifier assigned by the external producer.
///
/// The producer writes either JSON strings or integers; both are accepted
/// and round-tripped as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Int(i64),
    Str(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Int(n) => write!(f, "{n}"),
            TaskId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl TaskId {
    /// Directory-safe rendering of the id, used to key per-task workspaces
    /// and derive remote artifact paths.
    ///
    /// String ids containing path separators (or empty strings) are rejected
    /// rather than silently creating nested directories.
    pub fn dir_name(&self) -> Result<String> {
        let name = self.to_string();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(SplatError::InvalidTaskId(name));
        }
        Ok(name)
    }
}

/// Task state within the shared list.
///
/// `Other` preserves externally-defined states this worker does not act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Ready,
    Failed,
    #[serde(untagged)]
    Other(String),
}

/// One entry of the shared task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub photo_path: String,
    pub status: TaskStatus,
    /// Remote path of the uploaded reconstruction artifact, set on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splat_path: Option<String>,
    /// Last failure message, set when failure tracking is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Number of failed attempts, set when failure tracking is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Producer-owned fields we do not interpret but must not drop
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The task list document plus the repo revision it was read at.
///
/// The revision is passed back on write so the hub can reject the commit if
/// the document moved underneath us.
#[derive(Debug, Clone)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub revision: Option<String>,
}

impl TaskList {
    pub fn parse(bytes: &[u8], revision: Option<String>) -> Result<Self> {
        let tasks = serde_json::from_slice(bytes)?;
        Ok(Self { tasks, revision })
    }

    /// Serialize the full document the way the producer writes it
    /// (pretty-printed JSON array).
    pub fn to_json(tasks: &[Task]) -> Result<String> {
        Ok(serde_json::to_string_pretty(tasks)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "id": 7,
            "photoPath": "inputs/garden.jpg",
            "status": "processing",
            "createdBy": "web-ui",
            "label": "Garden"
        },
        {
            "id": "loc-abc",
            "photoPath": "inputs/kitchen.jpg",
            "status": "ready",
            "splatPath": "outputs/loc-abc.ply"
        },
        {
            "id": 9,
            "photoPath": "inputs/roof.jpg",
            "status": "queued-for-review"
        }
    ]"#;

    #[test]
    fn parses_mixed_id_types() {
        let list = TaskList::parse(SAMPLE.as_bytes(), None).unwrap();
        assert_eq!(list.tasks.len(), 3);
        assert_eq!(list.tasks[0].id, TaskId::Int(7));
        assert_eq!(list.tasks[1].id, TaskId::Str("loc-abc".into()));
        assert_eq!(list.tasks[0].status, TaskStatus::Processing);
        assert_eq!(list.tasks[1].status, TaskStatus::Ready);
    }

    #[test]
    fn unknown_status_is_preserved() {
        let list = TaskList::parse(SAMPLE.as_bytes(), None).unwrap();
        assert_eq!(
            list.tasks[2].status,
            TaskStatus::Other("queued-for-review".into())
        );

        let json = TaskList::to_json(&list.tasks).unwrap();
        let reparsed = TaskList::parse(json.as_bytes(), None).unwrap();
        assert_eq!(reparsed.tasks, list.tasks);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let list = TaskList::parse(SAMPLE.as_bytes(), None).unwrap();
        assert_eq!(
            list.tasks[0].extra.get("createdBy"),
            Some(&serde_json::Value::String("web-ui".into()))
        );

        let json = TaskList::to_json(&list.tasks).unwrap();
        assert!(json.contains("\"createdBy\": \"web-ui\""));
        assert!(json.contains("\"label\": \"Garden\""));
    }

    #[test]
    fn serializes_camel_case_keys() {
        let list = TaskList::parse(SAMPLE.as_bytes(), None).unwrap();
        let json = TaskList::to_json(&list.tasks).unwrap();
        assert!(json.contains("\"photoPath\""));
        assert!(json.contains("\"splatPath\""));
        assert!(!json.contains("photo_path"));
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let list = TaskList::parse(SAMPLE.as_bytes(), None).unwrap();
        let json = serde_json::to_string(&list.tasks[0]).unwrap();
        assert!(!json.contains("splatPath"));
        assert!(!json.contains("failureReason"));
        assert!(!json.contains("retryCount"));
    }

    #[test]
    fn dir_name_rejects_path_separators() {
        assert!(TaskId::Str("ok-id_1".into()).dir_name().is_ok());
        assert_eq!(TaskId::Int(42).dir_name().unwrap(), "42");
        assert!(TaskId::Str("../evil".into()).dir_name().is_err());
        assert!(TaskId::Str("a/b".into()).dir_name().is_err());
        assert!(TaskId::Str(String::new()).dir_name().is_err());
    }
}
