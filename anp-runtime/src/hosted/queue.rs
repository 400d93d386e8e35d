use std::path::{Path, PathBuf};

use anp_common::state::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::AsRefStr;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    fn dir_name(self) -> &'static str {
        self.as_ref()
    }

    const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Processing,
        RequestStatus::Completed,
        RequestStatus::Failed,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedDidRequest {
    pub request_id: RequestId,
    pub requester_did: String,
    pub did_document: Value,
    #[serde(default)]
    pub callback_info: Option<Value>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status_log: Vec<StatusLogEntry>,
}

#[derive(Debug, Error, Clone, Serialize)]
pub enum QueueError {
    #[error("request `{0}` already exists")]
    Duplicate(String),
    #[error("did document is required")]
    MissingDidDocument,
    #[error("requester DID is required")]
    MissingRequesterDid,
    #[error("requester DID `{0}` is not a did:wba: identifier")]
    InvalidRequesterDid(String),
    #[error("request `{0}` was not found in any queue directory")]
    NotFound(String),
    #[error("request `{request}` is in `{actual}`, not `{expected}` as expected for this transition")]
    WrongState {
        request: String,
        expected: String,
        actual: String,
    },
    #[error("filesystem error: {0}")]
    Io(String),
}

impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        QueueError::Io(e.to_string())
    }
}

anp_common::impl_into_status_code!(QueueError, |e| match e {
    Duplicate(_) | MissingDidDocument | MissingRequesterDid | InvalidRequesterDid(_) => {
        ::http::StatusCode::BAD_REQUEST
    }
    NotFound(_) => ::http::StatusCode::NOT_FOUND,
    WrongState { .. } | Io(_) => ::http::StatusCode::INTERNAL_SERVER_ERROR,
});

/// File-backed queue of hosted-DID issuance requests for one domain.
///
/// Each request is a single JSON file named `<requestID>.json`, living in
/// exactly one of `pending/`, `processing/`, `completed/`, `failed/`.
/// Transitions are move-file-then-rewrite: the file is renamed into the
/// destination directory first, then its `status`/`statusLog` are rewritten
/// in place, so a crash between the two leaves the request merely missing a
/// log line, never in two directories at once.
pub struct HostedDidQueue {
    root: PathBuf,
}

impl HostedDidQueue {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_dirs(&self) -> Result<(), QueueError> {
        for status in RequestStatus::ALL {
            fs::create_dir_all(self.dir(status)).await?;
        }
        Ok(())
    }

    fn dir(&self, status: RequestStatus) -> PathBuf {
        self.root.join(status.dir_name())
    }

    fn file_path(&self, status: RequestStatus, request_id: RequestId) -> PathBuf {
        self.dir(status).join(format!("{request_id}.json"))
    }

    async fn find(&self, request_id: RequestId) -> Option<(RequestStatus, PathBuf)> {
        for status in RequestStatus::ALL {
            let path = self.file_path(status, request_id);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some((status, path));
            }
        }
        None
    }

    pub async fn add_request(
        &self,
        request_id: RequestId,
        requester_did: String,
        did_document: Value,
        callback_info: Option<Value>,
    ) -> Result<HostedDidRequest, QueueError> {
        if did_document.is_null() {
            return Err(QueueError::MissingDidDocument);
        }
        if requester_did.is_empty() {
            return Err(QueueError::MissingRequesterDid);
        }
        if !requester_did.starts_with("did:wba:") {
            return Err(QueueError::InvalidRequesterDid(requester_did));
        }
        if self.find(request_id).await.is_some() {
            return Err(QueueError::Duplicate(request_id.to_string()));
        }

        let now = Utc::now();
        let request = HostedDidRequest {
            request_id,
            requester_did,
            did_document,
            callback_info,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
            status_log: vec![StatusLogEntry {
                at: now,
                note: "submitted".to_owned(),
            }],
        };

        self.write(RequestStatus::Pending, &request).await?;
        Ok(request)
    }

    async fn write(&self, status: RequestStatus, request: &HostedDidRequest) -> Result<(), QueueError> {
        let path = self.file_path(status, request.request_id);
        let body = serde_json::to_vec_pretty(request).map_err(|e| QueueError::Io(e.to_string()))?;
        fs::write(path, body).await?;
        Ok(())
    }

    async fn read(path: &Path) -> Result<HostedDidRequest, QueueError> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| QueueError::Io(e.to_string()))
    }

    pub async fn get_request_status(&self, request_id: RequestId) -> Result<HostedDidRequest, QueueError> {
        let (_, path) = self
            .find(request_id)
            .await
            .ok_or_else(|| QueueError::NotFound(request_id.to_string()))?;
        Self::read(&path).await
    }

    /// The only mutator. Renames the file into `to`'s directory first, then
    /// rewrites its status/statusLog/updatedAt in place.
    pub async fn move_request_status(
        &self,
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        note: impl Into<String>,
    ) -> Result<HostedDidRequest, QueueError> {
        let from_path = self.file_path(from, request_id);
        let mut request = Self::read(&from_path).await?;
        if request.status != from {
            return Err(QueueError::WrongState {
                request: request_id.to_string(),
                expected: from.dir_name().to_owned(),
                actual: request.status.dir_name().to_owned(),
            });
        }

        let to_path = self.file_path(to, request_id);
        fs::rename(&from_path, &to_path).await?;

        request.status = to;
        request.updated_at = Utc::now();
        request.status_log.push(StatusLogEntry {
            at: request.updated_at,
            note: note.into(),
        });

        let body = serde_json::to_vec_pretty(&request).map_err(|e| QueueError::Io(e.to_string()))?;
        fs::write(&to_path, body).await?;
        Ok(request)
    }

    /// Snapshot of `pending/`, oldest-first by `created_at`.
    pub async fn get_pending_requests(&self) -> Result<Vec<HostedDidRequest>, QueueError> {
        let dir = self.dir(RequestStatus::Pending);
        let mut entries = Vec::new();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            entries.push(Self::read(&entry.path()).await?);
        }

        entries.sort_by_key(|r| r.created_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("anp-queue-test-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn add_then_status_round_trips_as_pending() {
        let queue = HostedDidQueue::new(temp_root());
        queue.ensure_dirs().await.unwrap();

        let id = Uuid::new_v4();
        queue
            .add_request(id, "did:wba:localhost%3A9527:wba:user:CCCC".into(), json!({"id": "x"}), None)
            .await
            .unwrap();

        let fetched = queue.get_request_status(id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.status_log.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_request_id_rejected() {
        let queue = HostedDidQueue::new(temp_root());
        queue.ensure_dirs().await.unwrap();
        let id = Uuid::new_v4();
        queue
            .add_request(id, "did:wba:localhost%3A9527:wba:user:CCCC".into(), json!({"id": "x"}), None)
            .await
            .unwrap();

        let err = queue
            .add_request(id, "did:wba:localhost%3A9527:wba:user:CCCC".into(), json!({"id": "x"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Duplicate(_)));
    }

    #[tokio::test]
    async fn moves_between_directories_and_appends_log() {
        let queue = HostedDidQueue::new(temp_root());
        queue.ensure_dirs().await.unwrap();
        let id = Uuid::new_v4();
        queue
            .add_request(id, "did:wba:localhost%3A9527:wba:user:CCCC".into(), json!({"id": "x"}), None)
            .await
            .unwrap();

        let processing = queue
            .move_request_status(id, RequestStatus::Pending, RequestStatus::Processing, "start")
            .await
            .unwrap();
        assert_eq!(processing.status, RequestStatus::Processing);

        let completed = queue
            .move_request_status(id, RequestStatus::Processing, RequestStatus::Completed, "done")
            .await
            .unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);
        assert_eq!(completed.status_log.len(), 3);
    }

    #[tokio::test]
    async fn pending_snapshot_is_creation_ordered() {
        let queue = HostedDidQueue::new(temp_root());
        queue.ensure_dirs().await.unwrap();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue
            .add_request(first, "did:wba:localhost%3A9527:wba:user:AAAA".into(), json!({"id": "a"}), None)
            .await
            .unwrap();
        queue
            .add_request(second, "did:wba:localhost%3A9527:wba:user:BBBB".into(), json!({"id": "b"}), None)
            .await
            .unwrap();

        let pending = queue.get_pending_requests().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].created_at <= pending[1].created_at);
    }
}
