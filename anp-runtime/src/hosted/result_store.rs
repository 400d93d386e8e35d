use std::path::PathBuf;

use anp_common::state::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedDidResult {
    pub result_id: String,
    pub request_id: RequestId,
    pub requester_did: String,
    pub requester_short_id: String,
    pub success: bool,
    #[serde(default)]
    pub hosted_did_document: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub host: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, Serialize)]
pub enum ResultStoreError {
    #[error("result `{0}` was not found among pending results")]
    NotFound(String),
    #[error("filesystem error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResultStoreError {
    fn from(e: std::io::Error) -> Self {
        ResultStoreError::Io(e.to_string())
    }
}

anp_common::impl_into_status_code!(ResultStoreError, |e| match e {
    NotFound(_) => ::http::StatusCode::NOT_FOUND,
    Io(_) => ::http::StatusCode::INTERNAL_SERVER_ERROR,
});

/// Resolve the trailing `<shortId>` a requester DID names itself by, i.e.
/// the segment after the final `:`.
pub fn requester_short_id(requester_did: &str) -> String {
    requester_did.rsplit(':').next().unwrap_or(requester_did).to_owned()
}

/// File-backed result inbox for one domain: `pending/` (at-least-once,
/// never auto-deleted) and `acknowledged/`.
pub struct HostedDidResultStore {
    root: PathBuf,
}

impl HostedDidResultStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    fn acknowledged_dir(&self) -> PathBuf {
        self.root.join("acknowledged")
    }

    pub async fn ensure_dirs(&self) -> Result<(), ResultStoreError> {
        fs::create_dir_all(self.pending_dir()).await?;
        fs::create_dir_all(self.acknowledged_dir()).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn publish_result(
        &self,
        request_id: RequestId,
        requester_did: String,
        host: String,
        port: u16,
        success: bool,
        hosted_did_document: Option<Value>,
        error_message: Option<String>,
    ) -> Result<HostedDidResult, ResultStoreError> {
        let requester_short_id = requester_short_id(&requester_did);
        let now = Utc::now();
        let result_id = format!(
            "{}_{}_{}",
            requester_short_id,
            now.timestamp(),
            &request_id.simple().to_string()[..8]
        );

        let result = HostedDidResult {
            result_id: result_id.clone(),
            request_id,
            requester_did,
            requester_short_id,
            success,
            hosted_did_document,
            error_message,
            host,
            port,
            created_at: now,
            acknowledged_at: None,
        };

        let path = self.pending_dir().join(format!("{result_id}.json"));
        let body = serde_json::to_vec_pretty(&result).map_err(|e| ResultStoreError::Io(e.to_string()))?;
        fs::write(path, body).await?;
        Ok(result)
    }

    /// All pending results for `requester_short_id`, newest-first.
    pub async fn get_results_for_requester(
        &self,
        requester_short_id: &str,
    ) -> Result<Vec<HostedDidResult>, ResultStoreError> {
        let dir = self.pending_dir();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(entry.path()).await?;
            let result: HostedDidResult =
                serde_json::from_slice(&bytes).map_err(|e| ResultStoreError::Io(e.to_string()))?;
            if result.requester_short_id == requester_short_id {
                out.push(result);
            }
        }

        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub async fn acknowledge_result(&self, result_id: &str) -> Result<HostedDidResult, ResultStoreError> {
        let from = self.pending_dir().join(format!("{result_id}.json"));
        let bytes = fs::read(&from)
            .await
            .map_err(|_| ResultStoreError::NotFound(result_id.to_owned()))?;
        let mut result: HostedDidResult =
            serde_json::from_slice(&bytes).map_err(|e| ResultStoreError::Io(e.to_string()))?;

        let to = self.acknowledged_dir().join(format!("{result_id}.json"));
        fs::rename(&from, &to).await?;

        result.acknowledged_at = Some(Utc::now());
        let body = serde_json::to_vec_pretty(&result).map_err(|e| ResultStoreError::Io(e.to_string()))?;
        fs::write(&to, body).await?;
        Ok(result)
    }

    /// Delete acknowledged results older than `max_age_days`.
    pub async fn cleanup_old_results(&self, max_age_days: i64) -> Result<usize, ResultStoreError> {
        let dir = self.acknowledged_dir();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut removed = 0;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let Ok(result) = serde_json::from_slice::<HostedDidResult>(&bytes) else {
                continue;
            };
            let acked = result.acknowledged_at.unwrap_or(result.created_at);
            if acked < cutoff {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("anp-results-test-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn publish_then_ack_makes_it_disappear_from_pending() {
        let store = HostedDidResultStore::new(temp_root());
        store.ensure_dirs().await.unwrap();

        let result = store
            .publish_result(
                Uuid::new_v4(),
                "did:wba:localhost%3A9527:wba:user:CCCC".into(),
                "localhost".into(),
                9527,
                true,
                Some(serde_json::json!({"id": "hosted"})),
                None,
            )
            .await
            .unwrap();

        let pending = store.get_results_for_requester("CCCC").await.unwrap();
        assert_eq!(pending.len(), 1);

        store.acknowledge_result(&result.result_id).await.unwrap();
        let pending_after = store.get_results_for_requester("CCCC").await.unwrap();
        assert!(pending_after.is_empty());
    }

    #[tokio::test]
    async fn results_for_requester_are_newest_first() {
        let store = HostedDidResultStore::new(temp_root());
        store.ensure_dirs().await.unwrap();

        store
            .publish_result(
                Uuid::new_v4(),
                "did:wba:localhost%3A9527:wba:user:DDDD".into(),
                "localhost".into(),
                9527,
                true,
                None,
                None,
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .publish_result(
                Uuid::new_v4(),
                "did:wba:localhost%3A9527:wba:user:DDDD".into(),
                "localhost".into(),
                9527,
                true,
                None,
                None,
            )
            .await
            .unwrap();

        let results = store.get_results_for_requester("DDDD").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].created_at >= results[1].created_at);
    }
}
