use std::{sync::Arc, time::Duration};

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::state::domain::DomainPaths;

use super::{
    queue::{HostedDidQueue, RequestStatus},
    result_store::HostedDidResultStore,
    transform,
};

/// Runs `performBusinessLogic` for one pending request: validates,
/// deduplicates against already-hosted documents, rewrites the document,
/// and persists it under `anp_users_hosted/user_<sid>/`.
async fn perform_business_logic(
    paths: &DomainPaths,
    host: &str,
    port: u16,
    did_document: &serde_json::Value,
) -> Result<serde_json::Value, String> {
    let old_id = did_document
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "did document is missing an `id` field".to_owned())?
        .to_owned();

    if is_duplicate(paths, &old_id).await {
        return Err("重复的DID申请 (duplicate DID request)".to_owned());
    }

    let sid = transform::new_short_id();
    let hosted_doc = transform::rewrite_as_hosted(did_document.clone(), host, port, &sid)?;

    let user_dir = paths.user_hosted_path().join(format!("user_{sid}"));
    fs::create_dir_all(&user_dir).await.map_err(|e| e.to_string())?;

    let request_path = user_dir.join("did_document_request.json");
    let request_body = serde_json::to_vec_pretty(did_document).map_err(|e| e.to_string())?;
    fs::write(&request_path, request_body).await.map_err(|e| e.to_string())?;

    let doc_path = user_dir.join("did_document.json");
    let doc_body = serde_json::to_vec_pretty(&hosted_doc).map_err(|e| e.to_string())?;
    fs::write(&doc_path, doc_body).await.map_err(|e| e.to_string())?;

    Ok(hosted_doc)
}

/// A request is a duplicate if some already-hosted user directory's saved
/// original request carries the same source `id`.
async fn is_duplicate(paths: &DomainPaths, old_id: &str) -> bool {
    let root = paths.user_hosted_path();
    let Ok(mut read_dir) = fs::read_dir(&root).await else {
        return false;
    };

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let request_path = entry.path().join("did_document_request.json");
        let Ok(bytes) = fs::read(&request_path).await else {
            continue;
        };
        let Ok(doc) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            continue;
        };
        if doc.get("id").and_then(serde_json::Value::as_str) == Some(old_id) {
            return true;
        }
    }
    false
}

async fn process_pending_requests(
    queue: &HostedDidQueue,
    results: &HostedDidResultStore,
    paths: &DomainPaths,
    host: &str,
    port: u16,
) -> Result<(), String> {
    let pending = queue
        .get_pending_requests()
        .await
        .map_err(|e| format!("failed to list pending hosted-DID requests: {e}"))?;

    for request in pending {
        let request_id = request.request_id;

        if let Err(e) = queue
            .move_request_status(request_id, RequestStatus::Pending, RequestStatus::Processing, "开始处理申请")
            .await
        {
            error!("failed to move request {request_id} to processing: {e}");
            continue;
        }

        match perform_business_logic(paths, host, port, &request.did_document).await {
            Ok(hosted_doc) => {
                if let Err(e) = queue
                    .move_request_status(request_id, RequestStatus::Processing, RequestStatus::Completed, "处理完成")
                    .await
                {
                    error!("failed to move request {request_id} to completed: {e}");
                }
                if let Err(e) = results
                    .publish_result(
                        request_id,
                        request.requester_did.clone(),
                        host.to_owned(),
                        port,
                        true,
                        Some(hosted_doc),
                        None,
                    )
                    .await
                {
                    error!("failed to publish result for {request_id}: {e}");
                }
                info!("hosted-DID request {request_id} processed successfully");
            }
            Err(err) => {
                if let Err(e) = queue
                    .move_request_status(
                        request_id,
                        RequestStatus::Processing,
                        RequestStatus::Failed,
                        format!("处理失败: {err}"),
                    )
                    .await
                {
                    error!("failed to move request {request_id} to failed: {e}");
                }
                if let Err(e) = results
                    .publish_result(
                        request_id,
                        request.requester_did.clone(),
                        host.to_owned(),
                        port,
                        false,
                        None,
                        Some(err.clone()),
                    )
                    .await
                {
                    error!("failed to publish failure result for {request_id}: {e}");
                }
                warn!("hosted-DID request {request_id} failed: {err}");
            }
        }
    }

    Ok(())
}

/// The per-domain background worker: polls `pending/` every `poll` seconds;
/// on an unhandled error in the loop body (e.g. `pending/` became
/// unreadable), backs off for `backoff` seconds before resuming the poll
/// loop instead of busy-retrying. Runs until its `JoinHandle` is aborted at
/// shutdown.
///
/// In-flight requests left in `processing/` when the process exits are
/// *not* reclaimed on the next startup — see the design note on this
/// trade-off.
pub async fn run(
    queue: Arc<HostedDidQueue>,
    results: Arc<HostedDidResultStore>,
    paths: Arc<DomainPaths>,
    host: String,
    port: u16,
    poll: Duration,
    backoff: Duration,
) {
    info!(%host, %port, "hosted-DID processor started");
    loop {
        match process_pending_requests(&queue, &results, &paths, &host, port).await {
            Ok(()) => {
                debug!(%host, %port, "hosted-DID poll cycle complete");
                tokio::time::sleep(poll).await;
            }
            Err(e) => {
                error!(%host, %port, "hosted-DID processor loop error: {e}");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
