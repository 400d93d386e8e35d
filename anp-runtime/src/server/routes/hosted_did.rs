use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::wba::host_port;
use crate::{
    hosted::{HostedDidRequest, HostedDidResult},
    server::{
        error::ServerError,
        models::{HostedDidRequestResponse, ESTIMATED_PROCESSING_TIME_SECONDS},
    },
    state::GlobalState,
};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new()
        .route("/request", post(submit_request))
        .route("/status/:request_id", get(request_status))
        .route("/check/:requester_short_id", get(check_results))
        .route("/acknowledge/:result_id", post(acknowledge_result))
        .route("/list", get(list_hosted))
}

async fn submit_request(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Json(body): Json<crate::server::models::HostedDidRequestBody>,
) -> Result<Json<HostedDidRequestResponse>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let request_id = Uuid::new_v4();
    let request = state
        .hosted
        .add_request(&host, port, request_id, body.requester_did, body.did_document, body.callback_info)
        .await?;

    Ok(Json(HostedDidRequestResponse {
        success: true,
        request_id: request.request_id.to_string(),
        estimated_processing_time: ESTIMATED_PROCESSING_TIME_SECONDS,
    }))
}

async fn request_status(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<HostedDidRequest>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let domain = state
        .hosted
        .for_domain(&host, port)
        .ok_or_else(|| ServerError::NotFound(format!("{host}:{port} has no hosted-DID workflow")))?;
    let request = domain.queue.get_request_status(request_id).await?;
    Ok(Json(request))
}

async fn check_results(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(requester_short_id): Path<String>,
) -> Result<Json<Vec<HostedDidResult>>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let domain = state
        .hosted
        .for_domain(&host, port)
        .ok_or_else(|| ServerError::NotFound(format!("{host}:{port} has no hosted-DID workflow")))?;
    let results = domain.results.get_results_for_requester(&requester_short_id).await?;
    Ok(Json(results))
}

async fn acknowledge_result(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(result_id): Path<String>,
) -> Result<Json<HostedDidResult>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let domain = state
        .hosted
        .for_domain(&host, port)
        .ok_or_else(|| ServerError::NotFound(format!("{host}:{port} has no hosted-DID workflow")))?;
    let result = domain.results.acknowledge_result(&result_id).await?;
    Ok(Json(result))
}

async fn list_hosted(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let paths = state.domains.paths_for(&host, port);
    let dir = paths.user_hosted_path();
    let mut names = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Json(names)),
        Err(e) => return Err(ServerError::Io(e.to_string())),
    };
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| ServerError::Io(e.to_string()))? {
        if let Some(name) = entry.file_name().to_str() {
            if let Some(sid) = name.strip_prefix("user_") {
                names.push(sid.to_owned());
            }
        }
    }
    Ok(Json(names))
}
