use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::{server::error::ServerError, state::GlobalState};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new()
        .route("/user/:user_id/did.json", get(user_did_json))
        .route("/user/:resp_did/ad.json", get(user_ad_json))
        .route("/user/:resp_did/:name", get(user_descriptor_document))
        .route("/hostuser/:user_id/did.json", get(hostuser_did_json))
}

async fn read_file(path: std::path::PathBuf, content_type: &'static str) -> Result<Response, ServerError> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ServerError::NotFound(format!("`{}` not found", path.display())))?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn user_did_json(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Response, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let paths = state.domains.paths_for(&host, port);
    let dir = paths.user_did_path().join(format!("user_{user_id}"));
    read_file(dir.join("did_document.json"), "application/json").await
}

async fn hostuser_did_json(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Response, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let paths = state.domains.paths_for(&host, port);
    let dir = paths.user_hosted_path().join(format!("user_{user_id}"));
    read_file(dir.join("did_document.json"), "application/json").await
}

async fn user_ad_json(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(resp_did): Path<String>,
) -> Result<Response, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let paths = state.domains.paths_for(&host, port);
    let dir = paths.user_did_path().join(format!("user_{resp_did}"));
    read_file(dir.join("ad.json"), "application/json").await
}

/// Serves `{name}.yaml` (OpenAPI) and `{name}.json` (JSON-RPC) per SPEC §6.
/// The description generator only ever writes `api_interface.{yaml,json}`,
/// so `name` is validated against that rather than read straight off disk.
async fn user_descriptor_document(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path((resp_did, name)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let (filename, content_type) = match name.as_str() {
        "api_interface.yaml" => ("api_interface.yaml", "application/yaml"),
        "api_interface.json" => ("api_interface.json", "application/json"),
        other => return Err(ServerError::NotFound(format!("no descriptor document named `{other}`"))),
    };

    let (host, port) = host_port(&state, &headers)?;
    let paths = state.domains.paths_for(&host, port);
    let dir = paths.user_did_path().join(format!("user_{resp_did}"));
    read_file(dir.join(filename), content_type).await
}

/// Resolve and validate the `(host, port)` a request was addressed to,
/// aliasing loopback forms to `localhost` and rejecting unserved domains.
pub(super) fn host_port(state: &GlobalState, headers: &HeaderMap) -> Result<(String, u16), ServerError> {
    let host_header = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let (host, port) = state.domains.parse_host_header(host_header);
    state.domains.validate(&host, port)?;
    Ok((host, port))
}
