use std::sync::Arc;

use anp_common::state::Did;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use super::wba::host_port;
use crate::{
    server::{error::ServerError, models::PublisherAgentsResponse},
    state::GlobalState,
};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/:did/routes", get(list_shared_routes))
}

async fn list_agents(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
) -> Result<Json<PublisherAgentsResponse>, ServerError> {
    host_port(&state, &headers)?;
    Ok(Json(PublisherAgentsResponse {
        agents: state.registry.list_agents(),
    }))
}

/// Enumerate the effective shared-DID routing table for one DID, for
/// operators — not consulted by `Router::resolve` itself.
async fn list_shared_routes(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(did): Path<String>,
) -> Result<Json<Value>, ServerError> {
    host_port(&state, &headers)?;
    let shared_did = Did::parse(&did).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let routes: Vec<Value> = state
        .router
        .shared_routing_table
        .snapshot(&shared_did)
        .into_iter()
        .map(|(full_path, (agent_name, original_path))| {
            json!({
                "fullPath": full_path,
                "agentName": agent_name.to_string(),
                "originalPath": original_path,
            })
        })
        .collect();

    Ok(Json(json!({ "sharedDid": shared_did.to_string(), "routes": routes })))
}
