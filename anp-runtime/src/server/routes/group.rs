use std::sync::Arc;

use anp_common::state::Did;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use super::wba::host_port;
use crate::{
    server::error::ServerError,
    state::{
        agent::GroupEventContext,
        router::{InboundRequest, RequestKind},
        GlobalState,
    },
};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new()
        .route("/:did/:group_id/join", post(group_event))
        .route("/:did/:group_id/leave", post(group_event))
        .route("/:did/:group_id/message", post(group_event))
        .route("/:did/:group_id/connect", get(group_event))
        .route("/:did/:group_id/members", get(group_event))
}

/// A single handler for every `{join,leave,message,connect,members}`
/// action: the event type is carried in the path and dispatched to the
/// resolved agent's group-event handler, matching handler not path.
async fn group_event(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path((did, group_id)): Path<(String, String)>,
    uri: axum::http::Uri,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let target_did = Did::parse(&did).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let event_type = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or("message")
        .to_owned();

    let req = InboundRequest {
        host,
        port,
        target_did: target_did.clone(),
        kind: RequestKind::GroupEvent {
            group_id: group_id.clone(),
            event_type: event_type.clone(),
        },
        path: uri.path().to_owned(),
    };
    let resolved = state.router.resolve(&req).await?;
    let agent = resolved.agent.read().await;

    let body = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let caller_did = body
        .get("callerDID")
        .and_then(Value::as_str)
        .and_then(|s| Did::parse(s).ok());

    agent
        .handle_group_event(GroupEventContext {
            caller_did,
            group_id,
            event_type,
            body,
        })
        .await
        .map(Json)
        .map_err(ServerError::from)
}
