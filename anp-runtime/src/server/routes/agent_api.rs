use std::{sync::Arc, time::Duration};

use anp_common::state::Did;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use super::wba::host_port;
use crate::{
    server::error::ServerError,
    state::{
        agent::{ApiCallContext, MessageContext},
        router::{InboundRequest, RequestKind},
        GlobalState,
    },
};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new()
        .route("/:did/message/post", post(dispatch_message))
        .route("/:did/*subpath", post(dispatch_api_call))
}

async fn dispatch_api_call(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path((did, subpath)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    let path = format!("/{subpath}");
    dispatch(state, headers, did, path, RequestKind::ApiCall, body).await
}

async fn dispatch_message(
    State(state): State<Arc<GlobalState>>,
    headers: HeaderMap,
    Path(did): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    dispatch(state, headers, did, "/message/post".to_owned(), RequestKind::Message, body).await
}

/// Shared dispatch path for both plain API calls and the `message/post`
/// shortcut: synthesize `requestData`, optionally forward upstream, and
/// otherwise delegate to the router.
async fn dispatch(
    state: Arc<GlobalState>,
    headers: HeaderMap,
    did: String,
    path: String,
    kind: RequestKind,
    body: Value,
) -> Result<Json<Value>, ServerError> {
    let (host, port) = host_port(&state, &headers)?;
    let target_did = Did::parse(&did).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let request_type = if matches!(kind, RequestKind::Message) { "message" } else { "api_call" };
    let mut request_data = body.clone();
    if let Some(map) = request_data.as_object_mut() {
        map.insert("type".to_owned(), json!(request_type));
        map.insert("path".to_owned(), json!(path));
        map.insert("req_did".to_owned(), json!(target_did.to_string()));
    }

    if state.cli.use_framework_server {
        match forward_upstream(&state, &target_did, &path, &request_data).await {
            Ok(value) => return Ok(Json(value)),
            Err(e) if state.cli.fallback_to_local => {
                tracing::warn!("upstream framework server forward failed, falling back to local routing: {e}");
            }
            Err(e) => return Err(ServerError::Forward(e)),
        }
    }

    let req = InboundRequest {
        host,
        port,
        target_did,
        kind: kind.clone(),
        path: path.clone(),
    };
    let resolved = state.router.resolve(&req).await?;
    let agent = resolved.agent.read().await;

    let caller_did = request_data
        .get("callerDID")
        .and_then(Value::as_str)
        .and_then(|s| Did::parse(s).ok());

    let result = match kind {
        RequestKind::Message => {
            agent
                .handle_message(MessageContext {
                    caller_did,
                    message_type: "*".to_owned(),
                    body: request_data,
                })
                .await
        }
        _ => {
            agent
                .handle_api_call(
                    &path,
                    ApiCallContext {
                        caller_did,
                        path: path.clone(),
                        body: request_data,
                    },
                )
                .await
        }
    };

    result.map(Json).map_err(ServerError::from)
}

async fn forward_upstream(state: &GlobalState, did: &Did, path: &str, body: &Value) -> Result<Value, String> {
    let base = state
        .cli
        .framework_server_url
        .as_ref()
        .ok_or_else(|| "use_framework_server is set but framework_server_url is missing".to_owned())?;
    let url = format!("{}/agent/api/{}{}", base.as_str().trim_end_matches('/'), did, path);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| e.to_string())?;
    let response = client.post(url).json(body).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("upstream responded with {}", response.status()));
    }
    response.json::<Value>().await.map_err(|e| e.to_string())
}
