use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, Method, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReqStamp {
    pub uuid: Uuid,
    pub time_in: DateTime<Utc>,
}

pub async fn req_stamp(mut req: Request, next: Next) -> Response {
    let time_in = Utc::now();
    let uuid = Uuid::new_v4();

    req.extensions_mut().insert(ReqStamp { uuid, time_in });

    next.run(req).await
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ReqStamp {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ReqStamp>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[derive(Serialize)]
struct RequestLogLine {
    uuid: String,
    timestamp: String,
    time_in: String,
    duration_ms: i64,

    http_path: String,
    http_method: String,
    http_status: u16,

    error_type: Option<String>,
    error_data: Option<Value>,
}

/// Runs after the handler; logs one structured line per request, lifting
/// the `{status, message|error_message, error_type}` envelope a failed
/// handler stashed in the response extensions (see `server::error`) into
/// `error_type`/`error_data`.
pub async fn log_request(uri: Uri, method: Method, req_stamp: ReqStamp, res: Response) -> Response {
    let err = res.extensions().get::<Value>();
    let error_type = err.and_then(|e| e.get("error_type")).and_then(|t| t.as_str()).map(str::to_owned);
    let error_data = err
        .and_then(|e| e.get("message").or_else(|| e.get("error_message")))
        .cloned();

    let ReqStamp { uuid, time_in } = req_stamp;
    let now = Utc::now();
    let duration = now - time_in;
    let http_status = res.status().as_u16();

    let log_line = RequestLogLine {
        uuid: uuid.to_string(),
        timestamp: now.to_rfc3339(),
        time_in: time_in.to_rfc3339(),
        duration_ms: duration.num_milliseconds(),
        http_path: uri.to_string(),
        http_method: method.to_string(),
        http_status,
        error_type,
        error_data,
    };

    if http_status >= 500 {
        tracing::error!(line = %serde_json::to_string(&log_line).unwrap_or_default(), "request failed");
    } else {
        tracing::debug!(line = %serde_json::to_string(&log_line).unwrap_or_default(), "request completed");
    }

    res
}
