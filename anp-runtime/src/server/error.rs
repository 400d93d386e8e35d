use axum::{response::IntoResponse, Json};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::{
    hosted::{AddRequestError, QueueError, ResultStoreError},
    loader::LoadError,
    state::{agent::HandlerError, domain::DomainAccessDenied, registry::RegistrationConflict, router::RoutingError},
};

/// Every error an HTTP handler can return, mapped to the `{status, message}`
/// / `{status, error_message}` envelopes by [`IntoResponse`] below.
#[derive(Debug, Error, strum_macros::AsRefStr)]
pub enum ServerError {
    #[error(transparent)]
    Domain(#[from] DomainAccessDenied),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Registration(#[from] RegistrationConflict),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    ResultStore(#[from] ResultStoreError),
    #[error(transparent)]
    AddRequest(#[from] AddRequestError),
    #[error(transparent)]
    Load(#[from] LoadError),
    /// An agent's own handler returned an error: surfaced with the
    /// `error_message` envelope rather than `message`.
    #[error("{0}")]
    Handler(#[from] HandlerError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream framework server request failed: {0}")]
    Forward(String),
    #[error("{0}")]
    Io(String),
}

anp_common::impl_into_type_str!(ServerError);

anp_common::impl_into_status_code!(ServerError, |value| match value {
    Domain(e) => e.into(),
    Routing(e) => e.into(),
    Registration(e) => e.into(),
    Queue(e) => e.into(),
    ResultStore(e) => e.into(),
    AddRequest(e) => e.into(),
    Load(e) => e.into(),
    Handler(_) => ::http::StatusCode::INTERNAL_SERVER_ERROR,
    NotFound(_) => ::http::StatusCode::NOT_FOUND,
    BadRequest(_) => ::http::StatusCode::BAD_REQUEST,
    Forward(_) => ::http::StatusCode::BAD_GATEWAY,
    Io(_) => ::http::StatusCode::INTERNAL_SERVER_ERROR,
});

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from(&self);
        let error_type = String::from(&self);
        let body = if matches!(self, ServerError::Handler(_)) {
            json!({ "status": "error", "error_message": self.to_string() })
        } else {
            json!({ "status": "error", "message": self.to_string() })
        };

        let mut res = (status, Json(body.clone())).into_response();

        // `log_request` reads this richer copy from the extensions; the
        // wire body above stays exactly `{status, message}` / `{status,
        // error_message}` per the response envelope.
        let mut log_body = body;
        if let Some(map) = log_body.as_object_mut() {
            map.insert("error_type".to_owned(), json!(error_type));
        }
        res.extensions_mut().insert(log_body);
        res
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to bind to tcp: {0}")]
    TcpBind(#[source] std::io::Error),
    #[error("failed to serve: {0}")]
    Serve(#[source] std::io::Error),
}
