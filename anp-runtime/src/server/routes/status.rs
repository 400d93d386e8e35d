use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::{server::models::StatusResponse, state::GlobalState};

pub fn routes() -> Router<Arc<GlobalState>> {
    Router::new().route("/", get(liveness))
}

async fn liveness(State(state): State<Arc<GlobalState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        service: "anp-runtime",
        version: env!("CARGO_PKG_VERSION"),
        served_domains: state
            .domains
            .served_domains()
            .into_iter()
            .map(|(host, port)| format!("{host}:{port}"))
            .collect(),
    })
}
