pub mod error;
pub mod models;
pub mod routes;

use std::{net::SocketAddr, sync::Arc};

use axum::{middleware, Router};

use self::error::StartError;
use crate::{
    logging::{log_request, req_stamp},
    state::GlobalState,
};

pub async fn start(state: Arc<GlobalState>, socket_addr: SocketAddr) -> Result<(), StartError> {
    let app = Router::new()
        .merge(routes::status::routes())
        .nest("/wba", routes::wba::routes())
        .nest("/wba/hosted-did", routes::hosted_did::routes())
        .nest("/agent/api", routes::agent_api::routes())
        .nest("/agent/group", routes::group::routes())
        .nest("/publisher", routes::publisher::routes())
        .with_state(Arc::clone(&state))
        .layer(middleware::map_response(log_request))
        .layer(middleware::from_fn(req_stamp));

    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .map_err(StartError::TcpBind)?;

    tracing::info!(%socket_addr, "anp-runtime listening");

    axum::serve(listener, app).await.map_err(StartError::Serve)?;

    Ok(())
}
