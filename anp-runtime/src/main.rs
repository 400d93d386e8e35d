use std::{io, net::SocketAddr};

use clap::Parser;
use cli::Cli;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{prelude::*, reload, EnvFilter};

use state::GlobalState;

pub mod cli;
pub mod descriptors;
pub mod hosted;
pub mod loader;
pub mod logging;
pub mod server;
pub mod state;

fn make_env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var("ANP_LOG")
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper_util=off".parse().unwrap())
        .add_directive("hyper=off".parse().unwrap())
        .add_directive("tower_http::trace::on_request=off".parse().unwrap())
        .add_directive("tower_http::trace::on_response=off".parse().unwrap())
}

#[tokio::main]
async fn main() {
    let filter_level = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let (env_filter, reload_handler) = reload::Layer::new(make_env_filter(filter_level));
    let (stdout, _guard) = tracing_appender::non_blocking(io::stdout());
    let output = tracing_subscriber::fmt::layer().with_writer(stdout);
    let output = if cfg!(debug_assertions) {
        output.with_file(true).with_line_number(true)
    } else {
        output
    };

    tracing_subscriber::registry().with(env_filter).with(output).try_init().unwrap();

    let cli = Cli::parse();
    let socket_addr = SocketAddr::new(cli.bind_addr, cli.port);

    info!("loading state from {}", cli.data_root.display());
    let state = GlobalState::load(cli, reload_handler).await;

    info!("starting server on {socket_addr}");
    if let Err(err) = server::start(state, socket_addr).await {
        error!("error starting server: {err:?}");
    }
}
