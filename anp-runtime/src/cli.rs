use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use url::Url;

/// Agent Network Protocol runtime: hosts agents behind DIDs and routes
/// inbound requests to them.
#[derive(Debug, Clone, Parser)]
#[command(name = "anp-runtime", version, about)]
pub struct Cli {
    /// Address to bind the HTTP server on.
    #[arg(long, env = "ANP_BIND_ADDR", default_value = "127.0.0.1")]
    pub bind_addr: IpAddr,

    /// Port to bind the HTTP server on. Also the default port used when the
    /// inbound `Host` header is absent.
    #[arg(long, env = "ANP_PORT", default_value_t = 9527)]
    pub port: u16,

    /// Root directory under which every served domain's `<host>_<port>/`
    /// data directory lives.
    #[arg(long, env = "ANP_DATA_ROOT", default_value = "./anp_data")]
    pub data_root: PathBuf,

    /// Additional `host:port` pairs (beyond `localhost:<port>`) this runtime
    /// is configured to serve. May be passed multiple times.
    #[arg(long = "served-domain", env = "ANP_SERVED_DOMAINS", value_delimiter = ',')]
    pub served_domains: Vec<String>,

    /// When set, forward `/agent/api/*` calls to an upstream framework
    /// server instead of routing locally.
    #[arg(long, env = "ANP_USE_FRAMEWORK_SERVER", default_value_t = false)]
    pub use_framework_server: bool,

    /// Upstream framework server base URL, required when
    /// `use_framework_server` is set.
    #[arg(long, env = "ANP_FRAMEWORK_SERVER_URL")]
    pub framework_server_url: Option<Url>,

    /// When the upstream forward fails, fall through to local routing
    /// instead of returning the upstream error.
    #[arg(long, env = "ANP_FALLBACK_TO_LOCAL", default_value_t = true)]
    pub fallback_to_local: bool,

    /// Hosted-DID processor poll interval, in seconds.
    #[arg(long, env = "ANP_HOSTED_DID_POLL_SECONDS", default_value_t = 10)]
    pub hosted_did_poll_seconds: u64,

    /// Backoff applied after an unhandled processor-loop error, in seconds.
    #[arg(long, env = "ANP_HOSTED_DID_BACKOFF_SECONDS", default_value_t = 30)]
    pub hosted_did_backoff_seconds: u64,

    /// Log level filter, e.g. `info`, `anp_runtime=debug,tower_http=warn`.
    #[arg(long, env = "ANP_LOG", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn served_domain_pairs(&self) -> Vec<(String, u16)> {
        let mut pairs = vec![("localhost".to_owned(), self.port)];
        for raw in &self.served_domains {
            let Some((host, port)) = raw.rsplit_once(':') else {
                tracing::warn!(%raw, "ignoring malformed --served-domain entry, expected host:port");
                continue;
            };
            match port.parse() {
                Ok(port) => pairs.push((host.to_owned(), port)),
                Err(_) => tracing::warn!(%raw, "ignoring --served-domain entry with invalid port"),
            }
        }
        pairs
    }
}
