pub mod ad_json;
pub mod jsonrpc;
pub mod openapi;
pub mod params;

use std::path::PathBuf;

use anp_common::state::{Did, DidKind};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::fs;

use crate::state::{domain::DomainPaths, registry::AgentRegistry};

/// One API path, aggregated across every agent sharing a DID.
#[derive(Debug, Clone)]
pub struct AggregatedPath {
    pub path: String,
    pub method: String,
    pub summary: Option<String>,
    pub params: IndexMap<String, Value>,
    pub result: Option<Value>,
}

/// Union-merge every registered API path across the agents sharing `did`.
/// Per the registry's invariants, distinct shared agents have distinct
/// prefixes, so no two agents can contribute the same `path`.
pub async fn aggregate_paths(registry: &AgentRegistry, did: &Did) -> Vec<AggregatedPath> {
    let mut out = Vec::new();
    for (_, registered) in registry.agents_for(did) {
        let agent = registered.agent.read().await;
        for path in agent.api_routes.keys() {
            let config = agent.api_configs.get(path);
            let extracted = params::extract_params(config, path);
            out.push(AggregatedPath {
                path: path.clone(),
                method: config.map(|c| c.method.clone()).unwrap_or_else(|| "POST".to_owned()),
                summary: extracted.summary,
                params: extracted.params,
                result: config.and_then(|c| c.result.clone()),
            });
        }
    }
    out
}

pub struct GeneratedDescriptors {
    pub ad_json: Value,
    pub openapi_yaml: String,
    pub jsonrpc_json: Value,
}

pub async fn generate(registry: &AgentRegistry, did: &Did, base_url: &str) -> GeneratedDescriptors {
    let paths = aggregate_paths(registry, did).await;
    GeneratedDescriptors {
        ad_json: ad_json::build(did, base_url, &paths),
        openapi_yaml: openapi::build_yaml(did, base_url, &paths),
        jsonrpc_json: jsonrpc::build(did, &paths),
    }
}

/// Directory holding a DID's `did_document.json` and generated descriptor
/// files: `anp_users/user_<id>` for regular users, `anp_users_hosted/user_<id>`
/// for hosted ones.
pub fn user_dir_for(domain_paths: &DomainPaths, did: &Did) -> PathBuf {
    let base = match did.kind() {
        DidKind::User => domain_paths.user_did_path(),
        DidKind::HostUser => domain_paths.user_hosted_path(),
    };
    base.join(format!("user_{}", did.unique_id()))
}

/// Regenerate and persist all three descriptor files for `did`. Called
/// whenever the loader finishes wiring an agent's routes, and on explicit
/// request via the publisher API.
pub async fn write_to_disk(
    domain_paths: &DomainPaths,
    did: &Did,
    base_url: &str,
    registry: &AgentRegistry,
) -> std::io::Result<()> {
    fn to_io_err(e: serde_json::Error) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }

    let generated = generate(registry, did, base_url).await;
    let user_dir = user_dir_for(domain_paths, did);
    fs::create_dir_all(&user_dir).await?;

    let ad_json = serde_json::to_vec_pretty(&generated.ad_json).map_err(to_io_err)?;
    fs::write(user_dir.join("ad.json"), ad_json).await?;
    fs::write(user_dir.join("api_interface.yaml"), generated.openapi_yaml).await?;
    let jsonrpc_json = serde_json::to_vec_pretty(&generated.jsonrpc_json).map_err(to_io_err)?;
    fs::write(user_dir.join("api_interface.json"), jsonrpc_json).await?;
    Ok(())
}
