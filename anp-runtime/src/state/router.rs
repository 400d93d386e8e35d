use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anp_common::state::{AgentName, Did};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use wildmatch::WildMatch;

use super::{
    agent::Agent,
    registry::{AgentLookup, AgentRegistry, OwnershipMode},
};

/// What kind of inbound call is being routed. Messages skip shared-DID
/// prefix routing entirely and resolve to a single "message-capable" agent.
#[derive(Debug, Clone)]
pub enum RequestKind {
    ApiCall,
    Message,
    GroupEvent { group_id: String, event_type: String },
}

#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub host: String,
    pub port: u16,
    pub target_did: Did,
    pub kind: RequestKind,
    pub path: String,
}

#[derive(Debug, Error, Clone, Serialize)]
pub enum RoutingError {
    #[error("no agent found for `{did}`; available for {host}:{port}: {available:?}")]
    NotFound {
        did: String,
        host: String,
        port: u16,
        available: Vec<String>,
    },
    #[error("agent `{name}` registered on `{did}` cannot handle this request kind")]
    NotCallable { did: String, name: String },
}

anp_common::impl_into_status_code!(RoutingError, |e| match e {
    NotFound { .. } => ::http::StatusCode::NOT_FOUND,
    NotCallable { .. } => ::http::StatusCode::INTERNAL_SERVER_ERROR,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupTier {
    Exact,
    CrossPort,
    Global,
}

/// Resolved routing decision: which agent, and which domain it was reached
/// through (set on the per-request state per the dispatch contract).
pub struct Resolved {
    pub agent: Arc<RwLock<Agent>>,
    pub host: String,
    pub port: u16,
}

/// `sharedDID -> fullPath -> (agentName, originalPath)`, kept for external
/// enumeration of the effective routing table. Not consulted by
/// [`Router::resolve`] itself — see the design note on wildcard semantics.
#[derive(Default)]
pub struct SharedDidRoutingTable {
    table: DashMap<Did, IndexMap<String, (AgentName, String)>>,
}

impl SharedDidRoutingTable {
    pub fn insert(&self, shared_did: Did, full_path: String, agent_name: AgentName, original_path: String) {
        self.table
            .entry(shared_did)
            .or_default()
            .insert(full_path, (agent_name, original_path));
    }

    /// Resolve `request_path` against the enumerated table for `did`,
    /// expanding a trailing-`*` wildcard entry by appending the unmatched
    /// remainder to the entry's original path.
    pub fn enumerate_match(&self, did: &Did, request_path: &str) -> Option<(AgentName, String)> {
        let entries = self.table.get(did)?;
        for (full_path, (name, original_path)) in entries.iter() {
            if let Some(prefix) = full_path.strip_suffix('*') {
                if WildMatch::new(full_path).matches(request_path) || request_path.starts_with(prefix) {
                    let remainder = request_path.strip_prefix(prefix).unwrap_or("");
                    return Some((*name, format!("{original_path}{remainder}")));
                }
            } else if full_path == request_path {
                return Some((*name, original_path.clone()));
            }
        }
        None
    }

    pub fn snapshot(&self, did: &Did) -> IndexMap<String, (AgentName, String)> {
        self.table.get(did).map(|e| e.clone()).unwrap_or_default()
    }
}

/// Domain-aware resolution from `(inboundHost, inboundPort, targetDID, path)`
/// to exactly one agent.
///
/// Buckets are populated lazily via [`Router::attach`] as agents are looked
/// up, plus eagerly whenever the loader registers one — mirroring the
/// control-plane's pattern of a concurrent index that the registry is the
/// source of truth for and the index merely caches.
pub struct Router {
    registry: Arc<AgentRegistry>,
    index: DashMap<(String, u16), IndexMap<String, Arc<RwLock<Agent>>>>,
    global: DashMap<String, Arc<RwLock<Agent>>>,
    pub shared_routing_table: SharedDidRoutingTable,
    routing_errors: AtomicU64,
}

impl Router {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            index: DashMap::new(),
            global: DashMap::new(),
            shared_routing_table: SharedDidRoutingTable::default(),
            routing_errors: AtomicU64::new(0),
        }
    }

    pub fn routing_error_count(&self) -> u64 {
        self.routing_errors.load(Ordering::Relaxed)
    }

    fn registration_keys(did: &Did, name: AgentName) -> [String; 3] {
        [did.to_string(), name.to_string(), format!("{did}#{name}")]
    }

    /// Attach a single registered `(did, name)` pair into the domain index
    /// and the global fallback table, and, if it is a shared-DID agent,
    /// into the shared-DID routing table operators can enumerate.
    pub async fn attach(&self, did: &Did, name: AgentName) {
        let agent = match self.registry.get_agent(did, Some(name)) {
            AgentLookup::Single(agent) => agent,
            _ => return,
        };

        let host = did.host().to_string();
        let port = did.port();
        {
            let mut bucket = self.index.entry((host, port)).or_default();
            for key in Self::registration_keys(did, name) {
                bucket.insert(key.clone(), Arc::clone(&agent));
                if let Some(previous) = self.global.insert(key.clone(), Arc::clone(&agent)) {
                    if !Arc::ptr_eq(&previous, &agent) {
                        tracing::warn!(%key, "global routing table entry overwritten (last-writer-wins)");
                    }
                }
            }
        }

        let agent_guard = agent.read().await;
        if let Some(prefix) = &agent_guard.prefix {
            for full_path in agent_guard.api_routes.keys() {
                let original_path = full_path.strip_prefix(prefix.as_str()).unwrap_or(full_path.as_str());
                self.shared_routing_table
                    .insert(did.clone(), full_path.clone(), name, original_path.to_owned());
            }
        }
    }

    /// Lazily pull every agent currently registered under `did` into the
    /// index — called on a routing cache miss before giving up.
    pub async fn attach_all(&self, did: &Did) {
        for (name, _) in self.registry.agents_for(did) {
            self.attach(did, name).await;
        }
    }

    fn lookup_generic(&self, host: &str, port: u16, key: &str) -> Option<(Arc<RwLock<Agent>>, LookupTier)> {
        if let Some(bucket) = self.index.get(&(host.to_owned(), port)) {
            if let Some(agent) = bucket.get(key) {
                return Some((Arc::clone(agent), LookupTier::Exact));
            }
        }

        for entry in self.index.iter() {
            let (h, p) = entry.key();
            if h == host && *p != port {
                if let Some(agent) = entry.value().get(key) {
                    tracing::warn!(%host, %port, other_port = p, %key, "resolved via cross-port fallback");
                    return Some((Arc::clone(agent), LookupTier::CrossPort));
                }
            }
        }

        if let Some(agent) = self.global.get(key) {
            tracing::warn!(%host, %port, %key, "resolved via global fallback table");
            return Some((Arc::clone(agent.value()), LookupTier::Global));
        }

        None
    }

    fn available_for(&self, host: &str, port: u16) -> Vec<String> {
        self.index
            .get(&(host.to_owned(), port))
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Select a message-capable agent for `did`: the primary of a shared DID,
    /// else the first agent with any message handler, else any agent at all.
    async fn select_message_agent(&self, did: &Did) -> Option<(AgentName, Arc<RwLock<Agent>>)> {
        let agents = self.registry.agents_for(did);
        if agents.is_empty() {
            return None;
        }

        if let Some((name, registered)) = agents.iter().find(|(_, r)| r.primary_agent) {
            return Some((*name, Arc::clone(&registered.agent)));
        }

        for (name, registered) in &agents {
            if registered.agent.read().await.is_message_capable() {
                return Some((*name, Arc::clone(&registered.agent)));
            }
        }

        let (name, registered) = &agents[0];
        Some((*name, Arc::clone(&registered.agent)))
    }

    pub async fn resolve(&self, req: &InboundRequest) -> Result<Resolved, RoutingError> {
        let did = &req.target_did;
        let host = req.host.clone();
        let port = req.port;

        if matches!(req.kind, RequestKind::Message) {
            if let Some((_, agent)) = self.select_message_agent(did).await {
                return Ok(Resolved { agent, host, port });
            }
            self.routing_errors.fetch_add(1, Ordering::Relaxed);
            return Err(RoutingError::NotFound {
                did: did.to_string(),
                host,
                port,
                available: self.available_for(&host, port),
            });
        }

        let agents = self.registry.agents_for(did);
        if agents.len() >= 2 && self.registry.mode_for(did) == Some(OwnershipMode::Shared) {
            for (_, registered) in &agents {
                if let Some(prefix) = &registered.prefix {
                    if req.path.starts_with(prefix.as_str()) {
                        return Ok(Resolved {
                            agent: Arc::clone(&registered.agent),
                            host,
                            port,
                        });
                    }
                }
            }
        }

        let key = did.to_string();
        if let Some((agent, _)) = self.lookup_generic(&host, port, &key) {
            return Ok(Resolved { agent, host, port });
        }

        self.attach_all(did).await;
        if let Some((agent, _)) = self.lookup_generic(&host, port, &key) {
            return Ok(Resolved { agent, host, port });
        }

        self.routing_errors.fetch_add(1, Ordering::Relaxed);
        Err(RoutingError::NotFound {
            did: did.to_string(),
            host: host.clone(),
            port,
            available: self.available_for(&host, port),
        })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use anp_common::state::InternedId;

    use super::*;

    fn did() -> Did {
        Did::parse("did:wba:localhost%3A9527:wba:user:BBBB").unwrap()
    }

    #[tokio::test]
    async fn shared_prefix_routes_to_correct_agent() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .create_agent(
                did(),
                InternedId::from_str("weather").unwrap(),
                true,
                Some("/weather".into()),
                true,
            )
            .unwrap();
        registry
            .create_agent(
                did(),
                InternedId::from_str("assistant").unwrap(),
                true,
                Some("/assistant".into()),
                false,
            )
            .unwrap();

        let router = Router::new(Arc::clone(&registry));
        let req = InboundRequest {
            host: "localhost".into(),
            port: 9527,
            target_did: did(),
            kind: RequestKind::ApiCall,
            path: "/assistant/help".into(),
        };
        let resolved = router.resolve(&req).await.unwrap();
        assert_eq!(resolved.agent.read().await.name, InternedId::from_str("assistant").unwrap());
    }

    #[tokio::test]
    async fn message_bypasses_prefix_and_hits_primary() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .create_agent(
                did(),
                InternedId::from_str("weather").unwrap(),
                true,
                Some("/weather".into()),
                true,
            )
            .unwrap();
        registry
            .create_agent(
                did(),
                InternedId::from_str("assistant").unwrap(),
                true,
                Some("/assistant".into()),
                false,
            )
            .unwrap();

        let router = Router::new(Arc::clone(&registry));
        let req = InboundRequest {
            host: "localhost".into(),
            port: 9527,
            target_did: did(),
            kind: RequestKind::Message,
            path: "/assistant/help".into(),
        };
        let resolved = router.resolve(&req).await.unwrap();
        assert_eq!(resolved.agent.read().await.name, InternedId::from_str("weather").unwrap());
    }

    #[tokio::test]
    async fn unknown_did_is_not_found() {
        let registry = Arc::new(AgentRegistry::new());
        let router = Router::new(registry);
        let req = InboundRequest {
            host: "localhost".into(),
            port: 9527,
            target_did: did(),
            kind: RequestKind::ApiCall,
            path: "/x".into(),
        };
        assert!(router.resolve(&req).await.is_err());
    }

    #[tokio::test]
    async fn attach_populates_shared_routing_table_with_full_paths() {
        let registry = Arc::new(AgentRegistry::new());
        let name = InternedId::from_str("weather").unwrap();
        let agent = registry
            .create_agent(did(), name, true, Some("/weather".into()), true)
            .unwrap();
        agent.write().await.register_api(
            "/weather/current".to_owned(),
            Arc::new(|_ctx| {
                let fut: crate::state::agent::HandlerFuture = Box::pin(async { Ok(serde_json::json!({})) });
                fut
            }),
            Default::default(),
        );

        let router = Router::new(Arc::clone(&registry));
        router.attach(&did(), name).await;

        let snapshot = router.shared_routing_table.snapshot(&did());
        let (found_name, original_path) = snapshot.get("/weather/current").unwrap();
        assert_eq!(*found_name, name);
        assert_eq!(original_path, "/current");
    }

    #[tokio::test]
    async fn cross_port_fallback_succeeds_with_warning() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .create_agent(did(), InternedId::from_str("calc").unwrap(), false, None, false)
            .unwrap();
        let router = Router::new(Arc::clone(&registry));
        router.attach_all(&did()).await;

        let req = InboundRequest {
            host: "localhost".into(),
            port: 8000,
            target_did: did(),
            kind: RequestKind::ApiCall,
            path: "/add".into(),
        };
        let resolved = router.resolve(&req).await.unwrap();
        assert_eq!(resolved.agent.read().await.name, InternedId::from_str("calc").unwrap());
    }
}
