use std::{collections::HashMap, str::FromStr, sync::Arc};

use anp_common::state::{AgentName, Did, DidParseError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::state::{
    agent::{Agent, ApiConfig, ApiHandler, GroupEventHandler, HandlerFuture, MessageHandler},
    registry::{AgentRegistry, RegistrationConflict},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShareDidConfig {
    #[serde(default)]
    pub enabled: bool,
    pub shared_did: Option<String>,
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub primary_agent: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiEntry {
    pub path: String,
    pub handler: String,
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// One agent's YAML deployment descriptor: identity, optional shared-DID
/// placement, declared API surface, and the well-known message-handler
/// names this agent exports.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub did: String,
    #[serde(default)]
    pub share_did: Option<ShareDidConfig>,
    #[serde(default)]
    pub api: Vec<ApiEntry>,
    /// Names such as `handle_message`, `handle_text_message`, resolved
    /// against [`HandlerModule::message_handlers`] by convention.
    #[serde(default)]
    pub message_handlers: Vec<String>,
    #[serde(default)]
    pub group_handlers: Vec<GroupHandlerEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupHandlerEntry {
    pub group_id: Option<String>,
    pub event_type: Option<String>,
    pub handler: String,
}

/// The compiled handler callables a descriptor's `handler` names resolve
/// against. Stands in for the dynamic module import the originating
/// framework performs: in Rust, handlers are written and registered in
/// code, so the binary assembles this set and hands it to the loader
/// instead of the loader importing a module by path.
#[derive(Default)]
pub struct HandlerModule {
    pub api_handlers: HashMap<String, ApiHandler>,
    pub message_handlers: HashMap<String, MessageHandler>,
    pub group_handlers: HashMap<String, GroupEventHandler>,
    /// Present when this module is "self-registering": the loader yields
    /// the freshly-created agent to it instead of wiring `api`/handlers
    /// itself.
    pub self_register: Option<Arc<dyn Fn(Arc<RwLock<Agent>>) -> HandlerFuture + Send + Sync>>,
    /// Returned to the caller so the server can await it once the server
    /// is up, per the `initializeAgent` hook contract.
    pub initialize: Option<Arc<dyn Fn(Arc<RwLock<Agent>>) -> HandlerFuture + Send + Sync>>,
    pub cleanup: Option<Arc<dyn Fn() -> HandlerFuture + Send + Sync>>,
}

#[derive(Debug, Error, Clone, Serialize)]
pub enum LoadError {
    #[error("invalid DID in descriptor: {0}")]
    Did(#[from] DidParseError),
    #[error(transparent)]
    Registration(#[from] RegistrationConflict),
    #[error("descriptor references unknown handler `{0}`")]
    MissingHandler(String),
    #[error("shared_did.enabled requires shared_did and path_prefix")]
    MissingShareFields,
    #[error("self-registering handler module failed: {0}")]
    SelfRegistrationFailed(String),
}

anp_common::impl_into_status_code!(LoadError, |_| ::http::StatusCode::INTERNAL_SERVER_ERROR);

pub struct LoadedAgent {
    pub agent: Arc<RwLock<Agent>>,
    pub initialize: Option<Arc<dyn Fn(Arc<RwLock<Agent>>) -> HandlerFuture + Send + Sync>>,
    pub cleanup: Option<Arc<dyn Fn() -> HandlerFuture + Send + Sync>>,
}

/// `handle_message` and friends are message handlers by naming convention;
/// anything else in `message_handlers` is treated as a custom message type
/// name used verbatim as the dispatch key.
fn message_type_for(handler_name: &str) -> &str {
    match handler_name {
        "handle_message" => "*",
        "handle_text_message" => "text",
        other => other,
    }
}

/// Load one agent from its descriptor: create it via the registry (so
/// ownership conflicts are enforced exactly as any programmatic
/// registration would be), wire its declared API routes and message
/// handlers, and hand back any `initialize`/`cleanup` hooks for the caller
/// to run.
pub async fn load(
    descriptor: &AgentDescriptor,
    handlers: &HandlerModule,
    registry: &AgentRegistry,
) -> Result<LoadedAgent, LoadError> {
    let name: AgentName = AgentName::from_str(&descriptor.name).unwrap_or_else(|_| AgentName::rand());

    let (did, shared, prefix, primary_agent) = match &descriptor.share_did {
        Some(share) if share.enabled => {
            let shared_did = share.shared_did.as_deref().ok_or(LoadError::MissingShareFields)?;
            let prefix = share.path_prefix.clone().ok_or(LoadError::MissingShareFields)?;
            (Did::parse(shared_did)?, true, Some(prefix), share.primary_agent)
        }
        _ => (Did::parse(&descriptor.did)?, false, None, false),
    };

    let agent = registry.create_agent(did.clone(), name, shared, prefix, primary_agent)?;

    if let Some(self_register) = &handlers.self_register {
        self_register(Arc::clone(&agent))
            .await
            .map_err(|e| LoadError::SelfRegistrationFailed(e.message))?;
        return Ok(LoadedAgent {
            agent,
            initialize: handlers.initialize.clone(),
            cleanup: handlers.cleanup.clone(),
        });
    }

    {
        let mut agent_mut = agent.write().await;
        for entry in &descriptor.api {
            let handler = handlers
                .api_handlers
                .get(&entry.handler)
                .cloned()
                .ok_or_else(|| LoadError::MissingHandler(entry.handler.clone()))?;
            let config = ApiConfig {
                params: entry.params.clone(),
                summary: entry.summary.clone(),
                result: entry.result.clone(),
                method: entry.method.clone().unwrap_or_else(|| "POST".to_owned()),
            };
            // Shared agents register under their full prefixed path: the router
            // dispatches the full request path, and `Agent::handle_api_call` looks
            // the handler up by the exact key it was registered under.
            let full_path = match &prefix {
                Some(p) => format!("{p}{}", entry.path),
                None => entry.path.clone(),
            };
            agent_mut.register_api(full_path, handler, config);
        }

        let is_non_primary_shared = shared && !primary_agent;
        for handler_name in &descriptor.message_handlers {
            if is_non_primary_shared {
                tracing::warn!(
                    agent = %descriptor.name,
                    %handler_name,
                    "non-primary shared agent attempted to register a message handler; ignoring (expected behavior)"
                );
                continue;
            }
            let Some(handler) = handlers.message_handlers.get(handler_name).cloned() else {
                return Err(LoadError::MissingHandler(handler_name.clone()));
            };
            agent_mut.register_message_handler(message_type_for(handler_name), handler);
        }

        for entry in &descriptor.group_handlers {
            let Some(handler) = handlers.group_handlers.get(&entry.handler).cloned() else {
                return Err(LoadError::MissingHandler(entry.handler.clone()));
            };
            match (&entry.group_id, &entry.event_type) {
                (Some(group_id), Some(event_type)) => {
                    agent_mut.register_group_handler(group_id.clone(), event_type.clone(), handler)
                }
                _ => agent_mut.register_global_group_handler(handler),
            }
        }
    }

    Ok(LoadedAgent {
        agent,
        initialize: handlers.initialize.clone(),
        cleanup: handlers.cleanup.clone(),
    })
}

#[cfg(test)]
mod test {
    use std::pin::Pin;

    use serde_json::json;

    use super::*;
    use crate::state::agent::HandlerError;

    fn noop_handler() -> ApiHandler {
        Arc::new(|_ctx| {
            let fut: Pin<Box<dyn std::future::Future<Output = Result<Value, HandlerError>> + Send>> =
                Box::pin(async { Ok(json!({"ok": true})) });
            fut
        })
    }

    #[tokio::test]
    async fn loads_exclusive_agent_with_api_routes() {
        let registry = AgentRegistry::new();
        let mut handlers = HandlerModule::default();
        handlers.api_handlers.insert("add".to_owned(), noop_handler());

        let descriptor = AgentDescriptor {
            name: "calc".into(),
            did: "did:wba:localhost%3A9527:wba:user:AAAA".into(),
            share_did: None,
            api: vec![ApiEntry {
                path: "/add".into(),
                handler: "add".into(),
                params: IndexMap::new(),
                summary: Some("adds".into()),
                method: None,
                result: None,
            }],
            message_handlers: vec![],
            group_handlers: vec![],
        };

        let loaded = load(&descriptor, &handlers, &registry).await.unwrap();
        let agent = loaded.agent.read().await;
        assert!(agent.api_routes.contains_key("/add"));
    }

    #[tokio::test]
    async fn non_primary_shared_agent_message_handler_is_downgraded() {
        let registry = AgentRegistry::new();
        let mut handlers = HandlerModule::default();
        handlers.message_handlers.insert(
            "handle_message".to_owned(),
            Arc::new(|_ctx| Box::pin(async { Ok(json!({})) })),
        );

        let descriptor = AgentDescriptor {
            name: "assistant".into(),
            did: "ignored".into(),
            share_did: Some(ShareDidConfig {
                enabled: true,
                shared_did: Some("did:wba:localhost%3A9527:wba:user:BBBB".into()),
                path_prefix: Some("/assistant".into()),
                primary_agent: false,
            }),
            api: vec![],
            message_handlers: vec!["handle_message".into()],
            group_handlers: vec![],
        };

        let loaded = load(&descriptor, &handlers, &registry).await.unwrap();
        let agent = loaded.agent.read().await;
        assert!(agent.message_handlers.is_empty());
    }

    #[tokio::test]
    async fn shared_agent_registers_api_under_its_full_prefixed_path() {
        let registry = AgentRegistry::new();
        let mut handlers = HandlerModule::default();
        handlers.api_handlers.insert("current".to_owned(), noop_handler());

        let descriptor = AgentDescriptor {
            name: "weather".into(),
            did: "ignored".into(),
            share_did: Some(ShareDidConfig {
                enabled: true,
                shared_did: Some("did:wba:localhost%3A9527:wba:user:BBBB".into()),
                path_prefix: Some("/weather".into()),
                primary_agent: true,
            }),
            api: vec![ApiEntry {
                path: "/current".into(),
                handler: "current".into(),
                params: IndexMap::new(),
                summary: None,
                method: None,
                result: None,
            }],
            message_handlers: vec![],
            group_handlers: vec![],
        };

        let loaded = load(&descriptor, &handlers, &registry).await.unwrap();
        let agent = loaded.agent.read().await;
        assert!(agent.api_routes.contains_key("/weather/current"));
        assert!(agent.api_configs.contains_key("/weather/current"));
        assert!(!agent.api_routes.contains_key("/current"));
    }
}
