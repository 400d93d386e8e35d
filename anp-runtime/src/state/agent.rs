use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use anp_common::state::{AgentName, Did};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context handed to an API-call handler.
#[derive(Debug, Clone)]
pub struct ApiCallContext {
    pub caller_did: Option<Did>,
    /// The path the handler was registered under: for a shared-DID agent
    /// this includes its path prefix, matching the full path the router
    /// dispatched against.
    pub path: String,
    pub body: Value,
}

/// Context handed to a message handler.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub caller_did: Option<Did>,
    pub message_type: String,
    pub body: Value,
}

/// Context handed to a group-event handler.
#[derive(Debug, Clone)]
pub struct GroupEventContext {
    pub caller_did: Option<Did>,
    pub group_id: String,
    pub event_type: String,
    pub body: Value,
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;
pub type ApiHandler = Arc<dyn Fn(ApiCallContext) -> HandlerFuture + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(MessageContext) -> HandlerFuture + Send + Sync>;
pub type GroupEventHandler = Arc<dyn Fn(GroupEventContext) -> HandlerFuture + Send + Sync>;

/// Declared metadata for one registered API path, consumed by the
/// description generator (`descriptors`) rather than by routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Declared parameters, in declaration order: name -> default/example value.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "POST".to_owned()
}

/// A named functional unit bound to a DID.
///
/// Route/handler maps are owned here; the registry and router only ever hold
/// shared references (`Arc<Agent>`) into this structure, never a copy of its
/// tables.
pub struct Agent {
    pub did: Did,
    pub name: AgentName,
    pub created_at: DateTime<Utc>,
    pub shared: bool,
    pub prefix: Option<String>,
    pub primary_agent: bool,

    pub api_routes: IndexMap<String, ApiHandler>,
    pub message_handlers: IndexMap<String, MessageHandler>,
    pub group_event_handlers: HashMap<(String, String), Vec<GroupEventHandler>>,
    pub global_group_handlers: Vec<GroupEventHandler>,
    pub api_configs: IndexMap<String, ApiConfig>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("did", &self.did)
            .field("name", &self.name)
            .field("shared", &self.shared)
            .field("prefix", &self.prefix)
            .field("primary_agent", &self.primary_agent)
            .field("api_routes", &self.api_routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Agent {
    pub fn new(did: Did, name: AgentName, shared: bool, prefix: Option<String>, primary_agent: bool) -> Self {
        Self {
            did,
            name,
            created_at: Utc::now(),
            shared,
            prefix,
            primary_agent,
            api_routes: IndexMap::new(),
            message_handlers: IndexMap::new(),
            group_event_handlers: HashMap::new(),
            global_group_handlers: Vec::new(),
            api_configs: IndexMap::new(),
        }
    }

    /// A path is "within" this agent's surface if the agent is exclusive, or
    /// (when shared) the path starts with its prefix.
    pub fn owns_path(&self, path: &str) -> bool {
        match &self.prefix {
            Some(prefix) => path.starts_with(prefix.as_str()),
            None => true,
        }
    }

    pub fn register_api(&mut self, path: impl Into<String>, handler: ApiHandler, config: ApiConfig) {
        let path = path.into();
        self.api_configs.insert(path.clone(), config);
        self.api_routes.insert(path, handler);
    }

    pub fn register_message_handler(&mut self, msg_type: impl Into<String>, handler: MessageHandler) {
        self.message_handlers.insert(msg_type.into(), handler);
    }

    pub fn register_group_handler(
        &mut self,
        group_id: impl Into<String>,
        event_type: impl Into<String>,
        handler: GroupEventHandler,
    ) {
        self.group_event_handlers
            .entry((group_id.into(), event_type.into()))
            .or_default()
            .push(handler);
    }

    pub fn register_global_group_handler(&mut self, handler: GroupEventHandler) {
        self.global_group_handlers.push(handler);
    }

    /// Dispatch an API call to the handler registered at `path`, falling
    /// back to the wildcard message handler's semantics only if `path`
    /// matches exactly: routing decides *which* agent, this only decides
    /// *which handler on the agent*.
    pub async fn handle_api_call(&self, path: &str, ctx: ApiCallContext) -> Result<Value, HandlerError> {
        match self.api_routes.get(path) {
            Some(handler) => handler(ctx).await,
            None => Err(HandlerError::new(format!("no API handler registered for `{path}`"))),
        }
    }

    /// Dispatch a message, preferring an exact `message_type` match and
    /// falling back to the `"*"` wildcard handler.
    pub async fn handle_message(&self, ctx: MessageContext) -> Result<Value, HandlerError> {
        let handler = self
            .message_handlers
            .get(ctx.message_type.as_str())
            .or_else(|| self.message_handlers.get("*"));

        match handler {
            Some(handler) => handler(ctx).await,
            None => Err(HandlerError::new(format!(
                "agent `{}` has no message handler for type `{}`",
                self.name, ctx.message_type
            ))),
        }
    }

    pub async fn handle_group_event(&self, ctx: GroupEventContext) -> Result<Value, HandlerError> {
        let key = (ctx.group_id.clone(), ctx.event_type.clone());
        if let Some(handlers) = self.group_event_handlers.get(&key) {
            let mut last = Err(HandlerError::new("no group handler executed"));
            for handler in handlers {
                last = handler(ctx.clone()).await;
            }
            return last;
        }

        if !self.global_group_handlers.is_empty() {
            let mut last = Err(HandlerError::new("no group handler executed"));
            for handler in &self.global_group_handlers {
                last = handler(ctx.clone()).await;
            }
            return last;
        }

        Err(HandlerError::new(format!(
            "agent `{}` has no handler for group `{}` event `{}`",
            self.name, ctx.group_id, ctx.event_type
        )))
    }

    pub fn is_message_capable(&self) -> bool {
        !self.message_handlers.is_empty()
    }
}
