pub mod agent;
pub mod contacts;
pub mod domain;
pub mod registry;
pub mod router;

use std::sync::Arc;

use dashmap::DashMap;
use tracing_subscriber::{reload, EnvFilter};

pub use agent::Agent;
pub use contacts::ContactBook;
pub use domain::DomainManager;
pub use registry::AgentRegistry;
pub use router::Router;

use crate::{cli::Cli, hosted::HostedDidSubsystem};

pub type ReloadHandler = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Process-wide state, handed to every request handler and background task
/// as `Arc<GlobalState>`.
pub struct GlobalState {
    pub cli: Cli,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<Router>,
    pub domains: Arc<DomainManager>,
    pub hosted: HostedDidSubsystem,
    /// Per-user contact books, keyed by the owning user's DID string.
    pub contacts: DashMap<String, Arc<ContactBook>>,
    pub log_level_handler: ReloadHandler,
}

impl GlobalState {
    pub async fn load(cli: Cli, log_level_handler: ReloadHandler) -> Arc<Self> {
        let domains = Arc::new(DomainManager::new(cli.data_root.clone(), cli.served_domain_pairs()));
        let registry = Arc::new(AgentRegistry::new());
        let router = Arc::new(Router::new(Arc::clone(&registry)));

        let poll = std::time::Duration::from_secs(cli.hosted_did_poll_seconds);
        let backoff = std::time::Duration::from_secs(cli.hosted_did_backoff_seconds);
        let hosted = HostedDidSubsystem::start(&domains, poll, backoff).await;

        Arc::new(Self {
            cli,
            registry,
            router,
            domains,
            hosted,
            contacts: DashMap::new(),
            log_level_handler,
        })
    }

    pub fn contact_book(&self, owner_did: &str) -> Arc<ContactBook> {
        Arc::clone(
            self.contacts
                .entry(owner_did.to_owned())
                .or_insert_with(|| Arc::new(ContactBook::default()))
                .value(),
        )
    }
}

pub trait GetGlobalState<'a> {
    fn global_state(self) -> &'a GlobalState;
}

impl<'a> GetGlobalState<'a> for &'a GlobalState {
    fn global_state(self) -> &'a GlobalState {
        self
    }
}

impl<'a> GetGlobalState<'a> for &'a Arc<GlobalState> {
    fn global_state(self) -> &'a GlobalState {
        self
    }
}
