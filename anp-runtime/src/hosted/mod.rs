pub mod processor;
pub mod queue;
pub mod result_store;
pub mod transform;

use std::{sync::Arc, time::Duration};

use anp_common::state::RequestId;
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::state::domain::{DomainManager, DomainPaths};

pub use queue::{HostedDidQueue, HostedDidRequest, QueueError, RequestStatus};
pub use result_store::{HostedDidResult, HostedDidResultStore, ResultStoreError};

/// Hosted-DID queue, result store, and background processor for one served
/// `(host, port)` domain.
pub struct DomainHostedDid {
    pub queue: Arc<HostedDidQueue>,
    pub results: Arc<HostedDidResultStore>,
    processor: JoinHandle<()>,
}

impl Drop for DomainHostedDid {
    fn drop(&mut self) {
        self.processor.abort();
    }
}

/// Owns one [`DomainHostedDid`] per served domain and dispatches the
/// externally-facing queue/result operations to the right one.
pub struct HostedDidSubsystem {
    domains: DashMap<(String, u16), Arc<DomainHostedDid>>,
}

impl HostedDidSubsystem {
    /// Spin up a queue, result store, and background processor for every
    /// domain the [`DomainManager`] is configured to serve.
    pub async fn start(domain_manager: &DomainManager, poll: Duration, backoff: Duration) -> Self {
        let domains = DashMap::new();
        for (host, port) in domain_manager.served_domains() {
            let paths = Arc::new(domain_manager.paths_for(&host, port));
            let queue = Arc::new(HostedDidQueue::new(paths.hosted_workflow_path().join("queue")));
            let results = Arc::new(HostedDidResultStore::new(paths.hosted_workflow_path().join("results")));

            if let Err(e) = queue.ensure_dirs().await {
                tracing::error!(%host, %port, "failed to create hosted-DID queue directories: {e}");
            }
            if let Err(e) = results.ensure_dirs().await {
                tracing::error!(%host, %port, "failed to create hosted-DID result directories: {e}");
            }
            if let Err(e) = tokio::fs::create_dir_all(paths.user_hosted_path()).await {
                tracing::error!(%host, %port, "failed to create hosted-user directory: {e}");
            }

            let processor = tokio::spawn(processor::run(
                Arc::clone(&queue),
                Arc::clone(&results),
                Arc::clone(&paths),
                host.clone(),
                port,
                poll,
                backoff,
            ));

            domains.insert(
                (host, port),
                Arc::new(DomainHostedDid {
                    queue,
                    results,
                    processor,
                }),
            );
        }

        Self { domains }
    }

    pub fn for_domain(&self, host: &str, port: u16) -> Option<Arc<DomainHostedDid>> {
        self.domains.get(&(DomainManager::normalize_host(host), port)).map(|e| Arc::clone(e.value()))
    }

    pub async fn add_request(
        &self,
        host: &str,
        port: u16,
        request_id: RequestId,
        requester_did: String,
        did_document: Value,
        callback_info: Option<Value>,
    ) -> Result<HostedDidRequest, AddRequestError> {
        let domain = self.for_domain(host, port).ok_or(AddRequestError::UnservedDomain)?;
        domain
            .queue
            .add_request(request_id, requester_did, did_document, callback_info)
            .await
            .map_err(AddRequestError::Queue)
    }
}

#[derive(Debug, thiserror::Error, Clone, serde::Serialize)]
pub enum AddRequestError {
    #[error("host:port is not a served hosted-DID domain")]
    UnservedDomain,
    #[error(transparent)]
    Queue(#[from] QueueError),
}

anp_common::impl_into_status_code!(AddRequestError, |e| match e {
    UnservedDomain => ::http::StatusCode::FORBIDDEN,
    Queue(inner) => inner.into(),
});
