use std::{collections::HashSet, path::PathBuf};

use serde::Serialize;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9527;

/// Resolved, on-disk layout for one served `(host, port)` domain.
#[derive(Debug, Clone)]
pub struct DomainPaths {
    pub base: PathBuf,
}

impl DomainPaths {
    /// Where non-hosted users' `did_document.json` and descriptor files live.
    pub fn user_did_path(&self) -> PathBuf {
        self.base.join("anp_users")
    }

    /// Where hosted-DID documents are materialized once issued.
    pub fn user_hosted_path(&self) -> PathBuf {
        self.base.join("anp_users_hosted")
    }

    /// Root for the hosted-DID queue and result store.
    pub fn hosted_workflow_path(&self) -> PathBuf {
        self.base.join("anp_hosted_did")
    }

    pub fn contacts_path(&self) -> PathBuf {
        self.base.join("anp_contacts")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainAccessDenied {
    pub host: String,
    pub port: u16,
    pub reason: String,
}

impl std::fmt::Display for DomainAccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} is not a served domain: {}", self.host, self.port, self.reason)
    }
}

impl std::error::Error for DomainAccessDenied {}

anp_common::impl_into_status_code!(DomainAccessDenied, |_| http::StatusCode::FORBIDDEN);

/// Maps an inbound `Host` header to a data directory and decides whether the
/// runtime is configured to serve that virtual host at all.
///
/// `127.0.0.1` and `0.0.0.0` are treated as aliases of `localhost`, matching
/// how a developer's browser and a container's default bind address both
/// resolve to the same local identity.
pub struct DomainManager {
    data_root: PathBuf,
    served: HashSet<(String, u16)>,
}

impl DomainManager {
    pub fn new(data_root: PathBuf, served: impl IntoIterator<Item = (String, u16)>) -> Self {
        let served = served
            .into_iter()
            .map(|(host, port)| (Self::normalize_host(&host), port))
            .collect();
        Self { data_root, served }
    }

    /// A manager that serves only `localhost:<port>` (and its aliases) —
    /// the default single-domain deployment.
    pub fn single(data_root: PathBuf, port: u16) -> Self {
        Self::new(data_root, [(DEFAULT_HOST.to_owned(), port)])
    }

    pub fn normalize_host(host: &str) -> String {
        match host {
            "127.0.0.1" | "0.0.0.0" => DEFAULT_HOST.to_owned(),
            other => other.to_owned(),
        }
    }

    /// Parse a `Host` header value (`host` or `host:port`) into
    /// `(host, port)`, defaulting to `localhost:9527` when absent or
    /// unparsable.
    pub fn parse_host_header(&self, header: Option<&str>) -> (String, u16) {
        let Some(raw) = header else {
            return (DEFAULT_HOST.to_owned(), DEFAULT_PORT);
        };

        match raw.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (Self::normalize_host(host), port),
                Err(_) => (Self::normalize_host(raw), DEFAULT_PORT),
            },
            None => (Self::normalize_host(raw), DEFAULT_PORT),
        }
    }

    pub fn is_served(&self, host: &str, port: u16) -> bool {
        self.served.contains(&(Self::normalize_host(host), port))
    }

    pub fn validate(&self, host: &str, port: u16) -> Result<(), DomainAccessDenied> {
        if self.is_served(host, port) {
            Ok(())
        } else {
            Err(DomainAccessDenied {
                host: host.to_owned(),
                port,
                reason: "host:port is not in the configured served-domain list".to_owned(),
            })
        }
    }

    pub fn paths_for(&self, host: &str, port: u16) -> DomainPaths {
        let host = Self::normalize_host(host);
        DomainPaths {
            base: self.data_root.join(format!("{host}_{port}")),
        }
    }

    pub fn served_domains(&self) -> Vec<(String, u16)> {
        self.served.iter().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aliases_loopback_to_localhost() {
        let dm = DomainManager::single(PathBuf::from("/tmp/anp"), 9527);
        assert!(dm.is_served("127.0.0.1", 9527));
        assert!(dm.is_served("0.0.0.0", 9527));
        assert!(dm.is_served("localhost", 9527));
        assert!(!dm.is_served("example.com", 9527));
    }

    #[test]
    fn parses_host_header_with_default_fallback() {
        let dm = DomainManager::single(PathBuf::from("/tmp/anp"), 9527);
        assert_eq!(
            dm.parse_host_header(Some("localhost:9527")),
            ("localhost".to_owned(), 9527)
        );
        assert_eq!(dm.parse_host_header(None), ("localhost".to_owned(), 9527));
        assert_eq!(
            dm.parse_host_header(Some("127.0.0.1:8000")),
            ("localhost".to_owned(), 8000)
        );
    }

    #[test]
    fn validate_rejects_unserved_domain() {
        let dm = DomainManager::single(PathBuf::from("/tmp/anp"), 9527);
        assert!(dm.validate("localhost", 9527).is_ok());
        assert!(dm.validate("evil.example", 9527).is_err());
    }
}
