use std::sync::Arc;

use anp_common::state::{AgentName, Did};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use super::agent::Agent;

/// Whether a DID's surface is owned by a single agent or partitioned by
/// path prefix across several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipMode {
    Exclusive,
    Shared,
}

/// Registry-level metadata for one agent, duplicated from [`Agent`] itself so
/// conflict checks never need to lock the agent to answer "what prefix does
/// this hold".
#[derive(Clone)]
pub struct RegisteredAgent {
    pub agent: Arc<RwLock<Agent>>,
    pub shared: bool,
    pub prefix: Option<String>,
    pub primary_agent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RegistryEntry {
    pub mode: Option<OwnershipMode>,
    /// Insertion-ordered: shared-DID prefix routing depends on this order.
    pub agents: IndexMap<AgentName, RegisteredAgent>,
}

#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrationConflict {
    #[error("DID `{did}` is already exclusively owned by agent `{existing}`")]
    ExclusiveConflict { did: String, existing: String },
    #[error("shared agents must declare a non-empty path prefix")]
    MissingPrefix,
    #[error("DID `{did}` is exclusively owned and cannot also host a shared agent")]
    ModeConflict { did: String },
    #[error("DID `{did}` already has a shared agent registered under prefix `{prefix}`")]
    PrefixConflict { did: String, prefix: String },
    #[error("DID `{did}` already has a primary agent (`{existing}`)")]
    PrimaryConflict { did: String, existing: String },
}

anp_common::impl_into_status_code!(RegistrationConflict, |_| http::StatusCode::CONFLICT);

/// Result of looking an agent up by DID, with or without a disambiguating
/// name.
pub enum AgentLookup {
    None,
    Single(Arc<RwLock<Agent>>),
    Many(IndexMap<AgentName, Arc<RwLock<Agent>>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub did: String,
    pub name: String,
    pub shared: bool,
    pub prefix: Option<String>,
    pub primary_agent: bool,
    pub created_at: DateTime<Utc>,
}

/// Process-wide catalog of agents, keyed by DID.
///
/// Mirrors the control-plane's `DashMap<AgentId, Agent>` pool: one
/// concurrent map, reads vastly outnumbering writes, writes serialized per
/// shard via `entry()` so the conflict checks in [`AgentRegistry::create_agent`]
/// are atomic with the insert they gate.
#[derive(Default)]
pub struct AgentRegistry {
    entries: DashMap<Did, RegistryEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_agent(
        &self,
        did: Did,
        name: AgentName,
        shared: bool,
        prefix: Option<String>,
        primary_agent: bool,
    ) -> Result<Arc<RwLock<Agent>>, RegistrationConflict> {
        let mut entry = self.entries.entry(did.clone()).or_default();
        let is_first = entry.agents.is_empty();

        // Rule 1
        if !shared && !is_first {
            let existing = entry.agents.keys().next().unwrap().to_string();
            return Err(RegistrationConflict::ExclusiveConflict {
                did: did.to_string(),
                existing,
            });
        }

        let prefix = if shared {
            // Rule 2
            match prefix.filter(|p| !p.is_empty()) {
                Some(p) => Some(p),
                None => return Err(RegistrationConflict::MissingPrefix),
            }
        } else {
            None
        };

        if shared {
            // Rule 3
            if !is_first && entry.mode == Some(OwnershipMode::Exclusive) {
                return Err(RegistrationConflict::ModeConflict { did: did.to_string() });
            }
            // Rule 4
            let prefix_str = prefix.as_deref().unwrap();
            if entry
                .agents
                .values()
                .any(|a| a.prefix.as_deref() == Some(prefix_str))
            {
                return Err(RegistrationConflict::PrefixConflict {
                    did: did.to_string(),
                    prefix: prefix_str.to_owned(),
                });
            }
            // Rule 5
            if primary_agent {
                if let Some((existing_name, _)) = entry.agents.iter().find(|(_, a)| a.primary_agent) {
                    return Err(RegistrationConflict::PrimaryConflict {
                        did: did.to_string(),
                        existing: existing_name.to_string(),
                    });
                }
            }
        }

        if is_first {
            entry.mode = Some(if shared {
                OwnershipMode::Shared
            } else {
                OwnershipMode::Exclusive
            });
        }

        let agent = Arc::new(RwLock::new(Agent::new(
            did.clone(),
            name,
            shared,
            prefix.clone(),
            primary_agent,
        )));
        entry.agents.insert(
            name,
            RegisteredAgent {
                agent: Arc::clone(&agent),
                shared,
                prefix,
                primary_agent,
                created_at: Utc::now(),
            },
        );
        Ok(agent)
    }

    pub fn get_agent(&self, did: &Did, name: Option<AgentName>) -> AgentLookup {
        let Some(entry) = self.entries.get(did) else {
            return AgentLookup::None;
        };

        if let Some(name) = name {
            return match entry.agents.get(&name) {
                Some(registered) => AgentLookup::Single(Arc::clone(&registered.agent)),
                None => AgentLookup::None,
            };
        }

        match entry.agents.len() {
            0 => AgentLookup::None,
            1 => AgentLookup::Single(Arc::clone(&entry.agents.values().next().unwrap().agent)),
            _ => AgentLookup::Many(
                entry
                    .agents
                    .iter()
                    .map(|(name, registered)| (*name, Arc::clone(&registered.agent)))
                    .collect(),
            ),
        }
    }

    /// Agents registered under `did`, in insertion order. Used by the
    /// router's shared-DID prefix matching.
    pub fn agents_for(&self, did: &Did) -> Vec<(AgentName, RegisteredAgent)> {
        self.entries
            .get(did)
            .map(|entry| {
                entry
                    .agents
                    .iter()
                    .map(|(name, r)| (*name, r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mode_for(&self, did: &Did) -> Option<OwnershipMode> {
        self.entries.get(did).and_then(|e| e.mode)
    }

    pub fn remove_agent(&self, did: &Did, name: AgentName) -> bool {
        let Some(mut entry) = self.entries.get_mut(did) else {
            return false;
        };
        let removed = entry.agents.shift_remove(&name).is_some();
        let now_empty = entry.agents.is_empty();
        drop(entry);
        if now_empty {
            self.entries.remove(did);
        }
        removed
    }

    pub fn list_agents(&self) -> Vec<AgentSummary> {
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let did = entry.key().to_string();
            for (name, registered) in entry.value().agents.iter() {
                out.push(AgentSummary {
                    did: did.clone(),
                    name: name.to_string(),
                    shared: registered.shared,
                    prefix: registered.prefix.clone(),
                    primary_agent: registered.primary_agent,
                    created_at: registered.created_at,
                });
            }
        }
        out
    }

    /// Test-only: wipe every registration. Never call this from request
    /// handling code.
    pub fn clear_all(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use anp_common::state::InternedId;

    use super::*;

    fn did() -> Did {
        Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap()
    }

    #[test]
    fn exclusive_then_exclusive_conflicts() {
        let reg = AgentRegistry::new();
        reg.create_agent(did(), InternedId::from_str("calc").unwrap(), false, None, false)
            .unwrap();
        let err = reg
            .create_agent(did(), InternedId::from_str("calc2").unwrap(), false, None, false)
            .unwrap_err();
        assert!(matches!(err, RegistrationConflict::ExclusiveConflict { .. }));
    }

    #[test]
    fn shared_requires_prefix() {
        let reg = AgentRegistry::new();
        let err = reg
            .create_agent(did(), InternedId::from_str("weather").unwrap(), true, None, false)
            .unwrap_err();
        assert!(matches!(err, RegistrationConflict::MissingPrefix));
    }

    #[test]
    fn shared_conflicts_with_existing_exclusive() {
        let reg = AgentRegistry::new();
        reg.create_agent(did(), InternedId::from_str("calc").unwrap(), false, None, false)
            .unwrap();
        let err = reg
            .create_agent(
                did(),
                InternedId::from_str("weather").unwrap(),
                true,
                Some("/weather".into()),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationConflict::ModeConflict { .. }));
    }

    #[test]
    fn duplicate_prefix_conflicts() {
        let reg = AgentRegistry::new();
        reg.create_agent(
            did(),
            InternedId::from_str("weather").unwrap(),
            true,
            Some("/weather".into()),
            true,
        )
        .unwrap();
        let err = reg
            .create_agent(
                did(),
                InternedId::from_str("weather2").unwrap(),
                true,
                Some("/weather".into()),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationConflict::PrefixConflict { .. }));
    }

    #[test]
    fn second_primary_conflicts() {
        let reg = AgentRegistry::new();
        reg.create_agent(
            did(),
            InternedId::from_str("weather").unwrap(),
            true,
            Some("/weather".into()),
            true,
        )
        .unwrap();
        let err = reg
            .create_agent(
                did(),
                InternedId::from_str("assistant").unwrap(),
                true,
                Some("/assistant".into()),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationConflict::PrimaryConflict { .. }));
    }

    #[test]
    fn remove_last_agent_drops_the_did() {
        let reg = AgentRegistry::new();
        let name = InternedId::from_str("calc").unwrap();
        reg.create_agent(did(), name, false, None, false).unwrap();
        assert!(reg.remove_agent(&did(), name));
        assert!(matches!(reg.get_agent(&did(), None), AgentLookup::None));
        assert!(reg.mode_for(&did()).is_none());
    }
}
