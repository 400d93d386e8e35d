use std::collections::HashMap;

use anp_common::state::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub did: Did,
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
    pub first_contact: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub interaction_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedToken {
    pub token: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

/// One user's address book: known peers plus the tokens exchanged with them
/// in either direction.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ContactBookData {
    pub contacts: HashMap<String, Contact>,
    pub tokens_to_remote: HashMap<String, IssuedToken>,
    pub tokens_from_remote: HashMap<String, ReceivedToken>,
}

/// Serializes access to one user's [`ContactBookData`] — contact books are
/// per-user, never shared across users, so a plain async mutex (rather than
/// a sharded map) is the right granularity.
#[derive(Default)]
pub struct ContactBook {
    data: Mutex<ContactBookData>,
}

impl ContactBook {
    pub fn new(data: ContactBookData) -> Self {
        Self { data: Mutex::new(data) }
    }

    /// Idempotent by `remoteDID`: a repeat call only bumps
    /// `last_contact`/`interaction_count`, it never resets `first_contact`.
    pub async fn add_contact(&self, did: Did, host: String, port: u16, name: Option<String>) {
        let mut data = self.data.lock().await;
        let key = did.to_string();
        let now = Utc::now();
        data.contacts
            .entry(key)
            .and_modify(|c| {
                c.last_contact = now;
                c.interaction_count += 1;
                if name.is_some() {
                    c.name = name.clone();
                }
            })
            .or_insert_with(|| Contact {
                did,
                host,
                port,
                name,
                first_contact: now,
                last_contact: now,
                interaction_count: 1,
                tags: Vec::new(),
            });
    }

    pub async fn get_contact(&self, did: &Did) -> Option<Contact> {
        self.data.lock().await.contacts.get(&did.to_string()).cloned()
    }

    pub async fn issue_token(&self, did: &Did, token: String, expires_at: Option<DateTime<Utc>>) {
        let mut data = self.data.lock().await;
        data.tokens_to_remote.insert(
            did.to_string(),
            IssuedToken {
                token,
                expires_at,
                revoked: false,
            },
        );
    }

    pub async fn receive_token(&self, did: &Did, token: String) {
        let mut data = self.data.lock().await;
        data.tokens_from_remote.insert(
            did.to_string(),
            ReceivedToken {
                token,
                received_at: Utc::now(),
                revoked: false,
            },
        );
    }

    /// Revocation flips a flag; it never deletes the token record.
    pub async fn revoke_issued_token(&self, did: &Did) -> bool {
        let mut data = self.data.lock().await;
        match data.tokens_to_remote.get_mut(&did.to_string()) {
            Some(t) => {
                t.revoked = true;
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self) -> ContactBookData {
        let data = self.data.lock().await;
        ContactBookData {
            contacts: data.contacts.clone(),
            tokens_to_remote: data.tokens_to_remote.clone(),
            tokens_from_remote: data.tokens_from_remote.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn did() -> Did {
        Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap()
    }

    #[tokio::test]
    async fn add_contact_is_idempotent_on_repeat() {
        let book = ContactBook::default();
        book.add_contact(did(), "localhost".into(), 9527, Some("Alice".into())).await;
        book.add_contact(did(), "localhost".into(), 9527, None).await;

        let contact = book.get_contact(&did()).await.unwrap();
        assert_eq!(contact.interaction_count, 2);
        assert_eq!(contact.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn revoke_flags_without_deleting() {
        let book = ContactBook::default();
        book.issue_token(&did(), "tok-1".into(), None).await;
        assert!(book.revoke_issued_token(&did()).await);
        let snap = book.snapshot().await;
        let tok = snap.tokens_to_remote.get(&did().to_string()).unwrap();
        assert!(tok.revoked);
        assert_eq!(tok.token, "tok-1");
    }
}
