use std::{fmt, str::FromStr};

use serde::{de::Error as _, Deserialize, Serialize};
use thiserror::Error;

/// The two kinds of WBA identity a [`Did`] can name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DidKind {
    /// A regular, locally-registered user.
    User,
    /// A derivative identity minted by [`crate::state::Did::rewrite_as_hosted`].
    HostUser,
}

impl DidKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DidKind::User => "user",
            DidKind::HostUser => "hostuser",
        }
    }
}

impl FromStr for DidKind {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(DidKind::User),
            "hostuser" => Ok(DidKind::HostUser),
            other => Err(DidParseError::UnknownKind(other.to_owned())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DidParseError {
    #[error("`{0}` is not shaped like a did:wba identifier")]
    Malformed(String),
    #[error("unknown did:wba kind `{0}`, expected `user` or `hostuser`")]
    UnknownKind(String),
    #[error("`{0}` is not a valid port")]
    BadPort(String),
}

/// A parsed, canonicalized `did:wba:<host>%3A<port>:wba:<kind>:<id>`.
///
/// Inbound strings may arrive with the host/port separator either already
/// percent-encoded (`%3A`) or decoded to a literal colon, depending on how
/// many times the transport layer url-decoded the path segment. Both forms
/// parse to the same value; [`Did::to_string`] always re-encodes to `%3A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    host: String,
    port: u16,
    kind: DidKind,
    unique_id: String,
}

impl Did {
    pub fn new(host: impl Into<String>, port: u16, kind: DidKind, unique_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            kind,
            unique_id: unique_id.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> DidKind {
        self.kind
    }

    /// The trailing identifier segment. Equivalent to the spec's "requester
    /// short id" when this DID names a requester.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn host_port(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Parse a `did:wba:...` string, accepting both the `%3A`-encoded and
    /// decoded-colon forms of the host/port separator.
    pub fn parse(s: &str) -> Result<Self, DidParseError> {
        let parts: Vec<&str> = s.split(':').collect();

        let (host_port_raw, tail_start) = match parts.len() {
            // did : wba : host%3Aport : wba : kind : id
            6 => (parts[2].to_string(), 3),
            // did : wba : host : port : wba : kind : id
            7 => (format!("{}:{}", parts[2], parts[3]), 4),
            _ => return Err(DidParseError::Malformed(s.to_owned())),
        };

        if parts[0] != "did" || parts[1] != "wba" || parts.get(tail_start) != Some(&"wba") {
            return Err(DidParseError::Malformed(s.to_owned()));
        }

        let kind = DidKind::from_str(parts[tail_start + 1])?;
        let unique_id = parts
            .get(tail_start + 2)
            .ok_or_else(|| DidParseError::Malformed(s.to_owned()))?
            .to_string();

        let decoded = host_port_raw.replace("%3A", ":").replace("%3a", ":");
        let (host, port) = decoded
            .rsplit_once(':')
            .ok_or_else(|| DidParseError::Malformed(s.to_owned()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| DidParseError::BadPort(port.to_owned()))?;

        Ok(Did {
            host: host.to_owned(),
            port,
            kind,
            unique_id,
        })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "did:wba:{}%3A{}:wba:{}:{}",
            self.host,
            self.port,
            self.kind.as_str(),
            self.unique_id
        )
    }
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Did::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_encoded_host_port() {
        let did = Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap();
        assert_eq!(did.host(), "localhost");
        assert_eq!(did.port(), 9527);
        assert_eq!(did.kind(), DidKind::User);
        assert_eq!(did.unique_id(), "AAAA");
    }

    #[test]
    fn parses_decoded_colon_host_port() {
        let did = Did::parse("did:wba:localhost:9527:wba:user:AAAA").unwrap();
        assert_eq!(did.host(), "localhost");
        assert_eq!(did.port(), 9527);
    }

    #[test]
    fn display_always_reencodes() {
        let did = Did::parse("did:wba:localhost:9527:wba:user:AAAA").unwrap();
        assert_eq!(did.to_string(), "did:wba:localhost%3A9527:wba:user:AAAA");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Did::parse("not-a-did").is_err());
        assert!(Did::parse("did:wba:localhost%3A9527:wba:unknown:AAAA").is_err());
    }
}
