use lazy_static::lazy_static;
use regex::Regex;

mod did;
mod id;

pub use did::*;
pub use id::*;

lazy_static! {
    static ref INTERNED_ID_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_.]{0,63}$").unwrap();
}

/// An agent's name within a DID (the `name` in `<did>#<name>`).
pub type AgentName = InternedId;
/// A hosted-DID request id, encoded as its hyphenated UUID string form.
pub type RequestId = uuid::Uuid;
