use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::registry::AgentSummary;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub served_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HostedDidRequestBody {
    #[serde(rename = "didDocument")]
    pub did_document: Value,
    #[serde(rename = "requesterDID")]
    pub requester_did: String,
    #[serde(default, rename = "callbackInfo")]
    pub callback_info: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct HostedDidRequestResponse {
    pub success: bool,
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "estimatedProcessingTime")]
    pub estimated_processing_time: u64,
}

/// `estimatedProcessingTime` is advisory only, matching the default poll
/// cadence times a conservative queue-depth bound; it is never enforced.
pub const ESTIMATED_PROCESSING_TIME_SECONDS: u64 = 300;

#[derive(Debug, Serialize)]
pub struct PublisherAgentsResponse {
    pub agents: Vec<AgentSummary>,
}
