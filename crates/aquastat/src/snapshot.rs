//! Counter identities and the four-counter snapshot.

use crate::registry::EndpointId;
use http::Method;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;

pub const FIELD_REQUEST: &str = "Count_Req";
pub const FIELD_UNIQUE_AGENT: &str = "Count_UA";
pub const FIELD_SUCCESS: &str = "Count_Success";
pub const FIELD_ERROR: &str = "Count_Error";

/// Canonical key of one `(endpoint, method)` counter in both stores.
pub fn metric_key(endpoint: EndpointId, method: &Method) -> String {
    format!("P:{}:{}", endpoint, method)
}

/// Key marking that an agent was already counted for `(endpoint, method)`.
///
/// The raw user agent is hashed with SHA3-256 so it never appears in a key.
pub fn agent_dedup_key(endpoint: EndpointId, method: &Method, user_agent: &str) -> String {
    let digest = Sha3_256::digest(user_agent.as_bytes());
    format!("P:{}:{}:{:x}", endpoint, method, digest)
}

/// Current counters for one metric key.
///
/// `request == success + error` holds for every snapshot the pipeline
/// produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "count")]
    pub request: u64,
    #[serde(rename = "unique_user_agent")]
    pub unique_agents: u64,
    #[serde(rename = "num_success")]
    pub success: u64,
    #[serde(rename = "num_error")]
    pub error: u64,
}

impl MetricsSnapshot {
    pub fn new(request: u64, unique_agents: u64, success: u64, error: u64) -> Self {
        Self {
            request,
            unique_agents,
            success,
            error,
        }
    }

    /// Parse counter hash fields. Absent or unparsable values count as 0.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let read = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        Self {
            request: read(FIELD_REQUEST),
            unique_agents: read(FIELD_UNIQUE_AGENT),
            success: read(FIELD_SUCCESS),
            error: read(FIELD_ERROR),
        }
    }

    /// Field/value pairs in counter hash layout.
    pub fn fields(&self) -> [(&'static str, u64); 4] {
        [
            (FIELD_UNIQUE_AGENT, self.unique_agents),
            (FIELD_REQUEST, self.request),
            (FIELD_ERROR, self.error),
            (FIELD_SUCCESS, self.success),
        ]
    }

    /// No requests and no agents recorded. Such entries are left out of reports.
    pub fn is_empty(&self) -> bool {
        self.request == 0 && self.unique_agents == 0
    }
}
