//! Payload types for the device/service exchange. Field names are camelCase
//! on the wire; every payload travels inside an encrypted envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `action` value that allows a call; anything else blocks it.
pub const ACTION_ALLOW: &str = "allow";

/// Liveness report, sent on the heartbeat cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub modem_status: String,
}

/// Screening request for one incoming call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRequest {
    pub phone_number: String,
    pub timestamp: DateTime<Utc>,
}

/// Screening verdict from the service. Fields beyond `action` are preserved
/// for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenResponse {
    pub action: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ScreenResponse {
    pub fn allows(&self) -> bool {
        self.action == ACTION_ALLOW
    }
}

/// Final decision for one call, after screening (or after fail-open).
#[derive(Debug, Clone)]
pub struct ScreeningDecision {
    pub phone_number: String,
    pub allow: bool,
    pub metadata: serde_json::Value,
}
