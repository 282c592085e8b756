//! Ledger node health.

use serde::{Deserialize, Serialize};

/// Latency above which a reachable node is reported degraded.
pub const DEGRADED_THRESHOLD_MS: u64 = 1_000;

/// Node status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Reachable and responsive.
    Healthy,
    /// Reachable but slow.
    Degraded,
    /// Unreachable or failing.
    Unhealthy,
}

/// Result of probing the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub status: HealthStatus,

    /// Round-trip time of the probe.
    pub latency_ms: u64,

    /// Server version reported by the node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Failure description when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeHealth {
    /// A successful probe, graded by latency.
    pub fn reachable(latency_ms: u64, version: Option<String>) -> Self {
        let status = if latency_ms > DEGRADED_THRESHOLD_MS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            latency_ms,
            version,
            error: None,
        }
    }

    /// A failed probe.
    pub fn unreachable(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms,
            version: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
