//! Settings type definitions.

use serde::{Deserialize, Serialize};
use vigil_core::BackoffPolicy;

/// Top-level client settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct VigilSettings {
    /// Endpoints.
    pub server: ServerSettings,
    /// Reconnection policy.
    pub connection: ConnectionSettings,
    /// Plan state machine tuning.
    pub plans: PlanSettings,
    /// Telemetry window sizes.
    pub telemetry: TelemetrySettings,
}

/// Where to find the assistant process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerSettings {
    /// WebSocket URL of the assistant (`ws://` on plain origins, `wss://`
    /// on secure ones).
    pub url: String,
    /// Base URL of the credential supplier's HTTP endpoints.
    pub auth_base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".into(),
            auth_base_url: "http://127.0.0.1:8000".into(),
        }
    }
}

/// Reconnection policy settings. Flattens into [`BackoffPolicy`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConnectionSettings {
    /// Reconnect attempts before the terminal failure state.
    pub max_reconnect_attempts: u32,
    /// First retry delay.
    pub base_delay_ms: u64,
    /// Retry delay ceiling.
    pub max_delay_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            max_reconnect_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
        }
    }
}

impl ConnectionSettings {
    /// Convert into the core backoff policy.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_reconnect_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Plan state machine tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PlanSettings {
    /// Completed/failed plans retained, most-recent-first.
    pub history_limit: usize,
    /// How long a terminal plan stays in the "active" view before clearing.
    pub grace_delay_ms: u64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            history_limit: 10,
            grace_delay_ms: 5_000,
        }
    }
}

/// Telemetry rolling-window sizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TelemetrySettings {
    /// Recent search activity entries retained.
    pub search_log_limit: usize,
    /// Memory operation log entries retained.
    pub memory_log_limit: usize,
    /// System log entries retained.
    pub system_log_limit: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            search_log_limit: 10,
            memory_log_limit: 20,
            system_log_limit: 100,
        }
    }
}
