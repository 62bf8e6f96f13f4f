//! REST contract types for the panel's server endpoints.
//!
//! Only the shapes the console client consumes are modelled. Fields the
//! panel may omit default to zero / `None`, because the two panel backends
//! in the wild disagree on which ones they send.

use serde::{Deserialize, Serialize};

/// Memory limit assumed when the server record has none, MB.
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 1024;
/// Disk limit assumed when the server record has none, MB.
pub const DEFAULT_DISK_LIMIT_MB: u64 = 5000;

/// Point-in-time resource snapshot from `GET /api/servers/{id}/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStats {
    /// CPU usage in percent.
    pub cpu: f64,
    /// Memory in use, MB. Some backends call this field `memory`.
    #[serde(alias = "memory")]
    pub memory_used: f64,
    /// Disk in use, MB.
    pub disk_used: f64,
    /// Seconds since the server process started.
    pub uptime: f64,
    /// Process status, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Server record from `GET /api/servers/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
    pub game: String,
    pub status: String,
    pub port: u16,
    /// Memory limit, MB.
    pub memory: u64,
    /// Disk limit, MB, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl ServerInfo {
    /// Memory limit in MB, falling back to [`DEFAULT_MEMORY_LIMIT_MB`].
    pub fn memory_limit(&self) -> u64 {
        if self.memory > 0 {
            self.memory
        } else {
            DEFAULT_MEMORY_LIMIT_MB
        }
    }

    /// Disk limit in MB, falling back to [`DEFAULT_DISK_LIMIT_MB`].
    pub fn disk_limit(&self) -> u64 {
        self.disk.filter(|disk| *disk > 0).unwrap_or(DEFAULT_DISK_LIMIT_MB)
    }
}

/// Body of a successful lifecycle action, e.g. `{"message": "Server started"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionResponse {
    pub message: String,
}

/// Error body returned by the panel on non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Formats an uptime in seconds as `{h}h {m}m`, or `{m}m` under an hour.
pub fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Percentage of `used` over `total`, clamped to 0..=100. Zero totals yield 0.
pub fn usage_percent(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    (used / total * 100.0).clamp(0.0, 100.0)
}

/// Formats a resource gauge as `{used} MB / {limit} MB ({pct}%)`.
pub fn format_usage(used: f64, limit: u64) -> String {
    format!(
        "{:.1} MB / {} MB ({:.0}%)",
        used,
        limit,
        usage_percent(used, limit as f64)
    )
}
