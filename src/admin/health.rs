//! # Health Checks
//!
//! Readiness, liveness and dependency checks in the actuator shape: an overall
//! `UP`/`DOWN` status plus named checks, each with its own status and data.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

impl HealthStatus {
    pub fn from_bool(healthy: bool) -> Self {
        if healthy {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub data: Map<String, Value>,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Overall status is `UP` only when every check is
    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        let status = HealthStatus::from_bool(checks.iter().all(|c| c.status.is_up()));
        Self {
            status,
            checks,
            timestamp: Utc::now(),
        }
    }

    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// `"{d}d {h}h {m}m {s}s"`
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

pub(crate) fn connection_state(connected: bool) -> Value {
    json!(if connected { "connected" } else { "disconnected" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 0h 0m 0s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "0d 0h 0m 59s");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "2d 3h 4m 5s"
        );
    }

    #[test]
    fn test_report_down_when_any_check_down() {
        let report = HealthReport::from_checks(vec![
            HealthCheck::new("Liveness check", HealthStatus::Up),
            HealthCheck::new("Transport check", HealthStatus::Down)
                .with("status", connection_state(false)),
        ]);
        assert_eq!(report.status, HealthStatus::Down);
        assert_eq!(
            report.check("Transport check").unwrap().data["status"],
            json!("disconnected")
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], json!("DOWN"));
        assert_eq!(json["checks"][0]["status"], json!("UP"));
    }
}
