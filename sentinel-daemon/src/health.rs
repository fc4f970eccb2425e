//! Aggregated health reporting.
//!
//! Each component reports its own [`HealthStatus`]; the daemon status is
//! the worst status among enabled components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use sentinel_core::pipeline::HealthStatus;

/// Component name of the ingest pipeline (tailer + writer).
pub const INGEST_PIPELINE: &str = "ingest-pipeline";
/// Component name of the live feed relay.
pub const LIVE_RELAY: &str = "live-relay";
/// Component name of the session replay tool.
pub const SESSION_REPLAY: &str = "session-replay";

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all components).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-component health reports.
    pub components: Vec<ComponentHealth>,
}

/// Health status for a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g., "ingest-pipeline").
    pub name: String,
    /// Whether the component is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the component.
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: &str, enabled: bool, status: HealthStatus) -> Self {
        Self {
            name: name.to_owned(),
            enabled,
            status,
        }
    }
}

impl DaemonHealth {
    /// Build a report from component statuses.
    pub fn from_components(components: Vec<ComponentHealth>, uptime_secs: u64) -> Self {
        Self {
            status: aggregate_status(&components),
            uptime_secs,
            components,
        }
    }
}

/// Aggregate component health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Disabled components are ignored.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", component.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                if !worst.is_unhealthy() {
                    reasons.clear();
                }
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
