//! Backend connectivity and the status-bar summary.
//!
//! The monitor owns the three-state connectivity flag (checking until the
//! first probe resolves, then connected or disconnected) and remembers the
//! last diagnostic report. Reachability is decided by probe success alone;
//! the report payload is informational. Transitions are logged, steady
//! states are not.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::config;
use crate::gateway::{BackendGateway, HealthReport};
use crate::models::SearchResponse;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Internal lock error")]
    LockPoisoned,
}

/// Reachability of the indexing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// No probe has resolved yet.
    #[default]
    Checking,
    Connected,
    Disconnected,
}

struct MonitorInner {
    connectivity: ConnectivityState,
    last_report: Option<HealthReport>,
}

/// Tracks backend reachability across health probes.
pub struct BackendMonitor {
    gateway: Arc<dyn BackendGateway>,
    state: Mutex<MonitorInner>,
}

impl BackendMonitor {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(MonitorInner {
                connectivity: ConnectivityState::Checking,
                last_report: None,
            }),
        }
    }

    /// Probe the backend once and update the connectivity flag.
    pub async fn check(&self) -> Result<ConnectivityState, StatusError> {
        let result = self.gateway.health().await;
        let mut state = self.state.lock().map_err(|_| StatusError::LockPoisoned)?;

        let next = if result.is_ok() {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        };
        if state.connectivity != next {
            match &result {
                Ok(report) => info!(indexed_files = ?report.indexed_files, "Backend reachable"),
                Err(e) => warn!(error = %e, "Backend unreachable"),
            }
        }
        state.connectivity = next;
        state.last_report = result.ok();
        Ok(next)
    }

    pub fn connectivity(&self) -> Result<ConnectivityState, StatusError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| StatusError::LockPoisoned)?
            .connectivity)
    }

    /// The report from the most recent successful probe.
    pub fn last_report(&self) -> Result<Option<HealthReport>, StatusError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| StatusError::LockPoisoned)?
            .last_report
            .clone())
    }
}

// ═══════════════════════════════════════════════════════════
// Status bar
// ═══════════════════════════════════════════════════════════

/// Everything the status bar shows, pre-digested.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    /// Result count on screen.
    pub shown: usize,
    /// Backend-reported match count, when a response is present.
    pub total: Option<u64>,
    /// More matches exist than the page shows.
    pub truncated: bool,
    /// The accepted query, if any non-empty one is on screen.
    pub query: Option<String>,
    pub connectivity: ConnectivityState,
    /// Index size from the last successful health probe.
    pub indexed_files: Option<u64>,
    /// Wall clock, `HH:MM:SS`.
    pub clock: String,
    pub version: &'static str,
}

/// Build the status-bar summary against an explicit clock reading.
pub fn summarize_at(
    latest: Option<&SearchResponse>,
    connectivity: ConnectivityState,
    indexed_files: Option<u64>,
    now: DateTime<Local>,
) -> StatusSummary {
    StatusSummary {
        shown: latest.map(|r| r.results.len()).unwrap_or(0),
        total: latest.map(|r| r.total),
        truncated: latest.is_some_and(|r| r.is_truncated()),
        query: latest.and_then(|r| (!r.query.is_empty()).then(|| r.query.clone())),
        connectivity,
        indexed_files,
        clock: now.format("%H:%M:%S").to_string(),
        version: config::APP_VERSION,
    }
}

/// `summarize_at` with the current wall clock.
pub fn summarize(
    latest: Option<&SearchResponse>,
    connectivity: ConnectivityState,
    indexed_files: Option<u64>,
) -> StatusSummary {
    summarize_at(latest, connectivity, indexed_files, Local::now())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
