//! Security incident sink.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use toolgate_core::db::unix_timestamp;

/// Default number of incidents kept by [`MemoryMonitor`].
pub const DEFAULT_INCIDENT_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    RateLimitExceeded,
    PathTraversal,
    InjectionAttempt,
    ValidationFailed,
}

impl IncidentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::PathTraversal => "path_traversal",
            Self::InjectionAttempt => "injection_attempt",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityIncident {
    pub kind: IncidentKind,
    pub channel: String,
    pub details: Value,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

impl SecurityIncident {
    pub fn new(kind: IncidentKind, channel: impl Into<String>, details: Value) -> Self {
        Self {
            kind,
            channel: channel.into(),
            details,
            timestamp: unix_timestamp(),
        }
    }
}

/// Append-only receiver of security incidents.
pub trait SecurityMonitor: Send + Sync {
    fn log_incident(&self, incident: SecurityIncident);
}

/// Writes incidents as `warn` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl SecurityMonitor for TracingMonitor {
    fn log_incident(&self, incident: SecurityIncident) {
        warn!(
            kind = %incident.kind,
            channel = %incident.channel,
            details = %incident.details,
            "Security incident"
        );
    }
}

/// Keeps the most recent incidents in memory and mirrors them to tracing.
pub struct MemoryMonitor {
    capacity: usize,
    incidents: Mutex<VecDeque<SecurityIncident>>,
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INCIDENT_CAPACITY)
    }
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            incidents: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    /// Recorded incidents, oldest first.
    pub fn incidents(&self) -> Vec<SecurityIncident> {
        self.lock().iter().cloned().collect()
    }

    pub fn count_by_kind(&self) -> BTreeMap<IncidentKind, usize> {
        let mut counts = BTreeMap::new();
        for incident in self.lock().iter() {
            *counts.entry(incident.kind).or_default() += 1;
        }
        counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SecurityIncident>> {
        self.incidents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecurityMonitor for MemoryMonitor {
    fn log_incident(&self, incident: SecurityIncident) {
        TracingMonitor.log_incident(incident.clone());
        let mut incidents = self.lock();
        incidents.push_back(incident);
        while incidents.len() > self.capacity {
            incidents.pop_front();
        }
    }
}
