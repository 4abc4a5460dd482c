//! Ingestion counters.
//!
//! One [`Metrics`] lives in the shared ingest context; connection handlers bump
//! the counters and the supervisor logs a [`Snapshot`] on shutdown.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    frames_accepted: AtomicU64,
    auth_failures: AtomicU64,
    protocol_errors: AtomicU64,
    validation_rejects: AtomicU64,
    sequence_gaps: AtomicU64,
    persistence_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_connections_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_connections_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_frames_accepted(&self) {
        self.frames_accepted.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_protocol_errors(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_validation_rejects(&self) {
        self.validation_rejects.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_sequence_gaps(&self) {
        self.sequence_gaps.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_persistence_failures(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            validation_rejects: self.validation_rejects.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Snapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub frames_accepted: u64,
    pub auth_failures: u64,
    pub protocol_errors: u64,
    pub validation_rejects: u64,
    pub sequence_gaps: u64,
    pub persistence_failures: u64,
}

impl Snapshot {
    /// Frames dropped by authentication, header or range checks.
    pub fn frames_rejected(&self) -> u64 {
        self.auth_failures
            .saturating_add(self.protocol_errors)
            .saturating_add(self.validation_rejects)
    }

    /// Connections currently open.
    pub fn connections_active(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connections {}/{} (opened/closed), accepted {}, rejected {} (auth {}, protocol {}, validation {}), gaps {}, persistence failures {}",
            self.connections_opened,
            self.connections_closed,
            self.frames_accepted,
            self.frames_rejected(),
            self.auth_failures,
            self.protocol_errors,
            self.validation_rejects,
            self.sequence_gaps,
            self.persistence_failures
        )
    }
}
