//! Shared state handed to every connection handler.
//!
//! The sequence map and the reading log are only reachable through the
//! synchronized operations below; handlers never see the raw structures.
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::auth::FrameAuthenticator;
use crate::config::{Config, SecretSource};
use crate::errors::{AuthError, StorageError};
use crate::metrics::Metrics;
use crate::protocol::{AuthenticatedPayload, Frame, SensorPacket};
use crate::sequence::{SequenceGap, SequenceTracker};
use crate::storage::{ReadingLog, ReadingRecord};
use crate::validation::SensorLimits;

#[derive(Debug)]
pub struct IngestContext {
    authenticator: FrameAuthenticator,
    limits: SensorLimits,
    sequences: Mutex<SequenceTracker>,
    log: ReadingLog,
    metrics: Metrics,
    idle_timeout: Duration,
}

impl IngestContext {
    pub fn new(
        authenticator: FrameAuthenticator,
        log: ReadingLog,
        max_tracked_clients: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            authenticator,
            limits: SensorLimits::default(),
            sequences: Mutex::new(SequenceTracker::with_capacity(max_tracked_clients)),
            log,
            metrics: Metrics::new(),
            idle_timeout,
        }
    }

    /// Resolve the secret, open the reading log and size the tracker from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (secret, source) = config.auth.resolve_secret()?;
        if source == SecretSource::FactoryDefault {
            warn!(
                target: "security",
                "No shared secret configured (set {} or auth.secret); using the firmware factory default key",
                config.auth.secret_env
            );
        }
        let log = ReadingLog::open(&config.storage.csv_path, config.storage.timestamp_zone)
            .with_context(|| format!("Failed to open reading log {}", config.storage.csv_path))?;
        info!(
            "Logging readings to {} ({} rows present)",
            log.path().display(),
            log.record_count()?
        );
        Ok(Self::new(
            FrameAuthenticator::new(secret),
            log,
            config.server.max_tracked_clients,
            config.server.idle_timeout(),
        ))
    }

    pub fn authenticate(&self, frame: &Frame) -> Result<AuthenticatedPayload, AuthError> {
        self.authenticator.authenticate(frame)
    }

    pub fn limits(&self) -> &SensorLimits {
        &self.limits
    }

    /// Gap check and update happen under one lock.
    pub fn observe_sequence(&self, client: IpAddr, sequence: u32) -> Option<SequenceGap> {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(client, sequence)
    }

    /// Last accepted sequence from `client`, if it is still tracked.
    pub fn last_sequence(&self, client: &IpAddr) -> Option<u32> {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_seen(client)
    }

    pub fn tracked_clients(&self) -> usize {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn persist(&self, packet: &SensorPacket) -> Result<ReadingRecord, StorageError> {
        self.log.append(packet)
    }

    pub fn reading_log(&self) -> &ReadingLog {
        &self.log
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
