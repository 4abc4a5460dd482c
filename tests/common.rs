//! Test utilities & fixtures.
//! Signed frames and a throwaway ingest context backed by a temp-dir reading log.
#![allow(dead_code)] // Each test binary uses a different subset.

use std::time::Duration;

use greenhouse_ingest::auth::FrameAuthenticator;
use greenhouse_ingest::protocol::{Frame, SensorPacket};
use greenhouse_ingest::server::IngestContext;
use greenhouse_ingest::storage::{ReadingLog, TimestampZone};
use secrecy::SecretString;

pub const TEST_SECRET: &str = "test-secret";

/// 2024-01-01 12:00:00 UTC
pub const TEST_TIMESTAMP: i64 = 1_704_110_400;

pub fn authenticator() -> FrameAuthenticator {
    FrameAuthenticator::new(SecretString::from(TEST_SECRET.to_string()))
}

/// A plausible reading with the given sequence number.
pub fn reading(sequence: u32) -> SensorPacket {
    SensorPacket::new(sequence, 25, 60, 1.5, 450.0, TEST_TIMESTAMP)
}

pub fn signed_frame(packet: &SensorPacket) -> Frame {
    authenticator().seal(packet)
}

pub fn signed_bytes(packet: &SensorPacket) -> Vec<u8> {
    signed_frame(packet).to_bytes().to_vec()
}

/// Context writing UTC timestamps into `<dir>/data_log.csv`.
pub fn context_in(dir: &tempfile::TempDir, idle_timeout: Duration) -> IngestContext {
    let log = ReadingLog::open(dir.path().join("data_log.csv"), TimestampZone::Utc)
        .expect("open reading log");
    IngestContext::new(authenticator(), log, 64, idle_timeout)
}

/// Data rows of the log, header excluded.
pub fn data_rows(dir: &tempfile::TempDir) -> Vec<String> {
    let content = std::fs::read_to_string(dir.path().join("data_log.csv")).expect("read log");
    content.lines().skip(1).map(str::to_string).collect()
}
