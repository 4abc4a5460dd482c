//! # greenhouse-ingest - Sensor Telemetry Ingestion Server
//!
//! greenhouse-ingest receives environmental readings from ESP32 greenhouse
//! sensor nodes over TCP, authenticates every frame with a pre-shared
//! HMAC-SHA256 key and appends accepted readings to a CSV log for offline
//! analysis.
//!
//! ## Features
//!
//! - **Fixed-size framing**: 64-byte frames reassembled from arbitrary TCP fragments.
//! - **Authentication first**: constant-time HMAC-SHA256 check before any payload field is read.
//! - **Plausibility checks**: temperature, humidity, gas and timestamp ranges.
//! - **Loss detection**: per-client sequence gap tracking, bounded with LRU eviction.
//! - **Safe persistence**: whole-row CSV appends under an in-process mutex and an `fs2` file lock.
//! - **Async Design**: one Tokio task per connection, supervised in a `JoinSet`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use greenhouse_ingest::config::Config;
//! use greenhouse_ingest::server::IngestServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = IngestServer::from_config(&config, None).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`protocol`] - wire layout, frame reader and packet decoding
//! - [`auth`] - HMAC-SHA256 signing and verification
//! - [`validation`] - plausibility ranges for decoded readings
//! - [`sequence`] - per-client sequence gap tracking
//! - [`storage`] - CSV reading log
//! - [`server`] - accept loop, connection handlers and shared context
//! - [`config`] - configuration management and validation
//! - [`metrics`] - ingestion counters
//! - [`errors`] - error types for each pipeline stage
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Ingest Server  │ ← accept loop, one task per sensor connection
//! └─────────────────┘
//!          │ 64-byte frames
//! ┌─────────────────┐
//! │  Frame Pipeline │ ← authenticate → decode → validate → sequence check
//! └─────────────────┘
//!          │ accepted readings
//! ┌─────────────────┐
//! │   Reading Log   │ ← append-only CSV
//! └─────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod sequence;
pub mod server;
pub mod storage;
pub mod validation;
