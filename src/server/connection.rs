//! Per-connection frame loop.
//!
//! ```text
//!   Open ──accept──▶ AwaitingFrame ◀──┐ frame accepted / rejected
//!                         │  └────────┘
//!                         └── TransportError ──▶ Closed
//! ```
//!
//! Each iteration reads exactly one frame and runs it through
//! authenticate → decode → validate → sequence check → persist.
//! Rejections drop the frame and loop; only transport failures end the
//! connection.
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::io::AsyncRead;

use super::context::IngestContext;
use crate::errors::{FrameError, FrameRejection, TransportError};
use crate::protocol::framer::FrameReader;
use crate::protocol::{Frame, SensorPacket};
use crate::sequence::SequenceGap;
use crate::storage::ReadingRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    AwaitingFrame,
    Closed,
}

/// A frame that made it all the way into the reading log.
#[derive(Debug, Clone)]
pub struct AcceptedReading {
    pub packet: SensorPacket,
    pub gap: Option<SequenceGap>,
    pub record: ReadingRecord,
}

/// What a finished connection handler reports back to the supervisor.
#[derive(Debug)]
pub struct ConnectionSummary {
    pub peer: SocketAddr,
    pub accepted: u64,
    pub rejected: u64,
    pub persistence_failures: u64,
    pub close_reason: TransportError,
}

/// Run one frame through the pipeline and update the counters.
///
/// No payload field is touched before the tag checks out.
pub fn process_frame(
    ctx: &IngestContext,
    client: IpAddr,
    frame: &Frame,
) -> Result<AcceptedReading, FrameError> {
    let metrics = ctx.metrics();

    let payload = ctx
        .authenticate(frame)
        .inspect_err(|_| metrics.inc_auth_failures())?;
    let packet = SensorPacket::decode(&payload)
        .inspect_err(|_| metrics.inc_protocol_errors())?;
    ctx.limits()
        .check_packet(&packet)
        .inspect_err(|_| metrics.inc_validation_rejects())?;

    let gap = ctx.observe_sequence(client, packet.sequence);
    if let Some(gap) = gap {
        metrics.inc_sequence_gaps();
        warn!(
            "Sequence gap from {}: expected {}, got {} ({} packets lost)",
            client, gap.expected, gap.received, gap.lost
        );
    }

    let record = ctx
        .persist(&packet)
        .inspect_err(|_| metrics.inc_persistence_failures())?;
    metrics.inc_frames_accepted();

    Ok(AcceptedReading { packet, gap, record })
}

/// Serve one client until its stream fails, is closed, or goes idle.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    ctx: Arc<IngestContext>,
) -> ConnectionSummary
where
    S: AsyncRead + Unpin,
{
    let client = peer.ip();
    trace!("{} {:?}", peer, ConnectionState::Open);

    let mut reader = FrameReader::with_idle_timeout(stream, ctx.idle_timeout());
    let mut accepted = 0u64;
    let mut rejected = 0u64;
    let mut persistence_failures = 0u64;

    trace!("{} {:?}", peer, ConnectionState::AwaitingFrame);

    let close_reason = loop {
        let frame = match reader.next_frame().await {
            Ok(frame) => frame,
            Err(e) => break e,
        };

        match process_frame(&ctx, client, &frame) {
            Ok(reading) => {
                accepted += 1;
                let p = &reading.packet;
                info!(
                    "[seq={}] Temp: {}°C, Humidity: {}%, CH4: {:.2} ppm, CO2: {:.2} ppm | {}",
                    p.sequence, p.temperature, p.humidity, p.ch4, p.co2, reading.record.timestamp
                );
            }
            Err(FrameError::Rejected(rejection)) => {
                rejected += 1;
                match rejection {
                    FrameRejection::Auth(_) => warn!(
                        target: "security",
                        "HMAC verification failed from {}. Dropping packet.",
                        client
                    ),
                    FrameRejection::Protocol(e) => {
                        warn!("{} from {}. Dropping packet.", e, client)
                    }
                    FrameRejection::Validation(e) => {
                        warn!("Invalid sensor data from {}: {}. Dropping packet.", client, e)
                    }
                }
            }
            Err(FrameError::Persistence(e)) => {
                persistence_failures += 1;
                error!("Failed to persist reading from {}: {}", client, e);
            }
        }
    };

    trace!("{} {:?}", peer, ConnectionState::Closed);
    ctx.metrics().inc_connections_closed();
    info!("Client {} disconnected: {}", client, close_reason);
    debug!(
        "Connection {} summary: {} accepted, {} rejected, {} persistence failures",
        peer, accepted, rejected, persistence_failures
    );

    ConnectionSummary {
        peer,
        accepted,
        rejected,
        persistence_failures,
        close_reason,
    }
}
