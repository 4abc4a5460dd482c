use std::time::Duration;

use thiserror::Error;

use crate::validation::ValidationError;

/// Connection-fatal failures raised while reading frames off a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream before a whole frame arrived.
    #[error("connection closed after {received} of {expected} bytes")]
    Closed { received: usize, expected: usize },

    /// No bytes arrived within the idle window.
    #[error("idle timeout after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Reset, broken pipe and other socket errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag verification failure. Carries nothing from the payload on purpose:
/// an unauthenticated payload must never reach a log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("HMAC verification failed")]
    TagMismatch,
}

/// Header checks performed on an authenticated payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid magic 0x{0:04X}")]
    BadMagic(u16),

    #[error("unknown protocol version {0}")]
    UnsupportedVersion(u8),
}

/// Failures of the append-only reading log.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wrapper around IO errors (open, lock, write, flush).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The reading's timestamp has no representation in the configured zone.
    #[error("timestamp {0} cannot be formatted")]
    InvalidTimestamp(i64),
}

/// Frame-fatal rejections: the frame is dropped and the connection keeps going.
#[derive(Debug, Error)]
pub enum FrameRejection {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Everything that can go wrong with a single frame once it has been read.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame rejected: {0}")]
    Rejected(#[from] FrameRejection),

    /// The reading was valid but could not be written. This is data loss for
    /// an already accepted reading and is always reported.
    #[error("failed to persist reading: {0}")]
    Persistence(#[from] StorageError),
}

impl From<AuthError> for FrameError {
    fn from(e: AuthError) -> Self {
        FrameError::Rejected(e.into())
    }
}

impl From<ProtocolError> for FrameError {
    fn from(e: ProtocolError) -> Self {
        FrameError::Rejected(e.into())
    }
}

impl From<ValidationError> for FrameError {
    fn from(e: ValidationError) -> Self {
        FrameError::Rejected(e.into())
    }
}
