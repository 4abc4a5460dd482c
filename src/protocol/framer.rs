//! Fixed-length frame reader for sensor TCP streams.
//!
//! Sensor frames carry no length prefix: every frame is exactly
//! [`FRAME_LEN`](super::FRAME_LEN) bytes. TCP may deliver a frame in any number
//! of fragments, so the reader accumulates into a buffer until a whole frame is
//! available and only then splits it off. Bytes that arrive early for the next
//! frame stay buffered.
//!
//! A partial frame is never returned. End of stream, an expired idle window or
//! a socket error all end in a [`TransportError`].
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Frame, FRAME_LEN};
use crate::errors::TransportError;

pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    idle_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reader without an idle timeout.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(FRAME_LEN * 4),
            idle_timeout: None,
        }
    }

    /// Reader that fails with [`TransportError::Timeout`] when a single read
    /// waits longer than `idle_timeout`.
    pub fn with_idle_timeout(inner: R, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(idle_timeout),
            ..Self::new(inner)
        }
    }

    /// Number of bytes buffered but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read exactly `len` bytes, accumulating across short reads.
    pub async fn read_exact_len(&mut self, len: usize) -> Result<Bytes, TransportError> {
        while self.buf.len() < len {
            self.buf.reserve(len - self.buf.len());
            let read = match self.idle_timeout {
                Some(idle) => tokio::time::timeout(idle, self.inner.read_buf(&mut self.buf))
                    .await
                    .map_err(|_| TransportError::Timeout(idle))??,
                None => self.inner.read_buf(&mut self.buf).await?,
            };
            if read == 0 {
                return Err(TransportError::Closed {
                    received: self.buf.len(),
                    expected: len,
                });
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    /// Read the next complete frame.
    pub async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        let bytes = self.read_exact_len(FRAME_LEN).await?;
        let mut raw = [0u8; FRAME_LEN];
        raw.copy_from_slice(&bytes);
        Ok(Frame::from_bytes(&raw))
    }
}
