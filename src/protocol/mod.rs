//! # Sensor Wire Protocol
//!
//! Sensor nodes send fixed 64-byte frames over a plain TCP stream. There is no
//! length prefix; the fixed size is the framing.
//!
//! ```text
//! offset  size  field
//!      0     2  magic        u16  0x4748 ("GH")
//!      2     1  version      u8   1
//!      3     1  reserved     u8   ignored
//!      4     4  sequence     u32  per-node counter
//!      8     4  temperature  i32  °C
//!     12     4  humidity     i32  %
//!     16     4  ch4          f32  ppm
//!     20     4  co2          f32  ppm
//!     24     8  timestamp    i64  Unix seconds
//!     32    32  tag          HMAC-SHA256(secret, bytes 0..32)
//! ```
//!
//! All integers and floats are little-endian, matching the packed struct the
//! ESP32 firmware puts on the wire.
//!
//! A [`Frame`] is split into payload and tag but nothing in the payload is
//! looked at until [`crate::auth::FrameAuthenticator`] turns it into an
//! [`AuthenticatedPayload`]. Only that type can be decoded.

pub mod framer;

use bytes::{Buf, BufMut};

use crate::errors::ProtocolError;

/// Protocol family constant ("GH" for greenhouse).
pub const PACKET_MAGIC: u16 = 0x4748;
/// The only protocol version this server understands.
pub const PACKET_VERSION: u8 = 1;
/// Size of the structured sensor payload.
pub const PAYLOAD_LEN: usize = 32;
/// Size of the HMAC-SHA256 tag.
pub const TAG_LEN: usize = 32;
/// Size of one frame on the wire.
pub const FRAME_LEN: usize = PAYLOAD_LEN + TAG_LEN;

/// One frame as read off the wire. Untrusted.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    payload: [u8; PAYLOAD_LEN],
    tag: [u8; TAG_LEN],
}

impl Frame {
    pub fn new(payload: [u8; PAYLOAD_LEN], tag: [u8; TAG_LEN]) -> Self {
        Self { payload, tag }
    }

    /// Split a complete frame into payload and tag.
    pub fn from_bytes(bytes: &[u8; FRAME_LEN]) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        let mut tag = [0u8; TAG_LEN];
        payload.copy_from_slice(&bytes[..PAYLOAD_LEN]);
        tag.copy_from_slice(&bytes[PAYLOAD_LEN..]);
        Self { payload, tag }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[..PAYLOAD_LEN].copy_from_slice(&self.payload);
        out[PAYLOAD_LEN..].copy_from_slice(&self.tag);
        out
    }

    pub fn payload(&self) -> &[u8; PAYLOAD_LEN] {
        &self.payload
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }
}

// Frames are untrusted; keep their bytes out of debug output.
impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame").finish_non_exhaustive()
    }
}

/// A payload whose tag has been verified against the shared secret.
///
/// Constructed only by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPayload([u8; PAYLOAD_LEN]);

impl AuthenticatedPayload {
    pub(crate) fn new(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }
}

/// Decoded sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPacket {
    pub version: u8,
    pub reserved: u8,
    pub sequence: u32,
    /// Degrees Celsius
    pub temperature: i32,
    /// Relative humidity, percent
    pub humidity: i32,
    /// Methane, ppm
    pub ch4: f32,
    /// Carbon dioxide, ppm
    pub co2: f32,
    /// Unix seconds
    pub timestamp: i64,
}

impl SensorPacket {
    /// A current-version reading with the reserved byte cleared.
    pub fn new(
        sequence: u32,
        temperature: i32,
        humidity: i32,
        ch4: f32,
        co2: f32,
        timestamp: i64,
    ) -> Self {
        Self {
            version: PACKET_VERSION,
            reserved: 0,
            sequence,
            temperature,
            humidity,
            ch4,
            co2,
            timestamp,
        }
    }

    /// Parse an authenticated payload and check the protocol header.
    ///
    /// Magic is checked before version. `reserved` is carried through as-is.
    pub fn decode(payload: &AuthenticatedPayload) -> Result<Self, ProtocolError> {
        let mut buf = &payload.as_bytes()[..];

        let magic = buf.get_u16_le();
        if magic != PACKET_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        let version = buf.get_u8();
        if version != PACKET_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            reserved: buf.get_u8(),
            sequence: buf.get_u32_le(),
            temperature: buf.get_i32_le(),
            humidity: buf.get_i32_le(),
            ch4: buf.get_f32_le(),
            co2: buf.get_f32_le(),
            timestamp: buf.get_i64_le(),
        })
    }

    /// Wire payload for this reading under the standard magic.
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        self.encode_with_magic(PACKET_MAGIC)
    }

    /// Wire payload with an explicit magic value. Only useful for exercising
    /// header checks from tests and diagnostics.
    pub fn encode_with_magic(&self, magic: u16) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        let mut buf = &mut out[..];
        buf.put_u16_le(magic);
        buf.put_u8(self.version);
        buf.put_u8(self.reserved);
        buf.put_u32_le(self.sequence);
        buf.put_i32_le(self.temperature);
        buf.put_i32_le(self.humidity);
        buf.put_f32_le(self.ch4);
        buf.put_f32_le(self.co2);
        buf.put_i64_le(self.timestamp);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SensorPacket {
        SensorPacket::new(42, -5, 80, 3.25, 500.0, 1_800_000_000)
    }

    #[test]
    fn payload_layout_matches_firmware_struct() {
        let bytes = sample().encode();
        assert_eq!(&bytes[0..2], &[0x48, 0x47]);
        assert_eq!(bytes[2], PACKET_VERSION);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..8], &42u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-5i32).to_le_bytes());
        assert_eq!(&bytes[16..20], &3.25f32.to_le_bytes());
        assert_eq!(&bytes[24..32], &1_800_000_000i64.to_le_bytes());
    }

    #[test]
    fn decode_reads_every_field() {
        let payload = AuthenticatedPayload::new(sample().encode());
        let decoded = SensorPacket::decode(&payload).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn reserved_byte_is_not_validated() {
        let mut packet = sample();
        packet.reserved = 0xAB;
        let decoded = SensorPacket::decode(&AuthenticatedPayload::new(packet.encode())).unwrap();
        assert_eq!(decoded.reserved, 0xAB);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let payload = AuthenticatedPayload::new(sample().encode_with_magic(0x0000));
        assert_eq!(
            SensorPacket::decode(&payload),
            Err(ProtocolError::BadMagic(0x0000))
        );
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut packet = sample();
        packet.version = 99;
        let payload = AuthenticatedPayload::new(packet.encode());
        assert_eq!(
            SensorPacket::decode(&payload),
            Err(ProtocolError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn magic_is_checked_before_version() {
        let mut packet = sample();
        packet.version = 7;
        let payload = AuthenticatedPayload::new(packet.encode_with_magic(0xBEEF));
        assert_eq!(
            SensorPacket::decode(&payload),
            Err(ProtocolError::BadMagic(0xBEEF))
        );
    }

    #[test]
    fn frame_splits_payload_and_tag() {
        let mut raw = [0u8; FRAME_LEN];
        raw[..PAYLOAD_LEN].fill(1);
        raw[PAYLOAD_LEN..].fill(2);
        let frame = Frame::from_bytes(&raw);
        assert!(frame.payload().iter().all(|b| *b == 1));
        assert!(frame.tag().iter().all(|b| *b == 2));
        assert_eq!(frame.to_bytes(), raw);
    }
}
