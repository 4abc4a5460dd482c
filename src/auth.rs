//! HMAC-SHA256 frame authentication.
//!
//! Every frame carries a 32-byte tag computed by the sensor node over the
//! 32 payload bytes with the pre-shared key. The server recomputes the tag and
//! compares in constant time with `subtle`, so the comparison cost does not
//! depend on where the first mismatching byte sits.
//!
//! The secret lives in a [`SecretString`] and is never logged.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::AuthError;
use crate::protocol::{AuthenticatedPayload, Frame, SensorPacket, PAYLOAD_LEN, TAG_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies frames with the shared secret.
pub struct FrameAuthenticator {
    secret: SecretString,
}

impl FrameAuthenticator {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Compute the tag for a payload.
    pub fn sign(&self, payload: &[u8; PAYLOAD_LEN]) -> [u8; TAG_LEN] {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(payload);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Check `tag` against the tag recomputed over `payload`.
    pub fn verify(&self, payload: &[u8; PAYLOAD_LEN], tag: &[u8; TAG_LEN]) -> Result<(), AuthError> {
        let computed = self.sign(payload);
        if bool::from(computed[..].ct_eq(&tag[..])) {
            Ok(())
        } else {
            Err(AuthError::TagMismatch)
        }
    }

    /// Verify a frame and hand out its payload as trusted.
    pub fn authenticate(&self, frame: &Frame) -> Result<AuthenticatedPayload, AuthError> {
        self.verify(frame.payload(), frame.tag())?;
        Ok(AuthenticatedPayload::new(*frame.payload()))
    }

    /// Encode and sign a reading, the way a sensor node does.
    pub fn seal(&self, packet: &SensorPacket) -> Frame {
        self.seal_payload(packet.encode())
    }

    pub fn seal_payload(&self, payload: [u8; PAYLOAD_LEN]) -> Frame {
        let tag = self.sign(&payload);
        Frame::new(payload, tag)
    }
}

impl std::fmt::Debug for FrameAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAuthenticator")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
