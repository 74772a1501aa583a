//! Request and response signatures
//!
//! Every HMAC-authenticated message carries a keyed digest over its command
//! bytes. The digest input is the command length as a big-endian `u32`
//! followed by the command bytes; the envelope is never signed.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::protocol::Message;

type HmacSha1 = Hmac<Sha1>;

/// Computes and validates keyed digests
pub trait Signer: Send + Sync {
    /// Digest over `command_bytes` under `key`; deterministic
    fn sign(&self, command_bytes: &[u8], key: &[u8]) -> Vec<u8>;

    /// Whether `message` carries a valid digest under `key`.
    ///
    /// A message without a digest is never valid.
    fn verify(&self, message: &Message, key: &[u8]) -> bool {
        let Some(received) = message.hmac_digest() else {
            return false;
        };
        let expected = self.sign(&message.command_bytes, key);
        digests_equal(&expected, received)
    }
}

/// HMAC-SHA1, the algorithm drives use
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha1Signer;

impl Signer for HmacSha1Signer {
    fn sign(&self, command_bytes: &[u8], key: &[u8]) -> Vec<u8> {
        let mut mac = match HmacSha1::new_from_slice(key) {
            Ok(mac) => mac,
            Err(e) => {
                // HMAC accepts keys of any length
                tracing::error!(error = %e, "rejected HMAC key");
                return Vec::new();
            }
        };
        mac.update(&(command_bytes.len() as u32).to_be_bytes());
        mac.update(command_bytes);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Length check, then compare every byte regardless of where the first
/// difference is
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
