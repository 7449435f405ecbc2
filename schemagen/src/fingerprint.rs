//! Deterministic fingerprinting of normalized configurations.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::error::Result;
use crate::normalize::NormalizedConfiguration;

const DOMAIN: &[u8] = b"schemagen-config:v1";

///
/// Fingerprint
///
/// Stable cache key for a normalized configuration. Equal normalized
/// configurations hash equally on every machine and in every run.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash the canonical serialization of `normalized`.
    ///
    /// Struct fields serialize in declaration order and maps are ordered, so
    /// the byte stream depends only on the configuration's values. List order
    /// is kept: forced types apply in order.
    pub fn of(normalized: &NormalizedConfiguration) -> Result<Self> {
        let canonical = serde_json::to_vec(&**normalized)?;
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN);
        hasher.update([0u8]);
        hasher.update(&canonical);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(Self(out))
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn as_hex(&self) -> String {
        hex(&self.0)
    }
}

/// Lowercase hex rendering of a digest
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}
