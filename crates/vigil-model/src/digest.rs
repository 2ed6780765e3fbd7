// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! 128-bit content digests.
//!
//! Compound and state identifiers are the first 16 bytes of a SHA-256 over
//! canonical payload bytes. The printable form is lowercase hex; that form
//! is also how digests are stored inside documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// A 16-byte content-addressed identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 16]);

impl Digest {
    /// Digest a prefix (typically the stock id in string form) followed by
    /// a payload of canonical bytes.
    pub fn of_parts(prefix: &str, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(payload);
        let full = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        Digest(out)
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex form (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| DigestParseError(s.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| DigestParseError(s.to_string()))?;
        Ok(Digest(arr))
    }
}

/// Error returned when parsing a digest from its hex form fails.
#[derive(Debug, thiserror::Error)]
#[error("not a 32-character hex digest: '{0}'")]
pub struct DigestParseError(pub String);

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
