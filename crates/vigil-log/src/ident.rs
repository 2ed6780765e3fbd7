// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Record-id minting.
//!
//! Log records carry a 12-byte id whose layout is load-bearing: the first
//! 4 bytes encode the creation time in seconds, so range queries over the
//! logs collection can use the id index alone. The remaining bytes make
//! the id unique: 3 bytes of host hash, the 2 low bytes of the run id, and
//! a per-process monotonic counter modulo 2^24.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use sha2::{Digest as _, Sha256};

/// A 12-byte time-prefixed record id; printable form is lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub [u8; 12]);

impl RecordId {
    /// The creation second encoded in the id prefix.
    pub fn ts_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Lowercase hex form (24 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Mints record ids for one process and run.
pub struct RecordIdFactory {
    host: [u8; 3],
    run_low: [u8; 2],
    counter: AtomicU32,
}

impl RecordIdFactory {
    /// A factory stamped with the given run id.
    ///
    /// The host bytes hash `HOSTNAME` when set, falling back to the
    /// process id so two local processes still differ.
    pub fn new(run_id: i64) -> Self {
        let host_name = std::env::var("HOSTNAME")
            .unwrap_or_else(|_| format!("pid-{}", std::process::id()));
        Self::with_host_name(run_id, &host_name)
    }

    /// A factory with an explicit host name, for tests.
    pub fn with_host_name(run_id: i64, host_name: &str) -> Self {
        let digest = Sha256::digest(host_name.as_bytes());
        Self {
            host: [digest[0], digest[1], digest[2]],
            run_low: [(run_id >> 8) as u8, run_id as u8],
            counter: AtomicU32::new(0),
        }
    }

    /// Mint one id for the given creation second.
    pub fn mint(&self, now_secs: u32) -> RecordId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        let ts = now_secs.to_be_bytes();
        RecordId([
            ts[0],
            ts[1],
            ts[2],
            ts[3],
            self.host[0],
            self.host[1],
            self.host[2],
            self.run_low[0],
            self.run_low[1],
            (seq >> 16) as u8,
            (seq >> 8) as u8,
            seq as u8,
        ])
    }
}
