//! Per-connection signal-strength latches.
//!
//! Sampling is asynchronous. A request is issued the moment a peer connects
//! rather than at its first write, so a completed value is usually available
//! by the time an exchange finishes. Latches die with the connection; a
//! sample landing after teardown finds no latch and is discarded by the
//! caller.

use super::transport::PeerHandle;
use std::collections::HashMap;

/// Issues and withdraws asynchronous signal-strength sampling requests.
///
/// Completions are delivered back through
/// `IdentifierExchangeServer::on_signal_strength`, possibly after `cancel`
/// has been called; such late results are dropped there.
pub trait SignalStrengthSource: Send {
    /// Start one sample for `peer`.
    fn request(&mut self, peer: PeerHandle);

    /// Withdraw the outstanding request for `peer`, if any.
    fn cancel(&mut self, peer: PeerHandle);
}

/// Most recent completed signal-strength sample for one connected peer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrengthLatch {
    latest_dbm: Option<i8>,
}

impl SignalStrengthLatch {
    /// Cache a completed sample, replacing any earlier one.
    pub fn record(&mut self, dbm: i8) {
        self.latest_dbm = Some(dbm);
    }

    /// The most recent completed sample, if any has arrived.
    pub fn latest(&self) -> Option<i8> {
        self.latest_dbm
    }
}

/// Per-peer latches, installed on connect and purged on disconnect or close.
#[derive(Debug, Default)]
pub struct LatchTable {
    latches: HashMap<PeerHandle, SignalStrengthLatch>,
}

impl LatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh latch for a newly connected peer, replacing any stale
    /// latch left under a reused handle.
    pub fn install(&mut self, peer: PeerHandle) {
        self.latches.insert(peer, SignalStrengthLatch::default());
    }

    /// Cache a completed sample. Returns `false` when no latch exists for
    /// `peer` (late or cancelled sample).
    pub fn record(&mut self, peer: PeerHandle, dbm: i8) -> bool {
        match self.latches.get_mut(&peer) {
            Some(latch) => {
                latch.record(dbm);
                true
            }
            None => false,
        }
    }

    /// The most recent sample latched for `peer`.
    pub fn latest(&self, peer: PeerHandle) -> Option<i8> {
        self.latches.get(&peer).and_then(SignalStrengthLatch::latest)
    }

    /// Remove the latch for `peer`. Returns whether one existed.
    pub fn remove(&mut self, peer: PeerHandle) -> bool {
        self.latches.remove(&peer).is_some()
    }

    /// Remove every latch, returning the peers so their sampling requests can
    /// be cancelled.
    pub fn drain(&mut self) -> Vec<PeerHandle> {
        self.latches.drain().map(|(peer, _)| peer).collect()
    }

    /// Number of connected peers with a latch.
    pub fn len(&self) -> usize {
        self.latches.len()
    }

    /// Whether no latches exist.
    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }
}
