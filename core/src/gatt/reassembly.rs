//! Long-write reassembly for the exchange characteristic.
//!
//! Remote writers may split an identifier across several prepared writes
//! finalized by one execute, per the standard long-write pattern. The running
//! buffer length is the single source of truth for the expected next offset;
//! a fragment declaring anything else is rejected without touching the
//! buffer, so no sequence numbers are needed to rule out gaps, reordering,
//! or duplicates.

use super::transport::PeerHandle;
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on one accumulated long write.
pub const MAX_PENDING_WRITE_BYTES: usize = 512;

/// Errors for fragment accumulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Fragment offset {got} does not match expected offset {expected}")]
    OffsetMismatch { expected: usize, got: usize },
    #[error("Accumulated write of {requested} bytes exceeds the {limit} byte limit")]
    Overrun { requested: usize, limit: usize },
}

/// Accumulating long-write buffer for one peer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingWriteBuffer {
    bytes: Vec<u8>,
}

impl PendingWriteBuffer {
    /// Offset the next fragment must declare.
    pub fn expected_offset(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes accumulated so far.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn extend(&mut self, payload: &[u8]) {
        self.bytes.extend_from_slice(payload);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Per-peer long-write buffers with contiguous-offset append semantics.
#[derive(Debug, Default)]
pub struct WriteReassemblyTable {
    buffers: HashMap<PeerHandle, PendingWriteBuffer>,
}

impl WriteReassemblyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment for `peer`, creating the buffer on its first
    /// accepted fragment. A mismatched offset or an overrun rejects the
    /// fragment and leaves the buffer exactly as it was; a rejected first
    /// fragment creates nothing.
    pub fn append(
        &mut self,
        peer: PeerHandle,
        offset: usize,
        payload: &[u8],
    ) -> Result<(), ReassemblyError> {
        let expected = self
            .buffers
            .get(&peer)
            .map(PendingWriteBuffer::expected_offset)
            .unwrap_or(0);
        if offset != expected {
            return Err(ReassemblyError::OffsetMismatch {
                expected,
                got: offset,
            });
        }
        let requested = expected + payload.len();
        if requested > MAX_PENDING_WRITE_BYTES {
            return Err(ReassemblyError::Overrun {
                requested,
                limit: MAX_PENDING_WRITE_BYTES,
            });
        }
        self.buffers.entry(peer).or_default().extend(payload);
        Ok(())
    }

    /// Remove and return the accumulated bytes, if a write is in progress.
    pub fn commit(&mut self, peer: PeerHandle) -> Option<Vec<u8>> {
        self.buffers.remove(&peer).map(PendingWriteBuffer::into_bytes)
    }

    /// Drop any in-progress write for `peer`. Returns whether one existed.
    pub fn discard(&mut self, peer: PeerHandle) -> bool {
        self.buffers.remove(&peer).is_some()
    }

    /// Offset the next fragment from `peer` must declare.
    pub fn expected_offset(&self, peer: PeerHandle) -> usize {
        self.buffers
            .get(&peer)
            .map(PendingWriteBuffer::expected_offset)
            .unwrap_or(0)
    }

    /// Whether `peer` has a write in progress.
    pub fn has_pending(&self, peer: PeerHandle) -> bool {
        self.buffers.contains_key(&peer)
    }

    /// Number of peers with a write in progress.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no writes are in progress.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Drop every in-progress write.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PEER: PeerHandle = PeerHandle(1);
    const OTHER: PeerHandle = PeerHandle(2);

    #[test]
    fn test_contiguous_fragments_accumulate() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"AB").expect("First fragment");
        table.append(PEER, 2, b"CD").expect("Second fragment");
        assert_eq!(table.expected_offset(PEER), 4);
        assert_eq!(table.commit(PEER).expect("Pending write"), b"ABCD");
    }

    #[test]
    fn test_offset_mismatch_leaves_buffer_unchanged() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"AB").expect("First fragment");
        table.append(PEER, 2, b"CD").expect("Second fragment");

        let result = table.append(PEER, 2, b"CD");
        assert_eq!(
            result,
            Err(ReassemblyError::OffsetMismatch {
                expected: 4,
                got: 2
            })
        );
        assert_eq!(table.expected_offset(PEER), 4);
        assert_eq!(table.commit(PEER).expect("Pending write"), b"ABCD");
    }

    #[test]
    fn test_rejected_first_fragment_creates_no_buffer() {
        let mut table = WriteReassemblyTable::new();
        let result = table.append(PEER, 5, b"AB");
        assert_eq!(
            result,
            Err(ReassemblyError::OffsetMismatch {
                expected: 0,
                got: 5
            })
        );
        assert!(!table.has_pending(PEER));
        assert!(table.commit(PEER).is_none());
    }

    #[test]
    fn test_commit_removes_buffer() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"XYZ").expect("Fragment");
        assert_eq!(table.commit(PEER).expect("Pending write"), b"XYZ");
        assert!(table.commit(PEER).is_none());
        assert!(!table.has_pending(PEER));
    }

    #[test]
    fn test_commit_without_pending_write() {
        let mut table = WriteReassemblyTable::new();
        assert!(table.commit(PEER).is_none());
    }

    #[test]
    fn test_discard_drops_buffer() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"AB").expect("Fragment");
        assert!(table.discard(PEER));
        assert!(!table.discard(PEER));
        assert!(table.commit(PEER).is_none());
    }

    #[test]
    fn test_empty_first_fragment_creates_buffer() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"").expect("Empty fragment");
        assert!(table.has_pending(PEER));
        assert_eq!(table.commit(PEER).expect("Pending write"), b"");
    }

    #[test]
    fn test_overrun_rejected_and_buffer_unchanged() {
        let mut table = WriteReassemblyTable::new();
        let half = vec![0u8; MAX_PENDING_WRITE_BYTES - 1];
        table.append(PEER, 0, &half).expect("Near-limit fragment");

        let result = table.append(PEER, half.len(), &[0u8; 2]);
        assert_eq!(
            result,
            Err(ReassemblyError::Overrun {
                requested: MAX_PENDING_WRITE_BYTES + 1,
                limit: MAX_PENDING_WRITE_BYTES,
            })
        );
        assert_eq!(table.expected_offset(PEER), half.len());

        // Filling exactly to the limit is still allowed.
        table.append(PEER, half.len(), &[0u8; 1]).expect("Limit fragment");
        assert_eq!(
            table.commit(PEER).expect("Pending write").len(),
            MAX_PENDING_WRITE_BYTES
        );
    }

    #[test]
    fn test_peers_are_independent() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"AA").expect("Fragment");
        table.append(OTHER, 0, b"BBB").expect("Fragment");

        assert_eq!(table.len(), 2);
        assert_eq!(table.expected_offset(PEER), 2);
        assert_eq!(table.expected_offset(OTHER), 3);

        assert!(table.discard(PEER));
        assert_eq!(table.commit(OTHER).expect("Pending write"), b"BBB");
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut table = WriteReassemblyTable::new();
        table.append(PEER, 0, b"AA").expect("Fragment");
        table.append(OTHER, 0, b"BB").expect("Fragment");
        table.clear();
        assert!(table.is_empty());
        assert!(table.commit(PEER).is_none());
        assert!(table.commit(OTHER).is_none());
    }

    proptest! {
        #[test]
        fn prop_contiguous_split_reassembles_exactly(
            data in proptest::collection::vec(any::<u8>(), 0..MAX_PENDING_WRITE_BYTES),
            chunk in 1usize..64,
        ) {
            let mut table = WriteReassemblyTable::new();
            let mut offset = 0;
            loop {
                let end = (offset + chunk).min(data.len());
                table.append(PEER, offset, &data[offset..end]).expect("Contiguous fragment");
                offset = end;
                if offset == data.len() {
                    break;
                }
            }
            prop_assert_eq!(table.commit(PEER).expect("Pending write"), data);
        }

        #[test]
        fn prop_any_noncontiguous_offset_is_rejected(
            accepted in proptest::collection::vec(any::<u8>(), 1..128),
            skew in 1usize..64,
            forward in proptest::bool::ANY,
        ) {
            let mut table = WriteReassemblyTable::new();
            table.append(PEER, 0, &accepted).expect("First fragment");

            let expected = accepted.len();
            let bad_offset = if forward {
                expected + skew
            } else {
                expected.saturating_sub(skew)
            };
            prop_assume!(bad_offset != expected);

            let result = table.append(PEER, bad_offset, b"!");
            prop_assert_eq!(result, Err(ReassemblyError::OffsetMismatch {
                expected,
                got: bad_offset,
            }));
            prop_assert_eq!(table.expected_offset(PEER), expected);
            prop_assert_eq!(table.commit(PEER).expect("Pending write"), accepted);
        }
    }
}
