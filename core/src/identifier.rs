//! Beacon identifier types and the collaborator seams around them.
//!
//! An identifier is an opaque byte sequence plus a protocol version tag; the
//! core never interprets the payload. Completed exchanges leave the core as
//! [`RemoteExchangeRecord`]s through the [`ExchangeSink`] seam.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag attached to identifiers exchanged over the current service revision.
pub const PROTOCOL_VERSION: u8 = 1;

/// An opaque beacon identifier as exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconIdentifier {
    bytes: Vec<u8>,
    version: u8,
}

impl BeaconIdentifier {
    /// Create an identifier from raw payload bytes and a version tag.
    pub fn new(bytes: Vec<u8>, version: u8) -> Self {
        Self { bytes, version }
    }

    /// The raw identifier payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Protocol version this identifier was exchanged under.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for BeaconIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.bytes[..self.bytes.len().min(8)];
        write!(
            f,
            "BeaconIdentifier {{ version: {}, len: {}, head: {} }}",
            self.version,
            self.bytes.len(),
            hex::encode(head)
        )
    }
}

/// Which exchange path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSource {
    /// A remote central connected to our GATT server and wrote its identifier.
    ConnectionIncoming,
    /// We connected to a remote GATT server and read its identifier.
    ConnectionOutgoing,
}

impl fmt::Display for ExchangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeSource::ConnectionIncoming => write!(f, "ConnectionIncoming"),
            ExchangeSource::ConnectionOutgoing => write!(f, "ConnectionOutgoing"),
        }
    }
}

/// A completed remote identifier exchange, delivered to the sink exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteExchangeRecord {
    /// The remote peer's identifier as written to us.
    pub identifier: BeaconIdentifier,
    /// Most recent signal strength sampled for the peer's connection, in dBm.
    pub signal_dbm: Option<i8>,
    /// Which exchange path produced this record.
    pub source: ExchangeSource,
}

impl fmt::Display for RemoteExchangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal_dbm {
            Some(dbm) => write!(f, "{} at {} dBm via {}", self.identifier, dbm, self.source),
            None => write!(f, "{} (no signal sample) via {}", self.identifier, self.source),
        }
    }
}

/// Supplies the identifier this device currently advertises as its own.
///
/// The identifier may change between calls; the read path queries it fresh on
/// every request.
pub trait IdentifierSource: Send {
    /// The current local identifier, or `None` if none has been provisioned.
    fn current_local_identifier(&self) -> Option<BeaconIdentifier>;
}

/// Consumes completed remote identifier exchanges.
///
/// Called on the transport's event-processing context; implementations must
/// hand off and return without blocking.
pub trait ExchangeSink: Send {
    /// Receive one completed exchange. Records are never redelivered.
    fn on_remote_identifier_exchanged(&mut self, record: RemoteExchangeRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accessors() {
        let id = BeaconIdentifier::new(vec![0xAA, 0xBB, 0xCC], PROTOCOL_VERSION);
        assert_eq!(id.bytes(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(id.version(), PROTOCOL_VERSION);
        assert_eq!(id.len(), 3);
        assert!(!id.is_empty());
    }

    #[test]
    fn test_empty_identifier() {
        let id = BeaconIdentifier::new(Vec::new(), PROTOCOL_VERSION);
        assert_eq!(id.len(), 0);
        assert!(id.is_empty());
    }

    #[test]
    fn test_identifier_display_truncates_payload() {
        let id = BeaconIdentifier::new(vec![0x11; 32], 2);
        let display = id.to_string();
        assert!(display.contains("version: 2"));
        assert!(display.contains("len: 32"));
        assert!(display.contains(&hex::encode([0x11; 8])));
    }

    #[test]
    fn test_exchange_source_display() {
        assert_eq!(
            ExchangeSource::ConnectionIncoming.to_string(),
            "ConnectionIncoming"
        );
        assert_eq!(
            ExchangeSource::ConnectionOutgoing.to_string(),
            "ConnectionOutgoing"
        );
    }

    #[test]
    fn test_record_display_with_and_without_signal() {
        let identifier = BeaconIdentifier::new(vec![1, 2, 3], PROTOCOL_VERSION);
        let with_signal = RemoteExchangeRecord {
            identifier: identifier.clone(),
            signal_dbm: Some(-60),
            source: ExchangeSource::ConnectionIncoming,
        };
        assert!(with_signal.to_string().contains("-60 dBm"));

        let without_signal = RemoteExchangeRecord {
            identifier,
            signal_dbm: None,
            source: ExchangeSource::ConnectionIncoming,
        };
        assert!(without_signal.to_string().contains("no signal sample"));
    }

    #[test]
    fn test_serialization_record() {
        let record = RemoteExchangeRecord {
            identifier: BeaconIdentifier::new(vec![7, 8, 9], PROTOCOL_VERSION),
            signal_dbm: Some(-42),
            source: ExchangeSource::ConnectionIncoming,
        };
        let serialized = bincode::serialize(&record).expect("serialization failed");
        let deserialized: RemoteExchangeRecord =
            bincode::deserialize(&serialized).expect("deserialization failed");
        assert_eq!(deserialized, record);
    }
}
