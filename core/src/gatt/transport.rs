//! Transport seam for the exchange GATT server.
//!
//! The BLE stack lives outside this crate. A platform adapter translates
//! stack callbacks into handler calls on
//! [`IdentifierExchangeServer`](super::server::IdentifierExchangeServer) and
//! carries responses back to the radio. The adapter must deliver events
//! serially, in arrival order per peer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Beacon exchange service UUID (0xBEAC0000 in the standard base range).
pub const EXCHANGE_SERVICE_UUID: u128 = 0xBEAC_0000_0000_1000_8000_00805F9B34FB;

/// The single read/write identifier characteristic within the service.
pub const EXCHANGE_CHARACTERISTIC_UUID: u128 = 0xBEAC_0001_0000_1000_8000_00805F9B34FB;

/// Status code transports report for a successful asynchronous operation.
pub const TRANSPORT_STATUS_SUCCESS: u8 = 0;

/// Transport-assigned handle naming one connected peer.
///
/// Unique among currently connected peers only. The transport may hand the
/// same value to a later, unrelated connection after this peer disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(pub u64);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Link state reported by the transport for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// The link is up; reads and writes may follow.
    Connected,
    /// The link is gone; all per-peer state is purged.
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connected => write!(f, "Connected"),
            LinkState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// ATT-level status this server answers requests with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Request honored; successful reads carry a payload.
    Success,
    /// Read target absent or offset out of range.
    ReadNotPermitted,
    /// Write rejected by the reassembly protocol or the target.
    WriteNotPermitted,
}

impl ResponseStatus {
    /// ATT protocol code for this status.
    pub fn att_code(&self) -> u8 {
        match self {
            ResponseStatus::Success => 0x00,
            ResponseStatus::ReadNotPermitted => 0x02,
            ResponseStatus::WriteNotPermitted => 0x03,
        }
    }
}

/// A characteristic requested from the transport during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicDefinition {
    /// Characteristic UUID.
    pub uuid: u128,
    /// Peers may read the local identifier through it.
    pub readable: bool,
    /// Peers may write their identifier through it.
    pub writable: bool,
}

impl CharacteristicDefinition {
    /// The exchange characteristic: read + write, fixed UUID.
    pub fn exchange() -> Self {
        Self {
            uuid: EXCHANGE_CHARACTERISTIC_UUID,
            readable: true,
            writable: true,
        }
    }
}

/// The primary service registered on the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Service UUID.
    pub uuid: u128,
    /// Characteristics attached to the service.
    pub characteristics: Vec<CharacteristicDefinition>,
}

impl ServiceDefinition {
    /// The beacon exchange primary service with its single characteristic.
    pub fn exchange() -> Self {
        Self {
            uuid: EXCHANGE_SERVICE_UUID,
            characteristics: vec![CharacteristicDefinition::exchange()],
        }
    }
}

/// Server-role GATT transport as seen by the exchange core.
///
/// Implementations wrap a platform BLE stack handle. Methods must not block;
/// any underlying I/O belongs to the adapter.
pub trait ServerTransport: Send {
    /// Attach a characteristic to the service under assembly.
    /// Returns `false` if the stack rejects it.
    fn add_characteristic(&mut self, characteristic: &CharacteristicDefinition) -> bool;

    /// Register the assembled primary service. Returns `false` on outright
    /// rejection; otherwise the outcome arrives later through
    /// `IdentifierExchangeServer::on_service_added`.
    fn add_service(&mut self, service: &ServiceDefinition) -> bool;

    /// Send exactly one response for a request that asked for one.
    /// `payload` is present only on successful reads.
    fn send_response(
        &mut self,
        peer: PeerHandle,
        request_id: u32,
        status: ResponseStatus,
        payload: Option<Vec<u8>>,
    );

    /// Release the underlying server handle. Called once, either on a failed
    /// start or on close.
    fn release(&mut self);
}

/// Callbacks to the collaborator that started the server.
pub trait LifecycleObserver: Send {
    /// The transport confirmed the service registration; the server is fully
    /// operational.
    fn on_server_started(&mut self);

    /// The transport rejected the service registration after startup had
    /// already returned; `status` is the transport's raw code.
    fn on_server_failed(&mut self, status: u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_att_codes() {
        assert_eq!(ResponseStatus::Success.att_code(), 0x00);
        assert_eq!(ResponseStatus::ReadNotPermitted.att_code(), 0x02);
        assert_eq!(ResponseStatus::WriteNotPermitted.att_code(), 0x03);
    }

    #[test]
    fn test_peer_handle_display() {
        assert_eq!(PeerHandle(7).to_string(), "peer#7");
    }

    #[test]
    fn test_peer_handle_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(PeerHandle(1));
        set.insert(PeerHandle(2));
        set.insert(PeerHandle(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_link_state_display() {
        assert_eq!(LinkState::Connected.to_string(), "Connected");
        assert_eq!(LinkState::Disconnected.to_string(), "Disconnected");
    }

    #[test]
    fn test_exchange_characteristic_definition() {
        let characteristic = CharacteristicDefinition::exchange();
        assert_eq!(characteristic.uuid, EXCHANGE_CHARACTERISTIC_UUID);
        assert!(characteristic.readable);
        assert!(characteristic.writable);
    }

    #[test]
    fn test_exchange_service_definition() {
        let service = ServiceDefinition::exchange();
        assert_eq!(service.uuid, EXCHANGE_SERVICE_UUID);
        assert_eq!(service.characteristics.len(), 1);
        assert_eq!(
            service.characteristics[0],
            CharacteristicDefinition::exchange()
        );
    }

    #[test]
    fn test_service_and_characteristic_uuids_distinct() {
        assert_ne!(EXCHANGE_SERVICE_UUID, EXCHANGE_CHARACTERISTIC_UUID);
    }

    #[test]
    fn test_serialization_service_definition() {
        let service = ServiceDefinition::exchange();
        let serialized = bincode::serialize(&service).expect("serialization failed");
        let deserialized: ServiceDefinition =
            bincode::deserialize(&serialized).expect("deserialization failed");
        assert_eq!(deserialized, service);
    }
}
