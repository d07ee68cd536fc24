//! Lifecycle and event dispatch for the identifier exchange GATT server.
//!
//! The server owns the per-peer reassembly and latch tables and is driven
//! entirely by transport-delivered events. All handlers take `&mut self` and
//! never block: the transport adapter is responsible for delivering events
//! on one serialized context, in arrival order per peer.

use crate::gatt::reassembly::WriteReassemblyTable;
use crate::gatt::signal::{LatchTable, SignalStrengthSource};
use crate::gatt::transport::{
    CharacteristicDefinition, LifecycleObserver, LinkState, PeerHandle, ResponseStatus,
    ServerTransport, ServiceDefinition, EXCHANGE_CHARACTERISTIC_UUID, EXCHANGE_SERVICE_UUID,
    TRANSPORT_STATUS_SUCCESS,
};
use crate::identifier::{
    BeaconIdentifier, ExchangeSink, ExchangeSource, IdentifierSource, RemoteExchangeRecord,
    PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Constructed; no service registered yet.
    Uninitialized,
    /// Service registered; transport events are processed.
    Serving,
    /// Torn down; every event is ignored.
    Closed,
}

/// Failures during server startup.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("Could not obtain a GATT server handle from the transport")]
    CannotObtainTransport,
    #[error("Transport rejected the exchange characteristic")]
    CannotAddCharacteristic,
    #[error("Transport rejected the exchange service registration")]
    CannotAddService,
}

/// GATT server for the proximity beacon exchange.
///
/// Exactly one instance is valid per underlying transport handle. Create it
/// with [`new`](Self::new), bring it up with [`initialize`](Self::initialize),
/// then feed it transport events until [`close`](Self::close).
pub struct IdentifierExchangeServer<T: ServerTransport> {
    state: ServerState,
    transport: Option<T>,
    reassembly: WriteReassemblyTable,
    latches: LatchTable,
    identifiers: Box<dyn IdentifierSource>,
    sink: Box<dyn ExchangeSink>,
    signals: Box<dyn SignalStrengthSource>,
    observer: Box<dyn LifecycleObserver>,
}

impl<T: ServerTransport> IdentifierExchangeServer<T> {
    /// Create a server that has not yet registered its service.
    pub fn new(
        identifiers: Box<dyn IdentifierSource>,
        sink: Box<dyn ExchangeSink>,
        signals: Box<dyn SignalStrengthSource>,
        observer: Box<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            state: ServerState::Uninitialized,
            transport: None,
            reassembly: WriteReassemblyTable::new(),
            latches: LatchTable::new(),
            identifiers,
            sink,
            signals,
            observer,
        }
    }

    /// Obtain a transport handle and register the exchange service on it.
    ///
    /// On failure the state stays `Uninitialized` and the caller may retry
    /// with a fresh factory. Synchronous success means the service was
    /// accepted for registration; the transport confirms (or rejects) it
    /// later through [`on_service_added`](Self::on_service_added).
    ///
    /// Panics when called while already `Serving` or `Closed`; reinitializing
    /// a live instance is a contract violation, not a recoverable error.
    pub fn initialize<F>(&mut self, open_transport: F) -> Result<(), StartError>
    where
        F: FnOnce() -> Option<T>,
    {
        assert!(
            self.state == ServerState::Uninitialized,
            "initialize() called on a server that is already {:?}",
            self.state
        );

        let mut transport = match open_transport() {
            Some(transport) => transport,
            None => return Err(StartError::CannotObtainTransport),
        };

        let characteristic = CharacteristicDefinition::exchange();
        if !transport.add_characteristic(&characteristic) {
            transport.release();
            return Err(StartError::CannotAddCharacteristic);
        }

        let service = ServiceDefinition::exchange();
        if !transport.add_service(&service) {
            transport.release();
            return Err(StartError::CannotAddService);
        }

        self.transport = Some(transport);
        self.state = ServerState::Serving;
        info!("Exchange service registered, awaiting transport confirmation");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Number of peers with a long write in progress.
    pub fn pending_writes(&self) -> usize {
        self.reassembly.len()
    }

    /// Number of connected peers with a signal-strength latch.
    pub fn latched_peers(&self) -> usize {
        self.latches.len()
    }

    /// Tear the server down: cancel outstanding sampling requests, drop all
    /// pending writes, release the transport. Returns `false` when already
    /// closed and there was nothing to tear down.
    pub fn close(&mut self) -> bool {
        if self.state == ServerState::Closed {
            return false;
        }
        for peer in self.latches.drain() {
            self.signals.cancel(peer);
        }
        self.reassembly.clear();
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
        self.state = ServerState::Closed;
        info!("Exchange server closed");
        true
    }

    /// The transport finished registering the service it accepted during
    /// [`initialize`](Self::initialize).
    pub fn on_service_added(&mut self, service: u128, status: u8) {
        if self.state != ServerState::Serving {
            debug!("Ignoring service-added event while {:?}", self.state);
            return;
        }
        if service != EXCHANGE_SERVICE_UUID {
            debug!("Ignoring service-added event for unknown service {:#034x}", service);
            return;
        }
        if status == TRANSPORT_STATUS_SUCCESS {
            info!("Exchange server operational");
            self.observer.on_server_started();
        } else {
            warn!("Transport rejected service registration with status {}", status);
            self.observer.on_server_failed(status);
        }
    }

    /// A peer's link state changed.
    pub fn on_connection_state_changed(&mut self, peer: Option<PeerHandle>, link: LinkState) {
        let peer = match self.serving_peer(peer, "connection state change") {
            Some(peer) => peer,
            None => return,
        };
        match link {
            LinkState::Connected => {
                debug!("{} connected, requesting signal strength sample", peer);
                if self.reassembly.discard(peer) {
                    debug!("{} had a stale pending write under a reused handle", peer);
                }
                self.latches.install(peer);
                self.signals.request(peer);
            }
            LinkState::Disconnected => {
                if self.reassembly.discard(peer) {
                    debug!("{} disconnected with a write in progress", peer);
                }
                if self.latches.remove(peer) {
                    self.signals.cancel(peer);
                }
                debug!("{} disconnected, per-peer state purged", peer);
            }
        }
    }

    /// A peer wants (a slice of) the local identifier. Reads always get a
    /// response.
    pub fn on_characteristic_read_request(
        &mut self,
        peer: Option<PeerHandle>,
        request_id: u32,
        characteristic: u128,
        offset: usize,
    ) {
        let peer = match self.serving_peer(peer, "characteristic read") {
            Some(peer) => peer,
            None => return,
        };
        if characteristic != EXCHANGE_CHARACTERISTIC_UUID {
            debug!("{} read of unknown characteristic {:#034x}", peer, characteristic);
            self.respond(peer, request_id, ResponseStatus::ReadNotPermitted, None);
            return;
        }
        match self.identifiers.current_local_identifier() {
            Some(identifier) if offset < identifier.len() => {
                let slice = identifier.bytes()[offset..].to_vec();
                self.respond(peer, request_id, ResponseStatus::Success, Some(slice));
            }
            Some(_) => {
                debug!("{} read offset {} past end of local identifier", peer, offset);
                self.respond(peer, request_id, ResponseStatus::ReadNotPermitted, None);
            }
            None => {
                debug!("{} read but no local identifier is provisioned", peer);
                self.respond(peer, request_id, ResponseStatus::ReadNotPermitted, None);
            }
        }
    }

    /// A peer wrote to the exchange characteristic, either atomically or as
    /// one fragment of a prepared long write.
    #[allow(clippy::too_many_arguments)]
    pub fn on_characteristic_write_request(
        &mut self,
        peer: Option<PeerHandle>,
        request_id: u32,
        characteristic: u128,
        value: &[u8],
        offset: usize,
        prepared: bool,
        response_needed: bool,
    ) {
        let peer = match self.serving_peer(peer, "characteristic write") {
            Some(peer) => peer,
            None => return,
        };
        if characteristic != EXCHANGE_CHARACTERISTIC_UUID {
            debug!("{} write to unknown characteristic {:#034x}", peer, characteristic);
            if response_needed {
                self.respond(peer, request_id, ResponseStatus::WriteNotPermitted, None);
            }
            return;
        }

        let status = if prepared {
            match self.reassembly.append(peer, offset, value) {
                Ok(()) => ResponseStatus::Success,
                Err(err) => {
                    debug!("{} write fragment rejected: {}", peer, err);
                    ResponseStatus::WriteNotPermitted
                }
            }
        } else {
            // Complete atomic write: no buffer is ever created.
            self.deliver(peer, value.to_vec());
            ResponseStatus::Success
        };

        if response_needed {
            self.respond(peer, request_id, status, None);
        }
    }

    /// A peer finalized (`execute == true`) or abandoned (`execute == false`)
    /// its prepared long write. Execute requests always get a response.
    pub fn on_execute_write(&mut self, peer: Option<PeerHandle>, request_id: u32, execute: bool) {
        let peer = match self.serving_peer(peer, "execute write") {
            Some(peer) => peer,
            None => return,
        };
        let status = if execute {
            match self.reassembly.commit(peer) {
                Some(bytes) => {
                    self.deliver(peer, bytes);
                    ResponseStatus::Success
                }
                None => {
                    debug!("{} executed with no write in progress", peer);
                    ResponseStatus::WriteNotPermitted
                }
            }
        } else {
            // Cancellation is unconditionally permitted.
            self.reassembly.discard(peer);
            ResponseStatus::Success
        };
        self.respond(peer, request_id, status, None);
    }

    /// Descriptor reads carry no payload for this service.
    pub fn on_descriptor_read_request(
        &mut self,
        peer: Option<PeerHandle>,
        request_id: u32,
        descriptor: u128,
    ) {
        let peer = match self.serving_peer(peer, "descriptor read") {
            Some(peer) => peer,
            None => return,
        };
        debug!("{} read of unsupported descriptor {:#034x}", peer, descriptor);
        self.respond(peer, request_id, ResponseStatus::ReadNotPermitted, None);
    }

    /// Descriptor writes carry no payload for this service.
    pub fn on_descriptor_write_request(
        &mut self,
        peer: Option<PeerHandle>,
        request_id: u32,
        descriptor: u128,
        response_needed: bool,
    ) {
        let peer = match self.serving_peer(peer, "descriptor write") {
            Some(peer) => peer,
            None => return,
        };
        debug!("{} write to unsupported descriptor {:#034x}", peer, descriptor);
        if response_needed {
            self.respond(peer, request_id, ResponseStatus::WriteNotPermitted, None);
        }
    }

    /// Observed only; the exchange protocol fits in any permitted MTU.
    pub fn on_mtu_changed(&mut self, peer: Option<PeerHandle>, mtu: usize) {
        if let Some(peer) = self.serving_peer(peer, "MTU change") {
            debug!("{} negotiated MTU {}", peer, mtu);
        }
    }

    /// Observed only.
    pub fn on_phy_update(&mut self, peer: Option<PeerHandle>, tx_phy: u8, rx_phy: u8) {
        if let Some(peer) = self.serving_peer(peer, "PHY update") {
            debug!("{} PHY updated: tx {} rx {}", peer, tx_phy, rx_phy);
        }
    }

    /// Observed only.
    pub fn on_phy_read(&mut self, peer: Option<PeerHandle>, tx_phy: u8, rx_phy: u8) {
        if let Some(peer) = self.serving_peer(peer, "PHY read") {
            debug!("{} PHY read: tx {} rx {}", peer, tx_phy, rx_phy);
        }
    }

    /// Observed only; this service never notifies.
    pub fn on_notification_sent(&mut self, peer: Option<PeerHandle>, status: u8) {
        if let Some(peer) = self.serving_peer(peer, "notification sent") {
            debug!("{} notification sent with status {}", peer, status);
        }
    }

    /// A signal-strength sample completed for `peer`. Samples arriving after
    /// the peer's latch was torn down are dropped.
    pub fn on_signal_strength(&mut self, peer: Option<PeerHandle>, dbm: i8) {
        let peer = match self.serving_peer(peer, "signal strength") {
            Some(peer) => peer,
            None => return,
        };
        if self.latches.record(peer, dbm) {
            debug!("{} signal strength latched at {} dBm", peer, dbm);
        } else {
            debug!("{} signal sample arrived after latch teardown, dropping", peer);
        }
    }

    /// Guard shared by every event handler: events are ignored unless the
    /// server is serving and the transport reported a peer handle. This
    /// covers the race between transport callback registration and handle
    /// availability.
    fn serving_peer(&self, peer: Option<PeerHandle>, event: &'static str) -> Option<PeerHandle> {
        if self.state != ServerState::Serving {
            debug!("Ignoring {} event while {:?}", event, self.state);
            return None;
        }
        match peer {
            Some(peer) => Some(peer),
            None => {
                debug!("Ignoring {} event without a peer handle", event);
                None
            }
        }
    }

    /// Build the exchange record for a completed write and hand it to the
    /// sink. Constructed fresh per exchange and not retained.
    fn deliver(&mut self, peer: PeerHandle, bytes: Vec<u8>) {
        let record = RemoteExchangeRecord {
            identifier: BeaconIdentifier::new(bytes, PROTOCOL_VERSION),
            signal_dbm: self.latches.latest(peer),
            source: ExchangeSource::ConnectionIncoming,
        };
        debug!("{} completed an exchange: {}", peer, record);
        self.sink.on_remote_identifier_exchanged(record);
    }

    fn respond(
        &mut self,
        peer: PeerHandle,
        request_id: u32,
        status: ResponseStatus,
        payload: Option<Vec<u8>>,
    ) {
        if let Some(transport) = self.transport.as_mut() {
            transport.send_response(peer, request_id, status, payload);
        }
    }
}
