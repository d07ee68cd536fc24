// BeaconPass Core — proximity beacon exchange
//
// One device exposes a single read/write GATT characteristic; nearby peers
// read the local beacon identifier through it and write their own back,
// optionally split across prepared writes. Each completed exchange reaches
// the aggregation sink exactly once, tagged with the signal strength sampled
// for that peer's connection.

pub mod gatt;
pub mod identifier;

pub use gatt::{
    CharacteristicDefinition, IdentifierExchangeServer, LatchTable, LifecycleObserver, LinkState,
    PeerHandle, PendingWriteBuffer, ReassemblyError, ResponseStatus, ServerState, ServerTransport,
    ServiceDefinition, SignalStrengthLatch, SignalStrengthSource, StartError, WriteReassemblyTable,
    EXCHANGE_CHARACTERISTIC_UUID, EXCHANGE_SERVICE_UUID, MAX_PENDING_WRITE_BYTES,
    TRANSPORT_STATUS_SUCCESS,
};
pub use identifier::{
    BeaconIdentifier, ExchangeSink, ExchangeSource, IdentifierSource, RemoteExchangeRecord,
    PROTOCOL_VERSION,
};
