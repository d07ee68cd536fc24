//! GATT server role for the proximity beacon exchange.
//!
//! This module holds the protocol-level state machines behind the single
//! read/write exchange characteristic:
//!
//! - **transport**: the seam to the platform BLE stack, plus the fixed
//!   service and characteristic definitions
//! - **reassembly**: per-peer long-write accumulation with strict offset
//!   validation
//! - **signal**: per-connection signal-strength latches
//! - **server**: the exchange server lifecycle and event dispatch
//!
//! Platform adapters own the actual radio; everything here is testable
//! without BLE hardware.

pub mod reassembly;
pub mod server;
pub mod signal;
pub mod transport;

// Re-export commonly used types
pub use reassembly::{
    PendingWriteBuffer, ReassemblyError, WriteReassemblyTable, MAX_PENDING_WRITE_BYTES,
};

pub use server::{IdentifierExchangeServer, ServerState, StartError};

pub use signal::{LatchTable, SignalStrengthLatch, SignalStrengthSource};

pub use transport::{
    CharacteristicDefinition, LifecycleObserver, LinkState, PeerHandle, ResponseStatus,
    ServerTransport, ServiceDefinition, EXCHANGE_CHARACTERISTIC_UUID, EXCHANGE_SERVICE_UUID,
    TRANSPORT_STATUS_SUCCESS,
};
