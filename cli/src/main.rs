// beaconpass — proximity beacon exchange demo CLI
//
// Drives the identifier exchange server against a simulated in-process
// transport so the protocol can be exercised end to end without BLE
// hardware.

use anyhow::{bail, Result};
use beaconpass_core::{
    BeaconIdentifier, CharacteristicDefinition, ExchangeSink, IdentifierExchangeServer,
    IdentifierSource, LifecycleObserver, LinkState, PeerHandle, RemoteExchangeRecord,
    ResponseStatus, ServerTransport, ServiceDefinition, SignalStrengthSource,
    EXCHANGE_CHARACTERISTIC_UUID, EXCHANGE_SERVICE_UUID, PROTOCOL_VERSION,
    TRANSPORT_STATUS_SUCCESS,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Parser)]
#[command(name = "beaconpass")]
#[command(about = "BeaconPass — proximity beacon exchange demo", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a full exchange session against the local server
    Exchange {
        /// Local identifier payload (hex)
        #[arg(long, default_value = "a1b2c3d4e5f6")]
        local: String,
        /// Identifier the simulated peer writes to us (hex)
        #[arg(long, default_value = "0011223344556677")]
        remote: String,
        /// Fragment size used for the simulated reads and long write
        #[arg(short, long, default_value = "4")]
        fragment_size: usize,
        /// Signal strength the simulated sampler reports, in dBm
        #[arg(short, long, default_value = "-63", allow_hyphen_values = true)]
        rssi: i8,
    },
    /// Print the service and characteristic the server registers
    Service,
}

struct ConsoleTransport;

impl ServerTransport for ConsoleTransport {
    fn add_characteristic(&mut self, characteristic: &CharacteristicDefinition) -> bool {
        println!(
            "{} characteristic {:#034x} (read: {}, write: {})",
            "registered".green(),
            characteristic.uuid,
            characteristic.readable,
            characteristic.writable
        );
        true
    }

    fn add_service(&mut self, service: &ServiceDefinition) -> bool {
        println!("{} service {:#034x}", "registered".green(), service.uuid);
        true
    }

    fn send_response(
        &mut self,
        peer: PeerHandle,
        request_id: u32,
        status: ResponseStatus,
        payload: Option<Vec<u8>>,
    ) {
        let status_text = match status {
            ResponseStatus::Success => "Success".green(),
            ResponseStatus::ReadNotPermitted => "ReadNotPermitted".red(),
            ResponseStatus::WriteNotPermitted => "WriteNotPermitted".red(),
        };
        match payload {
            Some(bytes) => println!(
                "  {} #{} to {}: {} [{}]",
                "response".cyan(),
                request_id,
                peer,
                status_text,
                hex::encode(bytes)
            ),
            None => println!(
                "  {} #{} to {}: {}",
                "response".cyan(),
                request_id,
                peer,
                status_text
            ),
        }
    }

    fn release(&mut self) {
        println!("{} transport handle", "released".yellow());
    }
}

struct StaticIdentifier(BeaconIdentifier);

impl IdentifierSource for StaticIdentifier {
    fn current_local_identifier(&self) -> Option<BeaconIdentifier> {
        Some(self.0.clone())
    }
}

struct ConsoleSink(Arc<Mutex<Vec<RemoteExchangeRecord>>>);

impl ExchangeSink for ConsoleSink {
    fn on_remote_identifier_exchanged(&mut self, record: RemoteExchangeRecord) {
        println!("{} {}", "exchanged".magenta().bold(), record);
        self.0.lock().expect("record log").push(record);
    }
}

struct ConsoleSampler;

impl SignalStrengthSource for ConsoleSampler {
    fn request(&mut self, peer: PeerHandle) {
        println!("  {} signal sample for {}", "requested".cyan(), peer);
    }

    fn cancel(&mut self, peer: PeerHandle) {
        println!("  {} signal sample for {}", "cancelled".yellow(), peer);
    }
}

struct ConsoleStarter;

impl LifecycleObserver for ConsoleStarter {
    fn on_server_started(&mut self) {
        println!("{}", "server operational".green().bold());
    }

    fn on_server_failed(&mut self, status: u8) {
        println!("{} (status {})", "server failed".red().bold(), status);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Exchange {
            local,
            remote,
            fragment_size,
            rssi,
        } => run_exchange(&local, &remote, fragment_size, rssi),
        Commands::Service => {
            let service = ServiceDefinition::exchange();
            println!("service        {:#034x}", service.uuid);
            for characteristic in &service.characteristics {
                println!(
                    "characteristic {:#034x} (read: {}, write: {})",
                    characteristic.uuid, characteristic.readable, characteristic.writable
                );
            }
            println!("protocol       v{}", PROTOCOL_VERSION);
            Ok(())
        }
    }
}

fn run_exchange(local: &str, remote: &str, fragment_size: usize, rssi: i8) -> Result<()> {
    if fragment_size == 0 {
        bail!("fragment size must be at least 1");
    }
    let local_bytes = match hex::decode(local) {
        Ok(bytes) => bytes,
        Err(err) => bail!("invalid --local hex: {}", err),
    };
    let remote_bytes = match hex::decode(remote) {
        Ok(bytes) => bytes,
        Err(err) => bail!("invalid --remote hex: {}", err),
    };

    let records = Arc::new(Mutex::new(Vec::new()));
    let mut server = IdentifierExchangeServer::new(
        Box::new(StaticIdentifier(BeaconIdentifier::new(
            local_bytes.clone(),
            PROTOCOL_VERSION,
        ))),
        Box::new(ConsoleSink(records.clone())),
        Box::new(ConsoleSampler),
        Box::new(ConsoleStarter),
    );

    println!("{}", "starting exchange server".bold());
    server.initialize(|| Some(ConsoleTransport))?;
    server.on_service_added(EXCHANGE_SERVICE_UUID, TRANSPORT_STATUS_SUCCESS);

    let peer = PeerHandle(1);
    println!("\n{} {}", peer, "connects".bold());
    server.on_connection_state_changed(Some(peer), LinkState::Connected);
    server.on_signal_strength(Some(peer), rssi);

    println!("\n{} reads our identifier in {}-byte slices", peer, fragment_size);
    let mut request_id = 1;
    let mut offset = 0;
    while offset < local_bytes.len() {
        server.on_characteristic_read_request(
            Some(peer),
            request_id,
            EXCHANGE_CHARACTERISTIC_UUID,
            offset,
        );
        request_id += 1;
        offset += fragment_size;
    }

    println!("\n{} long-writes its identifier ({} bytes)", peer, remote_bytes.len());
    for chunk_start in (0..remote_bytes.len()).step_by(fragment_size) {
        let chunk_end = (chunk_start + fragment_size).min(remote_bytes.len());
        server.on_characteristic_write_request(
            Some(peer),
            request_id,
            EXCHANGE_CHARACTERISTIC_UUID,
            &remote_bytes[chunk_start..chunk_end],
            chunk_start,
            true,
            true,
        );
        request_id += 1;
    }
    server.on_execute_write(Some(peer), request_id, true);

    println!("\n{} {}", peer, "disconnects".bold());
    server.on_connection_state_changed(Some(peer), LinkState::Disconnected);
    server.close();

    let records = records.lock().expect("record log");
    info!("Session finished with {} completed exchange(s)", records.len());
    if records.is_empty() {
        bail!("no exchange completed");
    }
    Ok(())
}
