//! Clock sync tool for LYWSD02 sensors
//!
//! Sets the clock, timezone offset and display preferences over BLE.
//!
//! Usage:
//!   lywsd02-ble set-time --mac E7:2E:00:12:34:56 --tz-offset 1 --temp-mode C
//!   lywsd02-ble call set_time '{"mac": "E7:2E:00:12:34:56", "clock_mode": 24}'
//!
//! Set LYWSD02_ADAPTER to pick an adapter whose info contains that string.

use clap::{Parser, Subcommand};
use log::error;
use lywsd02_ble_controller::service::SET_TIME;
use lywsd02_ble_controller::{
    DEFAULT_TIMEOUT_SECS, ServiceError, ServiceRegistry, SetTimeInput, SyncRequest, ble,
    register_set_time,
};
use std::sync::Arc;
use std::time::Duration;

const ADAPTER_ENV: &str = "LYWSD02_ADAPTER";

#[derive(Parser)]
#[command(name = "lywsd02-ble")]
#[command(about = "Set the clock and display preferences of LYWSD02 sensors")]
struct Cli {
    /// How long to scan for a device that is not known to the adapter yet, in seconds
    #[arg(long, default_value = "10", global = true)]
    scan_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the clock, and optionally the temperature unit and clock mode
    SetTime {
        /// Device address, e.g. E7:2E:00:12:34:56
        #[arg(short, long)]
        mac: String,
        /// Timezone offset in hours
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        tz_offset: i64,
        /// Temperature unit: C or F
        #[arg(long)]
        temp_mode: Option<String>,
        /// Clock display mode: 12 or 24
        #[arg(long)]
        clock_mode: Option<i64>,
        /// Epoch seconds to send instead of the local clock
        #[arg(long)]
        timestamp: Option<i64>,
        /// Connection timeout in seconds
        #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Invoke an operation with raw JSON service data
    Call {
        /// Operation name, e.g. set_time
        service: String,
        /// JSON object with the operation's fields
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let cli = Cli::parse();

    let (service, data) = match cli.command {
        Commands::SetTime {
            mac,
            tz_offset,
            temp_mode,
            clock_mode,
            timestamp,
            timeout,
        } => {
            let input = SetTimeInput {
                mac: Some(mac),
                tz_offset: Some(tz_offset),
                temp_mode,
                clock_mode,
                timestamp,
                timeout: Some(timeout),
            };
            // fail before touching the adapter
            SyncRequest::try_from(input.clone())?;
            (SET_TIME.to_string(), serde_json::to_value(input)?)
        }
        Commands::Call { service, data } => (service, serde_json::from_str(&data)?),
    };

    let adapter_filter = std::env::var(ADAPTER_ENV).ok();
    let adapter = ble::get_adapter(adapter_filter.as_deref()).await?;
    let resolver = ble::AdapterResolver::new(adapter, Duration::from_secs(cli.scan_secs));

    let mut registry = ServiceRegistry::new();
    register_set_time(&mut registry, Arc::new(resolver));

    if let Err(e) = registry.call(&service, data).await {
        // sync failures are already logged by the operation
        if !matches!(e, ServiceError::Sync(_)) {
            error!("{e}");
        }
        std::process::exit(1);
    }

    Ok(())
}
