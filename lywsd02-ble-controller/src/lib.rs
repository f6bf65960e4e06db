//! LYWSD02 BLE Controller
//!
//! Sets the clock, timezone offset, temperature unit and 12h/24h display mode
//! of a LYWSD02 clock over BLE.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use lywsd02_ble_controller::{SyncRequest, TemperatureUnit, ble, sync};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::get_adapter(None).await?;
//!     let resolver = ble::AdapterResolver::new(adapter, Duration::from_secs(10));
//!
//!     let request = SyncRequest::new("e7:2e:00:12:34:56")?
//!         .with_tz_offset(1)
//!         .with_temperature_unit(TemperatureUnit::Celsius);
//!
//!     let report = sync(&resolver, &request).await?;
//!     println!("clock set to {}", report.timestamp);
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod device;
mod request;
pub mod service;
mod sync;
mod timestamp;

#[cfg(test)]
mod fake;

pub use device::{DeviceResolver, GattDevice};
pub use lywsd02_proto::{ClockMode, EncodingError, TemperatureUnit};
pub use request::{DEFAULT_TIMEOUT_SECS, SetTimeInput, SyncRequest, ValidationError};
pub use service::{ServiceError, ServiceRegistry, register_set_time};
pub use sync::{
    BoxError, ErrorKind, LinkError, Step, SyncError, SyncPlan, SyncReport, run_plan, sync,
};
pub use timestamp::{compute_timestamp, local_wall_clock_seconds};
