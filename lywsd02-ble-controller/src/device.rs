//! Seams between the sync logic and the BLE stack
//!
//! `ble` implements these with btleplug; tests use in-memory fakes.

use std::future::Future;

use uuid::Uuid;

/// A peripheral the sync can connect to and write characteristics on
pub trait GattDevice {
    /// Error type for BLE operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Device address, uppercased
    fn address(&self) -> String;

    /// Open the link and discover services
    fn connect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the link. Must be safe to call on a link that never fully opened.
    fn disconnect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write `payload` to `characteristic`, waiting for the device to acknowledge
    fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Turns an address into a device handle
pub trait DeviceResolver {
    type Device: GattDevice;
    type Error: std::error::Error + Send + Sync + 'static;

    /// `Ok(None)` when no connectable device with this address is known
    fn resolve(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<Self::Device>, Self::Error>> + Send;
}
