//! btleplug implementation of the device seams
//!
//! Resolves an address to a peripheral on a local adapter and performs the
//! GATT writes.

use btleplug::api::{BDAddr, Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::device::{DeviceResolver, GattDevice};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum BtleError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error(transparent)]
    Btle(#[from] btleplug::Error),
}

/// Get the first Bluetooth adapter, or the first whose info contains `filter`
pub async fn get_adapter(filter: Option<&str>) -> Result<Adapter, BtleError> {
    let manager = Manager::new().await?;
    for adapter in manager.adapters().await? {
        let Some(filter) = filter else {
            return Ok(adapter);
        };
        let info = adapter.adapter_info().await?;
        if info.contains(filter) {
            debug!("using adapter {info}");
            return Ok(adapter);
        }
    }
    Err(BtleError::NoAdapter)
}

fn matches_address(addr: &BDAddr, address: &str) -> bool {
    addr.to_string().eq_ignore_ascii_case(address.trim())
}

/// A peripheral reached through btleplug
#[derive(Debug, Clone)]
pub struct BtleDevice {
    peripheral: Peripheral,
}

impl BtleDevice {
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }
}

impl GattDevice for BtleDevice {
    type Error = BtleError;

    fn address(&self) -> String {
        self.peripheral.address().to_string().to_uppercase()
    }

    async fn connect(&self) -> Result<(), BtleError> {
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BtleError> {
        // unconditional: also cancels a connect that timed out half way
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<(), BtleError> {
        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(BtleError::CharacteristicNotFound(characteristic))?;

        self.peripheral
            .write(&target, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

/// Number of lookups currently waiting on the adapter's scan
///
/// The scan is started by the first waiter and stopped by the last one.
#[derive(Debug, Default)]
struct ScanWaiters(usize);

impl ScanWaiters {
    /// Returns true when the caller is the first waiter and must start the scan
    fn enter(&mut self) -> bool {
        self.0 += 1;
        self.0 == 1
    }

    /// Returns true when the caller was the last waiter and must stop the scan
    fn leave(&mut self) -> bool {
        self.0 = self.0.saturating_sub(1);
        self.0 == 0
    }
}

/// Looks devices up on one adapter, scanning for a bounded window when the
/// address is not known yet
#[derive(Debug, Clone)]
pub struct AdapterResolver {
    adapter: Adapter,
    scan_window: Duration,
    waiters: Arc<Mutex<ScanWaiters>>,
}

impl AdapterResolver {
    pub fn new(adapter: Adapter, scan_window: Duration) -> Self {
        Self {
            adapter,
            scan_window,
            waiters: Arc::default(),
        }
    }

    async fn begin_scan(&self) -> Result<(), BtleError> {
        let mut waiters = self.waiters.lock().await;
        if waiters.enter() {
            // The device does not advertise its clock service, so no filter.
            if let Err(err) = self.adapter.start_scan(ScanFilter::default()).await {
                waiters.leave();
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn end_scan(&self) {
        let mut waiters = self.waiters.lock().await;
        if waiters.leave() {
            if let Err(err) = self.adapter.stop_scan().await {
                warn!("failed to stop scan: {err}");
            }
        }
    }

    async fn known(&self, address: &str) -> Result<Option<Peripheral>, BtleError> {
        Ok(self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| matches_address(&p.address(), address)))
    }

    async fn wait_for(&self, address: &str) -> Result<Option<Peripheral>, BtleError> {
        let deadline = Instant::now() + self.scan_window;
        loop {
            if let Some(peripheral) = self.known(address).await? {
                return Ok(Some(peripheral));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

impl DeviceResolver for AdapterResolver {
    type Device = BtleDevice;
    type Error = BtleError;

    async fn resolve(&self, address: &str) -> Result<Option<BtleDevice>, BtleError> {
        if let Some(peripheral) = self.known(address).await? {
            return Ok(Some(BtleDevice::new(peripheral)));
        }

        debug!("'{address}' not seen yet, scanning for {:?}", self.scan_window);
        self.begin_scan().await?;
        let found = self.wait_for(address).await;
        self.end_scan().await;

        Ok(found?.map(BtleDevice::new))
    }
}
