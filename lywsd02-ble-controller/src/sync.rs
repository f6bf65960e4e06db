//! Write sequence: connect, write clock / temperature unit / clock mode, disconnect
//!
//! Writes for one request run strictly in order over a single connection and
//! stop at the first failure. The link is closed on every exit path before
//! the result is returned.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use lywsd02_proto::ble::{TEMPERATURE_UNIT_UUID, TIME_UUID};
use lywsd02_proto::{ClockModePayload, ClockPayload, EncodingError, TemperatureUnitPayload};

use crate::device::{DeviceResolver, GattDevice};
use crate::request::{SyncRequest, ValidationError};
use crate::timestamp::compute_timestamp;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stage of the sequence, used to report where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Clock,
    TemperatureUnit,
    ClockMode,
}

impl Step {
    pub fn index(self) -> usize {
        match self {
            Step::Connect => 0,
            Step::Clock => 1,
            Step::TemperatureUnit => 2,
            Step::ClockMode => 3,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Connect => "connect",
            Step::Clock => "clock",
            Step::TemperatureUnit => "temperature unit",
            Step::ClockMode => "clock mode",
        })
    }
}

/// Failure of a single link operation
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Device(BoxError),
}

/// Coarse error classes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Encoding,
    Connection,
    Write,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to encode payload: {0}")]
    Encoding(#[from] EncodingError),
    #[error("could not find '{0}'")]
    NotFound(String),
    #[error("failed to look up '{address}': {source}")]
    Resolve { address: String, source: BoxError },
    #[error("failed to connect to '{address}': {source}")]
    Connection { address: String, source: LinkError },
    #[error("{step} write to '{address}' failed: {source}")]
    Write {
        address: String,
        step: Step,
        source: LinkError,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Encoding(_) => ErrorKind::Encoding,
            SyncError::NotFound(_) | SyncError::Resolve { .. } | SyncError::Connection { .. } => {
                ErrorKind::Connection
            }
            SyncError::Write { .. } => ErrorKind::Write,
        }
    }

    /// The step that failed, if the failure happened on the link
    pub fn step(&self) -> Option<Step> {
        match self {
            SyncError::Connection { .. } => Some(Step::Connect),
            SyncError::Write { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Encoded payloads for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub clock: ClockPayload,
    pub temperature_unit: Option<TemperatureUnitPayload>,
    pub clock_mode: Option<ClockModePayload>,
    /// Recompute the clock value once connected
    pub restamp: bool,
}

impl SyncPlan {
    pub fn build(request: &SyncRequest, timestamp: i64) -> Result<Self, EncodingError> {
        Ok(Self {
            clock: ClockPayload::new(timestamp, request.tz_offset_hours)?,
            temperature_unit: request
                .temperature_unit
                .map(|unit| TemperatureUnitPayload { unit }),
            clock_mode: request.clock_mode.map(|mode| ClockModePayload { mode }),
            restamp: !matches!(request.timestamp_override, Some(ts) if ts != 0),
        })
    }

    /// Ordered writes: clock, then temperature unit, then clock mode.
    /// Clock mode goes to the time characteristic, same as the clock.
    pub fn writes(&self) -> Vec<(Step, Uuid, Vec<u8>)> {
        let mut writes = vec![(Step::Clock, TIME_UUID, self.clock.to_bytes().to_vec())];
        if let Some(payload) = &self.temperature_unit {
            writes.push((
                Step::TemperatureUnit,
                TEMPERATURE_UNIT_UUID,
                payload.to_bytes().to_vec(),
            ));
        }
        if let Some(payload) = &self.clock_mode {
            writes.push((Step::ClockMode, TIME_UUID, payload.to_bytes().to_vec()));
        }
        writes
    }
}

/// Outcome of a successful sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub address: String,
    pub timestamp: u32,
    pub tz_offset_hours: i8,
    pub writes: usize,
}

/// Resolve the device for `request` and apply it.
pub async fn sync<R: DeviceResolver>(
    resolver: &R,
    request: &SyncRequest,
) -> Result<SyncReport, SyncError> {
    let mut plan = SyncPlan::build(request, compute_timestamp(request.timestamp_override))?;

    let device = resolver
        .resolve(&request.address)
        .await
        .map_err(|e| SyncError::Resolve {
            address: request.address.clone(),
            source: Box::new(e),
        })?
        .ok_or_else(|| SyncError::NotFound(request.address.clone()))?;

    info!("Found '{}' - Attempting to update time.", device.address());

    run_plan(&device, &mut plan, request.connect_timeout).await
}

/// Open a connection to `device`, run every write in `plan`, and close it again.
///
/// The connection is released before returning, whatever the outcome.
/// Disconnect errors are logged and never replace the primary result.
pub async fn run_plan<D: GattDevice>(
    device: &D,
    plan: &mut SyncPlan,
    timeout: Duration,
) -> Result<SyncReport, SyncError> {
    let address = device.address();

    debug!("connecting to '{address}' (timeout {timeout:?})");
    if let Err(source) = bounded(timeout, device.connect()).await {
        // a timed out connect may have left the link half open
        release(device, &address).await;
        return Err(SyncError::Connection { address, source });
    }

    let result = write_plan(device, &address, plan, timeout).await;
    release(device, &address).await;
    result
}

async fn write_plan<D: GattDevice>(
    device: &D,
    address: &str,
    plan: &mut SyncPlan,
    timeout: Duration,
) -> Result<SyncReport, SyncError> {
    if plan.restamp {
        plan.clock = ClockPayload::new(
            compute_timestamp(None),
            i64::from(plan.clock.tz_offset_hours),
        )?;
    }

    let writes = plan.writes();
    for (step, characteristic, payload) in &writes {
        debug!("writing {step} to {characteristic}: {payload:02x?}");
        bounded(timeout, device.write(*characteristic, payload))
            .await
            .map_err(|source| SyncError::Write {
                address: address.to_string(),
                step: *step,
                source,
            })?;
    }

    Ok(SyncReport {
        address: address.to_string(),
        timestamp: plan.clock.timestamp,
        tz_offset_hours: plan.clock.tz_offset_hours,
        writes: writes.len(),
    })
}

async fn bounded<F, E>(timeout: Duration, op: F) -> Result<(), LinkError>
where
    F: Future<Output = Result<(), E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(LinkError::Device(Box::new(e))),
        Err(_) => Err(LinkError::Timeout(timeout)),
    }
}

async fn release<D: GattDevice>(device: &D, address: &str) {
    debug!("disconnecting from '{address}'");
    if let Err(err) = device.disconnect().await {
        warn!("failed to disconnect from '{address}': {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Event, FakeDevice, FakeResolver};
    use lywsd02_proto::{ClockMode, TemperatureUnit};

    const MAC: &str = "AA:BB:CC:DD:EE:FF";
    const CLOCK_BYTES: [u8; 5] = [0x00, 0xF1, 0x53, 0x65, 0x02];

    fn request() -> SyncRequest {
        SyncRequest::new(MAC)
            .unwrap()
            .with_timestamp(1_700_000_000)
            .with_tz_offset(2)
    }

    #[tokio::test]
    async fn clock_only() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());

        let report = sync(&resolver, &request()).await.unwrap();

        assert_eq!(report.writes, 1);
        assert_eq!(report.timestamp, 1_700_000_000);
        assert_eq!(report.tz_offset_hours, 2);
        assert_eq!(
            device.events(),
            vec![
                Event::Connect,
                Event::Write(TIME_UUID, CLOCK_BYTES.to_vec()),
                Event::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn clock_then_temperature_unit() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_temperature_unit(TemperatureUnit::Fahrenheit);

        sync(&resolver, &request).await.unwrap();

        assert_eq!(
            device.writes(),
            vec![
                (TIME_UUID, CLOCK_BYTES.to_vec()),
                (TEMPERATURE_UNIT_UUID, vec![0x01]),
            ]
        );
    }

    #[tokio::test]
    async fn clock_mode_goes_to_time_characteristic() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_clock_mode(ClockMode::H24);

        sync(&resolver, &request).await.unwrap();

        assert_eq!(
            device.writes(),
            vec![(TIME_UUID, CLOCK_BYTES.to_vec()), (TIME_UUID, vec![0; 7])]
        );
    }

    #[tokio::test]
    async fn full_sequence_order() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = request()
            .with_temperature_unit(TemperatureUnit::Celsius)
            .with_clock_mode(ClockMode::H12);

        let report = sync(&resolver, &request).await.unwrap();

        assert_eq!(report.writes, 3);
        assert_eq!(
            device.events(),
            vec![
                Event::Connect,
                Event::Write(TIME_UUID, CLOCK_BYTES.to_vec()),
                Event::Write(TEMPERATURE_UNIT_UUID, vec![0xFF]),
                Event::Write(TIME_UUID, vec![0, 0, 0, 0, 0, 0, 0xAA]),
                Event::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn repeated_sync_is_identical() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_clock_mode(ClockMode::H12);

        sync(&resolver, &request).await.unwrap();
        let first = device.writes();
        device.clear();
        sync(&resolver, &request).await.unwrap();

        assert_eq!(device.writes(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_releases_and_writes_nothing() {
        let device = FakeDevice::new(MAC).with_connect_delay(Duration::from_secs(120));
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_timeout(Duration::from_secs(60)).unwrap();

        let err = sync(&resolver, &request).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Connection {
                source: LinkError::Timeout(_),
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.step(), Some(Step::Connect));
        assert!(device.writes().is_empty());
        assert_eq!(device.events().last(), Some(&Event::Disconnect));
    }

    #[tokio::test]
    async fn connect_refused() {
        let device = FakeDevice::new(MAC).refuse_connect();
        let resolver = FakeResolver::with(device.clone());

        let err = sync(&resolver, &request()).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Connection {
                source: LinkError::Device(_),
                ..
            }
        ));
        assert!(device.writes().is_empty());
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn failed_write_aborts_the_rest_and_disconnects() {
        let device = FakeDevice::new(MAC).fail_writes_to(TEMPERATURE_UNIT_UUID);
        let resolver = FakeResolver::with(device.clone());
        let request = request()
            .with_temperature_unit(TemperatureUnit::Celsius)
            .with_clock_mode(ClockMode::H24);

        let err = sync(&resolver, &request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(err.step(), Some(Step::TemperatureUnit));
        assert_eq!(err.step().map(Step::index), Some(2));
        assert_eq!(device.writes(), vec![(TIME_UUID, CLOCK_BYTES.to_vec())]);
        assert_eq!(device.events().last(), Some(&Event::Disconnect));
        assert!(!device.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let device = FakeDevice::new(MAC).with_write_delay(Duration::from_secs(30));
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_timeout(Duration::from_secs(5)).unwrap();

        let err = sync(&resolver, &request).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Write {
                step: Step::Clock,
                source: LinkError::Timeout(_),
                ..
            }
        ));
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn disconnect_error_does_not_mask_success() {
        let device = FakeDevice::new(MAC).fail_disconnect();
        let resolver = FakeResolver::with(device.clone());

        assert!(sync(&resolver, &request()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_device_never_connects() {
        let resolver = FakeResolver::empty();

        let err = sync(&resolver, &request()).await.unwrap_err();

        assert!(matches!(err, SyncError::NotFound(ref mac) if mac == MAC));
        assert_eq!(err.step(), None);
    }

    #[tokio::test]
    async fn resolver_failure_is_a_connection_error() {
        let err = sync(&FakeResolver::broken(), &request()).await.unwrap_err();

        assert!(matches!(err, SyncError::Resolve { .. }));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn encoding_error_before_connect() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = request().with_tz_offset(200);

        let err = sync(&resolver, &request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert!(device.events().is_empty());
    }

    #[tokio::test]
    async fn missing_override_is_restamped() {
        let device = FakeDevice::new(MAC);
        let resolver = FakeResolver::with(device.clone());
        let request = SyncRequest::new(MAC).unwrap();

        let report = sync(&resolver, &request).await.unwrap();

        let written = ClockPayload::from_bytes(&device.writes()[0].1).unwrap();
        assert_eq!(written.timestamp, report.timestamp);
        assert_eq!(written.tz_offset_hours, 0);
        assert!(report.timestamp > 1_700_000_000);
    }

    #[test]
    fn plan_for_zero_override_restamps() {
        let request = SyncRequest::new(MAC).unwrap().with_timestamp(0);
        let plan = SyncPlan::build(&request, 1_000).unwrap();
        assert!(plan.restamp);

        let plan = SyncPlan::build(&request.with_timestamp(1_000), 1_000).unwrap();
        assert!(!plan.restamp);
        assert_eq!(plan.writes().len(), 1);
    }
}
