//! Sync requests: the raw service record and its validated form

use std::time::Duration;

use lywsd02_proto::{ClockMode, TemperatureUnit};
use serde::Deserialize;
use serde_json::Value as JsonValue;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the 'mac' parameter is missing")]
    MissingAddress,
    #[error("timeout must be at least one second")]
    ZeroTimeout,
}

/// Raw `set_time` record as handed over by the host
///
/// Every field is optional on the wire; unknown keys are ignored.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SetTimeInput {
    pub mac: Option<String>,
    pub tz_offset: Option<i64>,
    pub temp_mode: Option<String>,
    /// Whole numbers only; anything else reads as "not set"
    #[serde(default, deserialize_with = "whole_number")]
    pub clock_mode: Option<i64>,
    pub timestamp: Option<i64>,
    pub timeout: Option<u64>,
}

/// `24` and `24.0` give `Some(24)`; strings, fractions and other types give `None`
fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    })
}

/// A validated request to set a device's clock and display preferences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Uppercased BLE address, never empty
    pub address: String,
    /// Caller-supplied epoch seconds; `None` or `Some(0)` means "use the local clock"
    pub timestamp_override: Option<i64>,
    pub tz_offset_hours: i64,
    pub temperature_unit: Option<TemperatureUnit>,
    pub clock_mode: Option<ClockMode>,
    pub connect_timeout: Duration,
}

impl SyncRequest {
    pub fn new(address: &str) -> Result<Self, ValidationError> {
        let address = address.trim().to_uppercase();
        if address.is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        Ok(Self {
            address,
            timestamp_override: None,
            tz_offset_hours: 0,
            temperature_unit: None,
            clock_mode: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp_override = Some(timestamp);
        self
    }

    pub fn with_tz_offset(mut self, hours: i64) -> Self {
        self.tz_offset_hours = hours;
        self
    }

    pub fn with_temperature_unit(mut self, unit: TemperatureUnit) -> Self {
        self.temperature_unit = Some(unit);
        self
    }

    pub fn with_clock_mode(mut self, mode: ClockMode) -> Self {
        self.clock_mode = Some(mode);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ValidationError> {
        if timeout.is_zero() {
            return Err(ValidationError::ZeroTimeout);
        }
        self.connect_timeout = timeout;
        Ok(self)
    }
}

impl TryFrom<SetTimeInput> for SyncRequest {
    type Error = ValidationError;

    fn try_from(input: SetTimeInput) -> Result<Self, Self::Error> {
        let timeout = Duration::from_secs(input.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let mut request = SyncRequest::new(input.mac.as_deref().unwrap_or_default())?
            .with_tz_offset(input.tz_offset.unwrap_or(0))
            .with_timeout(timeout)?;

        request.timestamp_override = input.timestamp;
        // unrecognised modes mean "leave as is"
        request.temperature_unit = input
            .temp_mode
            .as_deref()
            .and_then(TemperatureUnit::from_code);
        request.clock_mode = input.clock_mode.and_then(ClockMode::from_hours);
        Ok(request)
    }
}
