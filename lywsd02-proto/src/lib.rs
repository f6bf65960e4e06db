//! LYWSD02 wire protocol - settings payloads and their encoding

pub mod ble;

use ble::modes;

/// Errors raised while packing a value into a payload field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("timestamp {0} does not fit in an unsigned 32-bit field")]
    TimestampOutOfRange(i64),
    #[error("timezone offset {0}h does not fit in a signed byte")]
    OffsetOutOfRange(i64),
    #[error("{what} payload too short: expected {expected} bytes, got {got}")]
    Truncated {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Temperature unit shown on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Parse the "C" / "F" code, ignoring case. Anything else means "not set".
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "C" => Some(Self::Celsius),
            "F" => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Celsius => modes::CELSIUS,
            Self::Fahrenheit => modes::FAHRENHEIT,
        }
    }
}

/// 12h / 24h clock display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    H12,
    H24,
}

impl ClockMode {
    /// Only 12 and 24 are recognised; any other value (0 included) means "not set".
    pub fn from_hours(hours: i64) -> Option<Self> {
        match hours {
            12 => Some(Self::H12),
            24 => Some(Self::H24),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::H12 => modes::CLOCK_12H,
            Self::H24 => modes::CLOCK_24H,
        }
    }
}

/// Clock payload: u32 LE timestamp followed by i8 timezone offset in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPayload {
    pub timestamp: u32,
    pub tz_offset_hours: i8,
}

impl ClockPayload {
    pub const LEN: usize = 5;

    pub fn new(timestamp: i64, tz_offset_hours: i64) -> Result<Self, EncodingError> {
        let timestamp = u32::try_from(timestamp)
            .map_err(|_| EncodingError::TimestampOutOfRange(timestamp))?;
        let tz_offset_hours = i8::try_from(tz_offset_hours)
            .map_err(|_| EncodingError::OffsetOutOfRange(tz_offset_hours))?;
        Ok(Self {
            timestamp,
            tz_offset_hours,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4] = self.tz_offset_hours as u8;
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() < Self::LEN {
            return Err(EncodingError::Truncated {
                what: "clock",
                expected: Self::LEN,
                got: data.len(),
            });
        }
        Ok(Self {
            timestamp: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            tz_offset_hours: data[4] as i8,
        })
    }
}

/// Temperature unit payload: a single mode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureUnitPayload {
    pub unit: TemperatureUnit,
}

impl TemperatureUnitPayload {
    pub fn to_bytes(&self) -> [u8; 1] {
        [self.unit.as_byte()]
    }
}

/// Clock mode payload: 4 zero bytes, 2 zero bytes, then the mode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockModePayload {
    pub mode: ClockMode,
}

impl ClockModePayload {
    pub const LEN: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[6] = self.mode.as_byte();
        buf
    }
}

pub fn encode_clock(
    timestamp: i64,
    tz_offset_hours: i64,
) -> Result<[u8; ClockPayload::LEN], EncodingError> {
    Ok(ClockPayload::new(timestamp, tz_offset_hours)?.to_bytes())
}

pub fn encode_temperature_unit(unit: Option<TemperatureUnit>) -> Option<[u8; 1]> {
    unit.map(|unit| TemperatureUnitPayload { unit }.to_bytes())
}

pub fn encode_clock_mode(mode: Option<ClockMode>) -> Option<[u8; ClockModePayload::LEN]> {
    mode.map(|mode| ClockModePayload { mode }.to_bytes())
}
