//! BLE GATT constants for the LYWSD02 clock service
//!
//! The clock, timezone and clock display mode all share the time
//! characteristic; the temperature unit has its own.

use uuid::Uuid;

/// Time Characteristic UUID (write): clock value and clock display mode
pub const TIME_UUID: Uuid = Uuid::from_u128(0xebe0ccb7_7a0a_4b0c_8a1a_6ff2997da3a6);

/// Temperature Unit Characteristic UUID (write)
pub const TEMPERATURE_UNIT_UUID: Uuid = Uuid::from_u128(0xebe0ccbe_7a0a_4b0c_8a1a_6ff2997da3a6);

/// Mode bytes understood by the device
pub mod modes {
    /// Temperature shown in Fahrenheit
    pub const FAHRENHEIT: u8 = 0x01;

    /// Temperature shown in Celsius
    pub const CELSIUS: u8 = 0xFF;

    /// 12-hour clock display
    pub const CLOCK_12H: u8 = 0xAA;

    /// 24-hour clock display
    pub const CLOCK_24H: u8 = 0x00;
}
