// For now, this only has information about the firmware,
// not the firmware itself.

// Keep these in sync with the peripheral firmware.

use uuid::Uuid;

pub const MAIN_SERVICE_UUID: Uuid = Uuid::from_u128(0x00000000_0001_11e1_9ab4_0002a5d5c51b);
pub const MAIN_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00e00000_0001_11e1_ac36_0002a5d5c51b);

pub const DEVICE_NAME: &str = "NanoPaint";

/// Number of sensor lanes in one frame.
pub const CHANNEL_COUNT: usize = 16;

/// Reference resistances in ohms, indexed by the top nibble of a raw sample.
pub const RESISTANCE_TABLE: [f64; 16] = [
    100.0, 337.7, 510.0, 836.1, 1000.0, 3337.0, 5100.0, 8485.0, 10000.0, 35897.0, 56000.0,
    82456.0, 10000.0, 319729.0, 470000.0, 1000000.0,
];

pub const REFERENCE_VOLTAGE: f64 = 3.3;
pub const ADC_FULL_SCALE: f64 = 4095.0;
pub const SERIES_OFFSET_OHMS: f64 = 130.0;

pub const DEFAULT_SAMPLE_RATE: u16 = 1000;
