use crate::firmware::{
    ADC_FULL_SCALE, DEFAULT_SAMPLE_RATE, REFERENCE_VOLTAGE, RESISTANCE_TABLE, SERIES_OFFSET_OHMS,
};

/// Splits notification payloads into per-channel raw samples.
#[derive(Clone, Debug)]
pub struct Decoder {
    channel_count: usize,
}

impl Decoder {
    pub fn new(channel_count: usize) -> Decoder {
        Self { channel_count }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn decode_frame(&self, payload: &[u8]) -> Vec<u16> {
        decode(payload, self.channel_count)
    }
}

/// Reads `channel_count` little-endian u16 values from the start of `payload`.
///
/// The payload is expected to hold exactly `channel_count * 2` bytes. Extra
/// bytes are ignored, and a short payload yields only the complete samples
/// it contains.
pub fn decode(payload: &[u8], channel_count: usize) -> Vec<u16> {
    payload
        .chunks_exact(2)
        .take(channel_count)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Top nibble of a raw sample: which reference resistor was switched in.
pub fn table_index(raw: u16) -> usize {
    (raw >> 12) as usize
}

/// Bottom 12 bits of a raw sample.
pub fn adc_code(raw: u16) -> u16 {
    raw & 0x0fff
}

/// Converts a raw sample into a sensor resistance in ohms.
///
/// An ADC code of 0 divides by zero and yields a non-finite value. This is
/// left as is; downstream normalization maps it to 0.
pub fn transform(raw: u16) -> f64 {
    let output_voltage = adc_code(raw) as f64 * REFERENCE_VOLTAGE / ADC_FULL_SCALE;
    RESISTANCE_TABLE[table_index(raw)] * (REFERENCE_VOLTAGE - output_voltage) / output_voltage
        - SERIES_OFFSET_OHMS
}

/// Big-endian encoding of a configuration word.
pub fn encode_config(value: u16) -> [u8; 2] {
    [(value >> 8) as u8, value as u8]
}

/// A requested sample rate of 0 stands for the firmware default.
pub fn sample_rate(requested: u16) -> u16 {
    if requested == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        requested
    }
}

#[test]
fn test_decoding() {
    let channel_count = 16;
    let decoder = Decoder::new(channel_count);
    let payload: Vec<u8> = (0..32).collect();

    let frame = decoder.decode_frame(&payload);
    assert_eq!(frame.len(), channel_count);
    for (channel, value) in frame.iter().enumerate() {
        let low = payload[channel * 2] as u16;
        let high = payload[channel * 2 + 1] as u16;
        assert_eq!(*value, high << 8 | low);
    }
}

#[test]
fn test_decoding_ignores_trailing_bytes() {
    let frame = decode(&[0x64, 0x10, 0xff, 0xff, 0x01], 2);
    assert_eq!(frame, vec![0x1064, 0xffff]);
}

#[test]
fn test_decoding_short_payload() {
    assert_eq!(decode(&[0x01, 0x00, 0x02], 16), vec![1]);
}

#[test]
fn test_packed_fields() {
    assert_eq!(table_index(0x1064), 1);
    assert_eq!(adc_code(0x1064), 100);
    assert_eq!(table_index(0xffff), 15);
    assert_eq!(adc_code(0xffff), 4095);
}

#[test]
fn test_transform() {
    let output_voltage = 100.0 * 3.3 / 4095.0;
    let expected = 337.7 * (3.3 - output_voltage) / output_voltage - 130.0;
    assert_eq!(transform(0x1064), expected);
    approx_eq::assert_approx_eq!(transform(0x1064), 13361.115, 1e-6);
}

#[test]
fn test_transform_full_scale() {
    // At full scale there is no voltage drop left across the sensor.
    approx_eq::assert_approx_eq!(transform(0x0fff), -130.0, 1e-9);
    approx_eq::assert_approx_eq!(transform(0xffff), -130.0, 1e-9);
}

#[test]
fn test_transform_zero_code_is_not_finite() {
    assert!(!transform(0x3000).is_finite());
}

#[test]
fn test_transform_is_deterministic() {
    for raw in [0x0001u16, 0x1064, 0x7abc, 0xc800, 0xf001] {
        assert_eq!(transform(raw).to_bits(), transform(raw).to_bits());
    }
}

#[test]
fn test_encode_config() {
    assert_eq!(encode_config(1000), [0x03, 0xe8]);
    assert_eq!(encode_config(0x1234), [0x12, 0x34]);
    assert_eq!(encode_config(0), [0x00, 0x00]);
}

#[test]
fn test_sample_rate() {
    assert_eq!(sample_rate(0), 1000);
    assert_eq!(sample_rate(1), 1);
    assert_eq!(sample_rate(250), 250);
}
