use crate::calibration::{Calibrator, Domain};
use crate::events::Event;
use crate::protocol::{self, Decoder};

/// One decoded frame in all four representations, in channel order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reading {
    pub raw: Vec<u16>,
    pub normalized_raw: Vec<f64>,
    pub values: Vec<f64>,
    pub normalized_values: Vec<f64>,
}

impl Reading {
    pub fn into_events(self) -> Vec<Event> {
        vec![
            Event::RawValues {
                values: self.raw.iter().map(|&raw| raw as f64).collect(),
            },
            Event::NormalizedRawValues {
                values: self.normalized_raw,
            },
            Event::Values {
                values: self.values,
            },
            Event::NormalizedValues {
                values: self.normalized_values,
            },
        ]
    }
}

/// Turns sensor notifications into readings. Calibration state lives as
/// long as the pipeline does.
#[derive(Clone, Debug)]
pub struct SensorPipeline {
    decoder: Decoder,
    calibrator: Calibrator,
}

impl SensorPipeline {
    pub fn new(channel_count: usize) -> Self {
        Self {
            decoder: Decoder::new(channel_count),
            calibrator: Calibrator::new(channel_count),
        }
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn read(&mut self, payload: &[u8]) -> Reading {
        let raw = self.decoder.decode_frame(payload);
        let mut reading = Reading {
            normalized_raw: Vec::with_capacity(raw.len()),
            values: Vec::with_capacity(raw.len()),
            normalized_values: Vec::with_capacity(raw.len()),
            ..Default::default()
        };

        for (channel, &sample) in raw.iter().enumerate() {
            let normalized = self.calibrator.observe(channel, Domain::Raw, sample as f64);
            let value = protocol::transform(sample);
            let normalized_value = self.calibrator.observe(channel, Domain::Physical, value);
            reading.normalized_raw.push(normalized);
            reading.values.push(value);
            reading.normalized_values.push(normalized_value);
        }
        reading.raw = raw;
        reading
    }

    /// Frame handler for the sensor characteristic.
    pub fn process(&mut self, payload: &[u8]) -> Vec<Event> {
        let reading = self.read(payload);
        log::trace!("decoded frame {:?}", reading.raw);
        reading.into_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn frame(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn emits_four_events_in_order() {
        let mut pipeline = SensorPipeline::new(2);
        let events = pipeline.process(&frame(&[0x1064, 0x0fff]));
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::RawValues,
                EventKind::NormalizedRawValues,
                EventKind::Values,
                EventKind::NormalizedValues,
            ]
        );
        assert_eq!(events[0].values(), Some(&[4196.0, 4095.0][..]));
        assert_eq!(events[2].values().unwrap()[0], protocol::transform(0x1064));
    }

    #[test]
    fn first_frame_normalizes_to_zero() {
        let mut pipeline = SensorPipeline::new(3);
        let reading = pipeline.read(&frame(&[0x1064, 0x2100, 0x0001]));
        assert_eq!(reading.normalized_raw, vec![0.0; 3]);
        assert_eq!(reading.normalized_values, vec![0.0; 3]);
    }

    #[test]
    fn later_frames_normalize_against_history() {
        let mut pipeline = SensorPipeline::new(1);
        pipeline.read(&frame(&[0x0100]));
        pipeline.read(&frame(&[0x0300]));
        let reading = pipeline.read(&frame(&[0x0200]));
        assert_eq!(reading.normalized_raw, vec![0.5]);

        // Resistance falls as the ADC code rises, so the middle code lands
        // strictly inside the physical range.
        let normalized = reading.normalized_values[0];
        assert!(normalized > 0.0 && normalized < 1.0);
    }

    #[test]
    fn zero_code_does_not_poison_normalization() {
        let mut pipeline = SensorPipeline::new(1);
        let first = pipeline.read(&frame(&[0x1000]));
        assert!(!first.values[0].is_finite());
        assert_eq!(first.normalized_values, vec![0.0]);

        let second = pipeline.read(&frame(&[0x1064]));
        assert!(second.normalized_values[0].is_finite());
    }

    #[test]
    fn full_frame_yields_every_channel() {
        let mut pipeline = SensorPipeline::new(crate::firmware::CHANNEL_COUNT);
        let samples: Vec<u16> = (1..=16).map(|i| 0x1000 | i * 100).collect();
        let reading = pipeline.read(&frame(&samples));
        assert_eq!(reading.raw, samples);
        assert_eq!(reading.values.len(), 16);
        assert_eq!(pipeline.calibrator().channel_count(), 16);
    }
}
