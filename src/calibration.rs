// Running per-channel ranges used to normalize readings to 0..=1.

/// Which representation of a sample a range tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Raw,
    Physical,
}

/// An expanding `[min, max]` window. Starts out inverted so that the first
/// observed value sets both bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Default for Range {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Range {
    /// True until a value has been observed.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn expand(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Position of `value` within the range. Degenerate ranges and
    /// non-finite inputs give 0.
    pub fn normalize(&self, value: f64) -> f64 {
        let normalized = (value - self.min) / (self.max - self.min);
        if normalized.is_finite() {
            normalized
        } else {
            0.0
        }
    }
}

/// Fixed-size range storage, one raw and one physical range per channel.
#[derive(Clone, Debug)]
pub struct Calibrator {
    raw: Box<[Range]>,
    physical: Box<[Range]>,
}

impl Calibrator {
    pub fn new(channel_count: usize) -> Self {
        Self {
            raw: vec![Range::default(); channel_count].into_boxed_slice(),
            physical: vec![Range::default(); channel_count].into_boxed_slice(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.raw.len()
    }

    /// Widens the channel's range with `value` and returns the normalized value.
    /// Channels outside `0..channel_count` are not tracked and give 0.
    pub fn observe(&mut self, channel: usize, domain: Domain, value: f64) -> f64 {
        let ranges = match domain {
            Domain::Raw => &mut self.raw,
            Domain::Physical => &mut self.physical,
        };
        match ranges.get_mut(channel) {
            Some(range) => {
                range.expand(value);
                range.normalize(value)
            }
            None => 0.0,
        }
    }

    pub fn range(&self, channel: usize, domain: Domain) -> Option<Range> {
        self.ranges(domain).get(channel).copied()
    }

    pub fn ranges(&self, domain: Domain) -> &[Range] {
        match domain {
            Domain::Raw => &self.raw,
            Domain::Physical => &self.physical,
        }
    }
}
