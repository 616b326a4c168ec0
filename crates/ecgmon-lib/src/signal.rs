use serde::{Deserialize, Serialize};

/// One raw reading from the acquisition source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds (wall clock or recording clock)
    pub timestamp: f64,
    /// Raw ADC counts
    pub value: i64,
}

impl Sample {
    pub fn new(timestamp: f64, value: i64) -> Self {
        Self { timestamp, value }
    }
}

const BPM_EPSILON: f64 = 1e-9;

/// Time between two consecutive accepted peaks (seconds).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RRInterval(pub f64);

impl RRInterval {
    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Heart rate implied by this interval, truncated to whole beats per minute.
    pub fn bpm(self) -> u32 {
        // tolerance absorbs the rounding left by subtracting two sampled timestamps
        (60.0 / self.0 + BPM_EPSILON).floor() as u32
    }
}

/// Heart rate derived from one accepted RR interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmSample {
    pub timestamp: f64,
    pub bpm: u32,
}

/// Uniformly sampled raw series, e.g. a value-per-line text recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Raw values
    pub data: Vec<i64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }

    /// Timestamped samples, the first one at `start`.
    pub fn samples(&self, start: f64) -> impl Iterator<Item = Sample> + '_ {
        let fs = self.fs;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &value)| Sample::new(start + i as f64 / fs, value))
    }
}
