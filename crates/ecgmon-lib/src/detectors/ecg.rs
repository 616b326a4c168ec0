use crate::{config::DetectorConfig, signal::RRInterval};

/// Streaming R-peak detector: a sample above the amplitude threshold registers a peak, and
/// consecutive peaks further apart than the refractory gap yield an RR interval.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    cfg: DetectorConfig,
    last_peak_timestamp: Option<f64>,
    last_signal_timestamp: Option<f64>,
}

impl PeakDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self {
            cfg,
            last_peak_timestamp: None,
            last_signal_timestamp: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn threshold(&self) -> i64 {
        self.cfg.amplitude_threshold
    }

    pub fn last_peak_timestamp(&self) -> Option<f64> {
        self.last_peak_timestamp
    }

    /// Time of the last threshold crossing. Only crossings advance it, so a flat or
    /// disconnected lead leaves it behind.
    pub fn last_signal_timestamp(&self) -> Option<f64> {
        self.last_signal_timestamp
    }

    /// Feed one sample. Returns the RR interval when this sample completes a beat.
    pub fn observe(&mut self, value: i64, timestamp: f64) -> Option<RRInterval> {
        if value <= self.cfg.amplitude_threshold {
            return None;
        }

        let rr = self
            .last_peak_timestamp
            .map(|last| timestamp - last)
            .filter(|&rr| rr > self.cfg.min_rr_gap_s)
            .map(RRInterval);

        // crossings inside the refractory gap belong to the same beat but still move the reference
        self.last_peak_timestamp = Some(timestamp);
        self.last_signal_timestamp = Some(timestamp);
        rr
    }

    pub fn reset(&mut self) {
        self.last_peak_timestamp = None;
        self.last_signal_timestamp = None;
    }
}
