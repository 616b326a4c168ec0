use super::window::FeatureWindow;
use crate::{config::FeatureConfig, signal::RRInterval};
use serde::{Deserialize, Serialize};

/// Rolling features derived from accepted beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureId {
    /// RR interval (seconds)
    Rr,
    /// QRS-width proxy (seconds, heuristic)
    QrsWidth,
    /// QT proxy (seconds, heuristic)
    Qt,
}

impl FeatureId {
    pub const ALL: [FeatureId; 3] = [FeatureId::Rr, FeatureId::QrsWidth, FeatureId::Qt];

    fn index(self) -> usize {
        self as usize
    }
}

/// Window statistics at one instant; `None` while the window is warming up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub max: Option<f64>,
}

/// The three feature windows fed on every accepted RR interval.
#[derive(Debug, Clone)]
pub struct FeatureBuffers {
    cfg: FeatureConfig,
    windows: [FeatureWindow; 3],
}

impl FeatureBuffers {
    pub fn new(cfg: FeatureConfig) -> Self {
        Self {
            windows: [
                FeatureWindow::new(cfg.rr_capacity, cfg.rr_warmup),
                FeatureWindow::new(cfg.qrs_capacity, cfg.qrs_warmup),
                FeatureWindow::new(cfg.qt_capacity, cfg.qt_warmup),
            ],
            cfg,
        }
    }

    pub fn push(&mut self, id: FeatureId, value: f64) {
        self.windows[id.index()].push(value);
    }

    pub fn window(&self, id: FeatureId) -> &FeatureWindow {
        &self.windows[id.index()]
    }

    pub fn mean(&self, id: FeatureId) -> Option<f64> {
        self.window(id).mean()
    }

    pub fn variance(&self, id: FeatureId) -> Option<f64> {
        self.window(id).variance()
    }

    pub fn max(&self, id: FeatureId) -> Option<f64> {
        self.window(id).max()
    }

    pub fn stats(&self, id: FeatureId) -> FeatureStats {
        let window = self.window(id);
        FeatureStats {
            count: window.len(),
            mean: window.mean(),
            variance: window.variance(),
            max: window.max(),
        }
    }

    /// Feed one accepted beat: the interval itself plus both morphology proxies.
    /// `peak_value` is the raw sample that completed the beat.
    pub fn record_beat(&mut self, rr: RRInterval, peak_value: i64, threshold: i64) {
        self.push(FeatureId::Rr, rr.seconds());
        self.push(
            FeatureId::QrsWidth,
            qrs_width_proxy(&self.cfg, peak_value, threshold),
        );
        self.push(FeatureId::Qt, qt_proxy(&self.cfg, rr));
    }

    pub fn clear(&mut self) {
        for window in &mut self.windows {
            window.clear();
        }
    }
}

/// Heuristic QRS width: grows with how far the peak overshoots the detection threshold.
/// Not derived from waveform morphology; needs calibration against real recordings.
pub fn qrs_width_proxy(cfg: &FeatureConfig, peak_value: i64, threshold: i64) -> f64 {
    let overshoot = (peak_value - threshold).unsigned_abs() as f64;
    cfg.qrs_base_width_s + overshoot / cfg.qrs_amplitude_scale
}

/// Heuristic QT as a fixed fraction of the RR interval. Needs calibration.
pub fn qt_proxy(cfg: &FeatureConfig, rr: RRInterval) -> f64 {
    rr.seconds() * cfg.qt_ratio
}
