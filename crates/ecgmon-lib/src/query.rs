use crate::{config::QueryConfig, events::EventSet, session::SessionState};
use serde::{Deserialize, Serialize};

/// Display-ready state for a live dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveView {
    pub smoothed_ecg: Vec<f64>,
    /// Last heart rate, 0 before the second beat
    pub bpm: u32,
    pub bpm_history: Vec<u32>,
    pub active_events: EventSet,
}

/// Read-only derived views over a locked [`SessionState`].
pub struct Query<'a> {
    state: &'a SessionState,
    cfg: &'a QueryConfig,
}

impl<'a> Query<'a> {
    pub fn new(state: &'a SessionState, cfg: &'a QueryConfig) -> Self {
        Self { state, cfg }
    }

    /// Trailing moving average of the raw series, last `n` points only.
    pub fn recent_smoothed(&self, n: usize) -> Vec<f64> {
        let samples = self.state.history().samples();
        let len = samples.len();
        let start = len.saturating_sub(n);
        let window = self.cfg.smoothing_window.max(1);
        // only the tail that feeds the requested points
        let lead = start.saturating_sub(window - 1);
        let values: Vec<f64> = samples.range(lead..).map(|s| s.value as f64).collect();
        trailing_average(&values, window)
            .split_off(start - lead)
    }

    /// Most recent `n` heart-rate samples, oldest first.
    pub fn recent_bpm(&self, n: usize) -> Vec<u32> {
        let bpm = self.state.history().bpm();
        let start = bpm.len().saturating_sub(n);
        bpm.range(start..).map(|b| b.bpm).collect()
    }

    pub fn active_events(&self) -> EventSet {
        self.state.active_events()
    }

    pub fn live_view(&self) -> LiveView {
        LiveView {
            smoothed_ecg: self.recent_smoothed(self.cfg.ecg_points),
            bpm: self.state.current_bpm().unwrap_or(0),
            bpm_history: self.recent_bpm(self.cfg.bpm_points),
            active_events: self.active_events(),
        }
    }
}

/// Point `i` averages the `min(i + 1, window)` values ending at `i`: no look-ahead and no
/// wraparound at the start of the series.
pub fn trailing_average(data: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= window {
            acc -= data[i - window];
        }
        out.push(acc / (i + 1).min(window) as f64);
    }
    out
}
