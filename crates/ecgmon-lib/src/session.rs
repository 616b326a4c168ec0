use crate::{
    config::{ConfigError, HistoryConfig, MonitorConfig},
    detectors::PeakDetector,
    events::{EventClassifier, EventKind, EventSet, EventState, RuleInputs},
    metrics::{FeatureBuffers, FeatureId},
    query::{LiveView, Query},
    signal::{BpmSample, Sample},
    summary::EventSummary,
};
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// A raw sample together with the events active when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSample {
    pub timestamp: f64,
    pub value: i64,
    pub flags: EventSet,
}

impl FlaggedSample {
    pub fn sample(&self) -> Sample {
        Sample::new(self.timestamp, self.value)
    }
}

/// Time-ordered sample and heart-rate history. Samples and their flag snapshots share one
/// entry, so they are appended and evicted together.
#[derive(Debug, Clone, Default)]
pub struct History {
    cfg: HistoryConfig,
    samples: VecDeque<FlaggedSample>,
    bpm: VecDeque<BpmSample>,
}

impl History {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            cfg,
            samples: VecDeque::new(),
            bpm: VecDeque::new(),
        }
    }

    pub fn record(&mut self, sample: Sample, bpm: Option<BpmSample>, flags: EventSet) {
        push_bounded(
            &mut self.samples,
            FlaggedSample {
                timestamp: sample.timestamp,
                value: sample.value,
                flags,
            },
            self.cfg.max_samples,
        );
        if let Some(bpm) = bpm {
            push_bounded(&mut self.bpm, bpm, self.cfg.max_bpm_samples);
        }
    }

    pub fn samples(&self) -> &VecDeque<FlaggedSample> {
        &self.samples
    }

    pub fn bpm(&self) -> &VecDeque<BpmSample> {
        &self.bpm
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.bpm.clear();
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: Option<usize>) {
    if let Some(cap) = cap {
        while queue.len() >= cap.max(1) {
            queue.pop_front();
        }
    }
    queue.push_back(item);
}

/// Outcome of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestReport {
    /// Heart-rate sample produced by this cycle, if it completed a beat
    pub bpm: Option<BpmSample>,
    /// Events active after evaluation
    pub active: EventSet,
    /// Events that became active this cycle
    pub raised: EventSet,
    /// Events that stopped being active this cycle
    pub cleared: EventSet,
}

/// All mutable monitoring state. Owned by one [`Monitor`] and only touched under its lock.
#[derive(Debug, Clone)]
pub struct SessionState {
    detector: PeakDetector,
    features: FeatureBuffers,
    classifier: EventClassifier,
    history: History,
    current_bpm: Option<u32>,
    started_at: Option<f64>,
}

impl SessionState {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            detector: PeakDetector::new(config.detector),
            features: FeatureBuffers::new(config.features),
            classifier: EventClassifier::new(config.rules),
            history: History::new(config.history),
            current_bpm: None,
            started_at: None,
        }
    }

    /// One full write-path cycle: detect, update features, classify, record.
    pub fn ingest(&mut self, value: i64, timestamp: f64) -> IngestReport {
        self.started_at.get_or_insert(timestamp);
        let before = self.classifier.active();

        let bpm = self.detector.observe(value, timestamp).map(|rr| {
            self.features
                .record_beat(rr, value, self.detector.threshold());
            let bpm = rr.bpm();
            self.current_bpm = Some(bpm);
            BpmSample { timestamp, bpm }
        });

        let active = self.evaluate(value, timestamp);
        self.record(Sample::new(timestamp, value), bpm, active);

        IngestReport {
            bpm,
            active,
            raised: active.difference(before),
            cleared: before.difference(active),
        }
    }

    /// Evaluate the rule table against the current features for a sample value at `now`.
    pub fn evaluate(&mut self, value: i64, now: f64) -> EventSet {
        let inputs = self.rule_inputs(value, now);
        self.classifier.evaluate(&inputs)
    }

    pub fn record(&mut self, sample: Sample, bpm: Option<BpmSample>, flags: EventSet) {
        self.history.record(sample, bpm, flags);
    }

    fn rule_inputs(&self, value: i64, now: f64) -> RuleInputs {
        RuleInputs {
            now,
            value,
            amplitude_threshold: self.detector.threshold(),
            current_bpm: self.current_bpm,
            last_signal_timestamp: self.last_signal_timestamp().or(self.started_at),
            rr_mean: self.features.mean(FeatureId::Rr),
            rr_variance: self.features.variance(FeatureId::Rr),
            qrs_width_mean: self.features.mean(FeatureId::QrsWidth),
            qt_mean: self.features.mean(FeatureId::Qt),
        }
    }

    /// Return every collection and scalar to its initial state.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.features.clear();
        self.classifier.reset();
        self.history.clear();
        self.current_bpm = None;
        self.started_at = None;
    }

    pub fn current_bpm(&self) -> Option<u32> {
        self.current_bpm
    }

    pub fn last_peak_timestamp(&self) -> Option<f64> {
        self.detector.last_peak_timestamp()
    }

    pub fn last_signal_timestamp(&self) -> Option<f64> {
        self.detector.last_signal_timestamp()
    }

    pub fn active_events(&self) -> EventSet {
        self.classifier.active()
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn features(&self) -> &FeatureBuffers {
        &self.features
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn occurrence_counts(&self) -> BTreeMap<EventKind, u64> {
        self.classifier
            .states()
            .map(|(kind, state)| (kind, state.occurrence_count))
            .collect()
    }

    /// Owned copy of the recorded state, consistent as of the moment it was taken.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            samples: self.history.samples.iter().copied().collect(),
            bpm: self.history.bpm.iter().copied().collect(),
            current_bpm: self.current_bpm,
            last_peak_timestamp: self.last_peak_timestamp(),
            last_signal_timestamp: self.last_signal_timestamp(),
            active: self.classifier.active(),
            events: self.classifier.states().collect(),
        }
    }
}

/// Immutable view of a session, safe to hand to exporters after the lock is released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub samples: Vec<FlaggedSample>,
    pub bpm: Vec<BpmSample>,
    pub current_bpm: Option<u32>,
    pub last_peak_timestamp: Option<f64>,
    pub last_signal_timestamp: Option<f64>,
    pub active: EventSet,
    pub events: BTreeMap<EventKind, EventState>,
}

impl SessionSnapshot {
    pub fn occurrence_counts(&self) -> BTreeMap<EventKind, u64> {
        self.events
            .iter()
            .map(|(&kind, state)| (kind, state.occurrence_count))
            .collect()
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary::from_counts(self.occurrence_counts())
    }

    pub fn export(&self) -> ExportBundle {
        ExportBundle {
            samples: self
                .samples
                .iter()
                .map(|s| ExportRow {
                    timestamp: s.timestamp,
                    ecg_value: s.value,
                    cardiac_flags: s.flags.to_string(),
                })
                .collect(),
            bpm: self.bpm.clone(),
            summary: self.summary(),
            counts: self.occurrence_counts(),
        }
    }
}

/// One row of the aligned signal/flag export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub timestamp: f64,
    pub ecg_value: i64,
    pub cardiac_flags: String,
}

/// Complete, time-aligned session history handed to external renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub samples: Vec<ExportRow>,
    pub bpm: Vec<BpmSample>,
    pub summary: EventSummary,
    pub counts: BTreeMap<EventKind, u64>,
}

struct MonitorInner {
    config: MonitorConfig,
    state: Mutex<SessionState>,
}

/// Shared handle to one monitoring session.
///
/// The acquisition loop calls [`Monitor::ingest`]; any number of readers may query or reset
/// through clones of the same handle. One lock covers the whole state, so every read sees
/// samples, flags, heart rate and events from the same instant.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = SessionState::new(&config);
        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn ingest(&self, value: i64, timestamp: f64) -> IngestReport {
        self.inner.state.lock().ingest(value, timestamp)
    }

    pub fn ingest_sample(&self, sample: Sample) -> IngestReport {
        self.ingest(sample.value, sample.timestamp)
    }

    pub fn reset(&self) {
        self.inner.state.lock().reset();
        info!("session reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Run `f` with the state locked, for reads that span several fields.
    pub fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.inner.state.lock())
    }

    pub fn live(&self) -> LiveView {
        let config = &self.inner.config.query;
        self.with_state(|state| Query::new(state, config).live_view())
    }

    pub fn recent_smoothed(&self, n: usize) -> Vec<f64> {
        let config = &self.inner.config.query;
        self.with_state(|state| Query::new(state, config).recent_smoothed(n))
    }

    pub fn recent_bpm(&self, n: usize) -> Vec<u32> {
        let config = &self.inner.config.query;
        self.with_state(|state| Query::new(state, config).recent_bpm(n))
    }

    pub fn active_events(&self) -> EventSet {
        self.with_state(SessionState::active_events)
    }

    pub fn occurrence_counts(&self) -> BTreeMap<EventKind, u64> {
        self.with_state(SessionState::occurrence_counts)
    }

    pub fn summary(&self) -> EventSummary {
        self.snapshot().summary()
    }

    pub fn export(&self) -> ExportBundle {
        self.snapshot().export()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    fn config() -> MonitorConfig {
        MonitorConfig {
            detector: DetectorConfig {
                amplitude_threshold: 1000,
                min_rr_gap_s: 0.25,
            },
            ..MonitorConfig::default()
        }
    }

    /// Single-sample spikes at `beat_times`, flat baseline elsewhere.
    fn spike_train(state: &mut SessionState, fs: f64, beat_times: &[f64], until: f64) {
        let n = (until * fs).round() as usize;
        let beat_idx: Vec<usize> = beat_times
            .iter()
            .map(|t| (t * fs).round() as usize)
            .collect();
        for i in 0..n {
            let value = if beat_idx.contains(&i) { 1100 } else { 0 };
            state.ingest(value, i as f64 / fs);
        }
    }

    fn feed_rr(state: &mut SessionState, start: f64, rr: &[f64]) -> f64 {
        let mut t = start;
        state.ingest(1100, t);
        for &interval in rr {
            t += interval;
            state.ingest(1100, t);
        }
        t
    }

    #[test]
    fn bpm_tracks_last_interval() {
        let mut state = SessionState::new(&config());
        let report = state.ingest(1100, 0.0);
        assert_eq!(report.bpm, None);
        assert_eq!(state.current_bpm(), None);
        let report = state.ingest(1100, 0.7);
        assert_eq!(report.bpm.map(|b| b.bpm), Some(85));
        assert_eq!(state.current_bpm(), Some(85));
        assert_eq!(state.history().bpm().len(), 1);
    }

    #[test]
    fn periodic_waveform_reaches_expected_rate() {
        let fs = 250.0;
        let period = 0.8;
        let beats: Vec<f64> = (0..12).map(|k| 0.5 + k as f64 * period).collect();
        let mut state = SessionState::new(&config());
        spike_train(&mut state, fs, &beats, 10.0);
        assert_eq!(state.current_bpm(), Some(75));
        let bpm: Vec<u32> = state.history().bpm().iter().map(|b| b.bpm).collect();
        assert_eq!(bpm.len(), 11);
        assert!(bpm.iter().all(|&b| b == 75), "{:?}", bpm);
    }

    #[test]
    fn steady_sixty_then_one_long_interval() {
        let mut state = SessionState::new(&config());
        let t = feed_rr(&mut state, 0.0, &[1.0; 7]);
        let active = state.active_events();
        assert_eq!(state.current_bpm(), Some(60));
        assert!(!active.contains(EventKind::Bradycardia));
        assert!(!active.contains(EventKind::Tachycardia));
        assert_eq!(state.features().variance(FeatureId::Rr), Some(0.0));

        state.ingest(1100, t + 1.3);
        let rr: Vec<f64> = state.features().window(FeatureId::Rr).iter().collect();
        let mean = rr.iter().sum::<f64>() / rr.len() as f64;
        let expected = rr.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / rr.len() as f64;
        let var = state.features().variance(FeatureId::Rr).unwrap();
        assert!((var - expected).abs() < 1e-12);
        assert!(var > 0.0 && var < 0.02, "variance {}", var);
        let active = state.active_events();
        assert!(!active.contains(EventKind::IrregularRhythm));
        // 60 / 1.3 = 46.15
        assert_eq!(state.current_bpm(), Some(46));
        assert!(active.contains(EventKind::Bradycardia));
    }

    #[test]
    fn irregular_rhythm_and_sinus_dysfunction() {
        let mut state = SessionState::new(&config());
        feed_rr(&mut state, 0.0, &[1.0, 1.6, 1.0, 1.6, 1.0, 1.6, 1.0, 1.6]);
        // mean 1.3, population variance 0.09
        let active = state.active_events();
        assert!(active.contains(EventKind::IrregularRhythm));
        assert!(active.contains(EventKind::SinusNodeDysfunction));
        assert!(!active.contains(EventKind::FirstDegreeAvBlock));
    }

    #[test]
    fn slow_tight_rhythm_flags_av_block_and_long_qt() {
        let mut state = SessionState::new(&config());
        feed_rr(&mut state, 0.0, &[1.2; 8]);
        let active = state.active_events();
        assert!(active.contains(EventKind::FirstDegreeAvBlock));
        // QT proxy 1.2 * 0.45 = 0.54
        assert!(active.contains(EventKind::LongQt));
        assert!(!active.contains(EventKind::ShortQt));
    }

    #[test]
    fn fast_rhythm_flags_short_qt_and_tachycardia() {
        let mut state = SessionState::new(&config());
        feed_rr(&mut state, 0.0, &[0.35; 8]);
        let active = state.active_events();
        // 60 / 0.35 = 171
        assert!(active.contains(EventKind::Tachycardia));
        assert!(active.contains(EventKind::VentricularTachycardia));
        assert!(active.contains(EventKind::ShortQt));
    }

    #[test]
    fn tall_peaks_flag_bundle_branch_block() {
        let mut state = SessionState::new(&config());
        // overshoot 7000 → QRS proxy 0.08 + 0.07 = 0.15
        let mut t = 0.0;
        for _ in 0..8 {
            state.ingest(8000, t);
            t += 0.8;
        }
        let active = state.active_events();
        assert!(active.contains(EventKind::BundleBranchBlock));
        // 8000 is far above 1.25 × threshold at 75 bpm
        assert!(active.contains(EventKind::EarlyRepolarization));
    }

    #[test]
    fn asystole_follows_last_crossing() {
        let mut state = SessionState::new(&config());
        state.ingest(1100, 0.0);
        for k in 1..=28 {
            let t = k as f64 * 0.125;
            let active = state.ingest(0, t).active;
            assert!(!active.contains(EventKind::Asystole), "at {}", t);
        }
        let report = state.ingest(0, 3.7);
        assert!(report.active.contains(EventKind::Asystole));
        assert!(report.raised.contains(EventKind::Asystole));
        // the next crossing moves last_signal_timestamp to now
        let report = state.ingest(1100, 3.8);
        assert!(!report.active.contains(EventKind::Asystole));
        assert!(report.cleared.contains(EventKind::Asystole));
        assert_eq!(
            state.classifier().occurrence_count(EventKind::Asystole),
            1
        );
    }

    #[test]
    fn asystole_from_session_start_without_any_peak() {
        let mut state = SessionState::new(&config());
        state.ingest(0, 100.0);
        assert!(!state.ingest(0, 103.0).active.contains(EventKind::Asystole));
        assert!(state.ingest(0, 104.0).active.contains(EventKind::Asystole));
    }

    #[test]
    fn evaluate_twice_is_idempotent() {
        let mut state = SessionState::new(&config());
        feed_rr(&mut state, 0.0, &[0.5; 8]);
        let first = state.evaluate(1100, 4.0);
        let counts = state.occurrence_counts();
        let second = state.evaluate(1100, 4.0);
        assert_eq!(first, second);
        assert!(second.contains(EventKind::Tachycardia));
        assert_eq!(state.occurrence_counts(), counts);
        assert_eq!(counts[&EventKind::Tachycardia], 1);
    }

    #[test]
    fn flags_stay_aligned_with_samples() {
        let mut state = SessionState::new(&config());
        feed_rr(&mut state, 0.0, &[0.35; 8]);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.samples.len(), 9);
        let last = snapshot.samples.last().unwrap();
        assert!(last.flags.contains(EventKind::Tachycardia));
        assert!(!snapshot.samples[0].flags.contains(EventKind::Tachycardia));
    }

    #[test]
    fn bounded_history_evicts_oldest() {
        let mut cfg = config();
        cfg.history.max_samples = Some(4);
        cfg.history.max_bpm_samples = Some(2);
        let mut state = SessionState::new(&cfg);
        feed_rr(&mut state, 0.0, &[0.8; 5]);
        let history = state.history();
        assert_eq!(history.samples().len(), 4);
        assert_eq!(history.bpm().len(), 2);
        assert!((history.samples()[0].timestamp - 1.6).abs() < 1e-9);
    }

    #[test]
    fn reset_restores_initial_state() {
        let monitor = Monitor::new(config()).unwrap();
        for i in 0..20 {
            monitor.ingest(if i % 2 == 0 { 1300 } else { 0 }, i as f64 * 0.3);
        }
        assert!(!monitor.snapshot().samples.is_empty());
        monitor.reset();
        let snapshot = monitor.snapshot();
        assert!(snapshot.samples.is_empty());
        assert!(snapshot.bpm.is_empty());
        assert_eq!(snapshot.current_bpm, None);
        assert_eq!(snapshot.last_peak_timestamp, None);
        assert!(snapshot.active.is_empty());
        assert!(snapshot.events.values().all(|s| *s == EventState::default()));
        let live = monitor.live();
        assert_eq!(live.bpm, 0);
        assert!(live.smoothed_ecg.is_empty());
        assert!(live.bpm_history.is_empty());
        assert!(live.active_events.is_empty());
        assert!(monitor.occurrence_counts().values().all(|&c| c == 0));
    }

    #[test]
    fn export_joins_flags_per_sample() {
        let monitor = Monitor::new(config()).unwrap();
        let mut t = 0.0;
        for _ in 0..9 {
            monitor.ingest(1100, t);
            t += 0.35;
        }
        let bundle = monitor.export();
        assert_eq!(bundle.samples.len(), 9);
        assert_eq!(bundle.bpm.len(), 8);
        let last = bundle.samples.last().unwrap();
        assert!(last.cardiac_flags.contains("Tachycardia,Ventricular Tachycardia"));
        assert_eq!(bundle.samples[0].cardiac_flags, "");
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = config();
        cfg.query.smoothing_window = 0;
        assert!(Monitor::new(cfg).is_err());
    }

    #[test]
    fn readers_and_writer_share_state() {
        let monitor = Monitor::new(config()).unwrap();
        let writer = monitor.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..2000 {
                writer.ingest(if i % 200 == 0 { 1100 } else { 0 }, i as f64 / 250.0);
            }
        });
        for _ in 0..50 {
            let snapshot = monitor.snapshot();
            for row in &snapshot.samples {
                assert!(row.timestamp >= 0.0);
            }
            let _ = monitor.live();
        }
        handle.join().unwrap();
        assert_eq!(monitor.snapshot().samples.len(), 2000);
        assert_eq!(monitor.live().bpm, 75);
    }
}
