use anyhow::{bail, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use ecgmon_lib::{
    io::read_recording,
    session::{IngestReport, Monitor},
    signal::Sample,
};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    path::Path,
    thread::{self, JoinHandle},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Anything that can hand the acquisition loop one reading per tick.
pub trait SampleSource {
    /// `None` once the source is exhausted.
    fn next_sample(&mut self) -> Option<Sample>;
}

/// Replays a recording with the timestamps stored in it.
pub struct ReplaySource {
    samples: std::vec::IntoIter<Sample>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into_iter(),
        }
    }

    pub fn open(path: &Path, fs: f64) -> Result<Self> {
        let source = Self::new(read_recording(path, fs)?);
        info!("opened {} ({} samples)", path.display(), source.remaining());
        Ok(source)
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for ReplaySource {
    fn next_sample(&mut self) -> Option<Sample> {
        self.samples.next()
    }
}

/// Where a synthetic sample's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clock {
    /// `start + index / fs`
    Synthetic { start: f64 },
    /// Seconds since the Unix epoch at the moment the sample is produced
    Wall,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticParams {
    pub fs: f64,
    pub bpm: f64,
    /// R-spike height above baseline (raw counts)
    pub amplitude: f64,
    pub baseline: f64,
    /// Half-width of the uniform noise band (raw counts)
    pub noise: f64,
    /// Gaussian width of each R spike (seconds)
    pub spike_width_s: f64,
    /// Flatline window `(start_s, duration_s)` in signal time
    pub pause: Option<(f64, f64)>,
    /// Stop after this many seconds of signal; unbounded when `None`
    pub duration_s: Option<f64>,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            fs: 250.0,
            bpm: 75.0,
            amplitude: 20_000.0,
            baseline: 2_000.0,
            noise: 300.0,
            spike_width_s: 0.01,
            pause: None,
            duration_s: None,
        }
    }
}

impl SyntheticParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            bail!("sample rate must be positive, got {}", self.fs);
        }
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            bail!("heart rate must be positive, got {}", self.bpm);
        }
        if self.noise < 0.0 || self.spike_width_s <= 0.0 {
            bail!("noise must be non-negative and spike width positive");
        }
        if let Some((start, len)) = self.pause {
            if start < 0.0 || len < 0.0 {
                bail!("pause window must be non-negative");
            }
        }
        Ok(())
    }

    fn in_pause(&self, t: f64) -> bool {
        self.pause
            .map_or(false, |(start, len)| t >= start && t < start + len)
    }

    /// Noise-free signal at signal time `t`: one Gaussian spike centred in every beat period.
    pub fn clean_value(&self, t: f64) -> f64 {
        if self.in_pause(t) {
            return self.baseline;
        }
        let period = 60.0 / self.bpm;
        let centre = ((t / period - 0.5).round() + 0.5) * period;
        let dt = t - centre;
        let width = self.spike_width_s;
        self.baseline + self.amplitude * (-(dt * dt) / (2.0 * width * width)).exp()
    }
}

/// Seeded ECG-like generator: baseline, uniform noise and narrow R spikes at a fixed rate.
pub struct SyntheticSource {
    params: SyntheticParams,
    clock: Clock,
    rng: StdRng,
    index: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(params: SyntheticParams, clock: Clock, seed: u64) -> Result<Self> {
        params.validate()?;
        let limit = params
            .duration_s
            .map(|secs| (secs * params.fs).round().max(0.0) as u64);
        Ok(Self {
            params,
            clock,
            rng: StdRng::seed_from_u64(seed),
            index: 0,
            limit,
        })
    }
}

impl SampleSource for SyntheticSource {
    fn next_sample(&mut self) -> Option<Sample> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return None;
        }
        let t = self.index as f64 / self.params.fs;
        self.index += 1;
        let noise = if self.params.noise > 0.0 {
            self.rng.gen_range(-self.params.noise..=self.params.noise)
        } else {
            0.0
        };
        let value = (self.params.clean_value(t) + noise).round() as i64;
        let timestamp = match self.clock {
            Clock::Synthetic { start } => start + t,
            Clock::Wall => wall_clock_seconds(),
        };
        Some(Sample::new(timestamp, value))
    }
}

pub fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Log event onsets and clears produced by one ingest cycle.
pub fn log_transitions(report: &IngestReport, timestamp: f64) {
    for kind in report.raised.iter() {
        info!("{:.3}s event onset: {}", timestamp, kind);
    }
    for kind in report.cleared.iter() {
        info!("{:.3}s event cleared: {}", timestamp, kind);
    }
}

/// Counters returned when the acquisition thread finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub samples: usize,
    pub beats: usize,
}

/// Owner of a running acquisition thread.
pub struct AcquisitionHandle {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<AcquisitionStats>>,
}

impl AcquisitionHandle {
    /// Signal the loop and wait for it to exit.
    pub fn stop(mut self) -> AcquisitionStats {
        let _ = self.stop_tx.send(());
        self.join()
    }

    /// Wait for the source to run dry.
    pub fn wait(mut self) -> AcquisitionStats {
        self.join()
    }

    fn join(&mut self) -> AcquisitionStats {
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop_tx.send(());
            self.join();
        }
    }
}

/// Run `source` into `monitor` on a background thread, one sample per `period`.
pub fn spawn_acquisition<S>(monitor: Monitor, mut source: S, period: Duration) -> AcquisitionHandle
where
    S: SampleSource + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = thread::spawn(move || {
        info!("acquisition started (period {:?})", period);
        let mut stats = AcquisitionStats::default();
        while let Some(sample) = source.next_sample() {
            let report = monitor.ingest_sample(sample);
            stats.samples += 1;
            if report.bpm.is_some() {
                stats.beats += 1;
            }
            log_transitions(&report, sample.timestamp);
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("acquisition stopped after {} samples", stats.samples);
                    return stats;
                }
            }
        }
        info!("source exhausted after {} samples", stats.samples);
        stats
    });
    AcquisitionHandle {
        stop_tx,
        handle: Some(handle),
    }
}
