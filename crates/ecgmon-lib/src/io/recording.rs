use crate::{
    events::EventKind,
    session::ExportBundle,
    signal::{Sample, TimeSeries},
    summary::EventSummary,
};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const SAMPLES_FILE: &str = "ecg_data_with_flags.csv";
pub const BPM_FILE: &str = "bpm_data.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Deserialize)]
struct RecordingRow {
    timestamp: f64,
    // exported sample files replay as recordings
    #[serde(alias = "ecg_value")]
    value: i64,
}

/// Load a recording. `.csv` files need `timestamp` and `value` (or `ecg_value`) columns;
/// anything else is read as one value per line sampled at `fs`.
pub fn read_recording(path: &Path, fs: f64) -> Result<Vec<Sample>> {
    let is_csv = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        read_csv_recording(path)
    } else {
        let data = super::text::read_value_series(path)?;
        let ts = TimeSeries { fs, data };
        Ok(ts.samples(0.0).collect())
    }
}

pub fn read_csv_recording(path: &Path) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening recording {}", path.display()))?;
    let mut samples = Vec::new();
    for (idx, row) in reader.deserialize::<RecordingRow>().enumerate() {
        let row = row.with_context(|| format!("parsing recording row {}", idx + 1))?;
        samples.push(Sample::new(row.timestamp, row.value));
    }
    if samples.is_empty() {
        anyhow::bail!("recording {} has no samples", path.display());
    }
    Ok(samples)
}

pub fn write_recording(path: &Path, samples: &[Sample]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating recording {}", path.display()))?;
    writer.write_record(["timestamp", "value"])?;
    for sample in samples {
        writer.write_record(&[sample.timestamp.to_string(), sample.value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    summary: &'a EventSummary,
    counts: &'a BTreeMap<EventKind, u64>,
}

/// Files produced by [`write_export`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportPaths {
    pub samples: PathBuf,
    pub bpm: PathBuf,
    pub summary: PathBuf,
}

/// Write the aligned sample/flag table, the heart-rate table and the event summary into `dir`.
pub fn write_export(dir: &Path, bundle: &ExportBundle) -> Result<ExportPaths> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let paths = ExportPaths {
        samples: dir.join(SAMPLES_FILE),
        bpm: dir.join(BPM_FILE),
        summary: dir.join(SUMMARY_FILE),
    };

    let mut writer = WriterBuilder::new()
        .from_path(&paths.samples)
        .with_context(|| format!("creating {}", paths.samples.display()))?;
    if bundle.samples.is_empty() {
        writer.write_record(["timestamp", "ecg_value", "cardiac_flags"])?;
    }
    for row in &bundle.samples {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let mut writer = WriterBuilder::new()
        .from_path(&paths.bpm)
        .with_context(|| format!("creating {}", paths.bpm.display()))?;
    if bundle.bpm.is_empty() {
        writer.write_record(["timestamp", "bpm"])?;
    }
    for row in &bundle.bpm {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let file = fs::File::create(&paths.summary)
        .with_context(|| format!("creating {}", paths.summary.display()))?;
    let summary = SummaryFile {
        summary: &bundle.summary,
        counts: &bundle.counts,
    };
    serde_json::to_writer_pretty(file, &summary)?;
    Ok(paths)
}
