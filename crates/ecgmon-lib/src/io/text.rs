use anyhow::{Context, Result};
use std::path::Path;

/// Parse a newline-delimited series of raw integer values, ignoring blank/comment lines.
pub fn parse_value_series(text: &str) -> Result<Vec<i64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: i64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not an integer sample: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited value series from disk.
pub fn read_value_series(path: &Path) -> Result<Vec<i64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_value_series(&text)
}
