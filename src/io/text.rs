use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::io::read_to_string;

/// Rows of whitespace-separated floats; blank lines and `#` comments are
/// skipped.
pub fn read_float_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let content = read_to_string(path)?;
    parse_float_rows(&content).with_context(|| format!("failed to parse {path:?}"))
}

pub fn parse_float_rows(content: &str) -> Result<Vec<Vec<f64>>> {
    let mut rows = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>()
                    .with_context(|| format!("line {}: invalid number {tok:?}", lineno + 1))
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// All floats of a file, flattened in reading order.
pub fn read_floats(path: &Path) -> Result<Vec<f64>> {
    let vals: Vec<f64> = read_float_rows(path)?.into_iter().flatten().collect();
    if vals.is_empty() {
        bail!("no values found in {path:?}");
    }
    Ok(vals)
}

/// Selection time-bin breakpoints.
pub fn read_time_bins(path: &Path) -> Result<Vec<f64>> {
    let bins = read_floats(path)?;
    if bins.len() < 2 {
        bail!(
            "time-bins file {path:?} must hold at least 2 breakpoints, found {}",
            bins.len()
        );
    }
    Ok(bins)
}
