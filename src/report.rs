use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::opt::SelectionFit;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinEstimate {
    pub start: f64,
    pub end: f64,
    pub s: f64,
}

/// Machine-readable summary written next to the text report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSummary {
    pub loglr: f64,
    pub neg_loglike: f64,
    pub neutral_neg_loglike: f64,
    pub bins: Vec<BinEstimate>,
    pub n_realizations: usize,
    pub n_ancient: usize,
    pub n_freqs: usize,
    pub n_epochs: usize,
    pub t_cutoff: f64,
    pub s_max: f64,
    pub n_iter: usize,
    pub n_fev: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub inference: PathBuf,
    pub summary: PathBuf,
    pub posterior: PathBuf,
    pub freqs: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &Path) -> Self {
        let with = |suffix: &str| {
            let mut s = prefix.as_os_str().to_owned();
            s.push(suffix);
            PathBuf::from(s)
        };
        Self {
            inference: with("_inference.txt"),
            summary: with("_inference.json"),
            posterior: with("_post.txt"),
            freqs: with("_freqs.txt"),
        }
    }
}

pub fn bin_estimates(time_bins: &[f64], s_hat: &[f64]) -> Vec<BinEstimate> {
    time_bins
        .windows(2)
        .zip(s_hat.iter())
        .map(|(w, &s)| BinEstimate {
            start: w[0],
            end: w[1],
            s,
        })
        .collect()
}

pub fn render_inference(fit: &SelectionFit, time_bins: &[f64]) -> String {
    let mut out = format!("logLR: {:.4}\n", fit.loglr);
    out.push_str("Epoch\tSelection MLE\n");
    for b in bin_estimates(time_bins, &fit.s_hat) {
        out.push_str(&format!("{}-{}\t{:.5}\n", b.start as i64, b.end as i64, b.s));
    }
    out
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    Ok(BufWriter::new(file))
}

pub fn write_inference(path: &Path, fit: &SelectionFit, time_bins: &[f64]) -> Result<()> {
    let mut w = create(path)?;
    w.write_all(render_inference(fit, time_bins).as_bytes())
        .and_then(|_| w.flush())
        .with_context(|| format!("failed to write {path:?}"))
}

/// Comma-delimited matrix, one line per row.
pub fn write_matrix_csv(path: &Path, m: &Array2<f64>) -> Result<()> {
    let mut w = create(path)?;
    for row in m.outer_iter() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.18e}")).collect();
        writeln!(w, "{}", line.join(",")).with_context(|| format!("failed to write {path:?}"))?;
    }
    w.flush().with_context(|| format!("failed to write {path:?}"))
}

pub fn write_freqs(path: &Path, freqs: &[f64]) -> Result<()> {
    let mut w = create(path)?;
    for f in freqs {
        writeln!(w, "{f:.18e}").with_context(|| format!("failed to write {path:?}"))?;
    }
    w.flush().with_context(|| format!("failed to write {path:?}"))
}

pub fn write_summary(path: &Path, summary: &InferenceSummary) -> Result<()> {
    let w = create(path)?;
    serde_json::to_writer_pretty(w, summary).with_context(|| format!("failed to write {path:?}"))
}
