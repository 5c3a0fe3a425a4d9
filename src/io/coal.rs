use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::io::read_to_string;
use crate::model::EpochGrid;

/// Piecewise-constant population history from a Relate `.coal` file.
#[derive(Debug, Clone, PartialEq)]
pub struct PopHistory {
    /// Start time of each piece.
    pub starts: Vec<f64>,
    /// Diploid size of each piece.
    pub sizes: Vec<f64>,
}

/// Line 1 names the groups, line 2 holds epoch starts, line 3 holds two
/// label columns followed by per-epoch coalescence rates `1/(2N)`. The
/// trailing rate is dropped and the last size is repeated instead.
pub fn parse_coal(content: &str) -> Result<PopHistory> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    lines.next().context("empty .coal file")?;
    let starts = parse_line(lines.next().context(".coal file lacks the epoch line")?)
        .context("invalid epoch line")?;
    let rates_line = parse_line(lines.next().context(".coal file lacks the rate line")?)
        .context("invalid rate line")?;
    if rates_line.len() < 4 {
        bail!(".coal rate line needs two labels and at least two rates");
    }

    let rates = &rates_line[2..rates_line.len() - 1];
    let mut sizes = Vec::with_capacity(rates.len() + 1);
    for r in rates {
        if !(*r > 0.0) {
            bail!(".coal rates must be positive, got {r}");
        }
        sizes.push(0.5 / r);
    }
    let last = sizes[sizes.len() - 1];
    sizes.push(last);

    if starts.is_empty() {
        bail!(".coal file has no epochs");
    }
    if starts.windows(2).any(|w| w[1] < w[0]) {
        bail!(".coal epochs must be non-decreasing");
    }
    Ok(PopHistory { starts, sizes })
}

fn parse_line(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("invalid number {tok:?}"))
        })
        .collect()
}

pub fn read_coal(path: &Path) -> Result<PopHistory> {
    let content = read_to_string(path)?;
    parse_coal(&content).with_context(|| format!("failed to parse {path:?}"))
}

impl PopHistory {
    /// Size at `time`: the piece with the last start `<= time`.
    pub fn size_at(&self, time: f64) -> f64 {
        let pos = self.starts.partition_point(|s| *s <= time);
        let k = pos.saturating_sub(1).min(self.sizes.len() - 1);
        self.sizes[k]
    }

    /// One size per epoch row, taken at the row start.
    pub fn per_row(&self, epochs: &EpochGrid) -> Vec<f64> {
        (0..epochs.n_rows())
            .map(|t| self.size_at(epochs.start(t)))
            .collect()
    }
}
