use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::evidence::{AncientSamples, DiploidRecord, HaploidRecord};
use crate::io::text::{parse_float_rows, read_float_rows};

/// Ancient-sample rows: `time logL(AA) logL(AD) logL(DD)` for diploid
/// samples, `time logL(A) logL(D)` for haploid ones.
pub fn parse_ancient(rows: &[Vec<f64>]) -> Result<AncientSamples> {
    let mut out = AncientSamples::default();
    for (i, row) in rows.iter().enumerate() {
        if !(3..=4).contains(&row.len()) {
            bail!("row {}: expected 3 or 4 columns, found {}", i + 1, row.len());
        }
        let time = row[0];
        if !(time >= 0.0) {
            bail!("row {}: sample time must be non-negative, got {time}", i + 1);
        }
        if row[1..].iter().any(|v| v.is_nan() || *v > 0.0) {
            bail!("row {}: genotype likelihoods must be natural-log values <= 0", i + 1);
        }
        if row.len() == 4 {
            out.diploid.push(DiploidRecord {
                time,
                log_gl: [row[1], row[2], row[3]],
            });
        } else {
            out.haploid.push(HaploidRecord {
                time,
                log_gl: [row[1], row[2]],
            });
        }
    }
    Ok(out)
}

pub fn parse_ancient_str(content: &str) -> Result<AncientSamples> {
    parse_ancient(&parse_float_rows(content)?)
}

pub fn read_ancient(path: &Path) -> Result<AncientSamples> {
    let rows = read_float_rows(path)?;
    parse_ancient(&rows).with_context(|| format!("invalid ancient samples in {path:?}"))
}
