//! Binary genealogy records (`.timeb`), optionally gzip-compressed.
//!
//! Little-endian layout:
//!
//! ```text
//! i32 num_muts, i32 num_draws
//! per mutation:
//!   i32 bp, u8 anc, u8 der, i32 daf, i32 n
//!   f32[num_draws * (n - daf - 1)]   ancestral times, if daf < n - 1
//!   f32[num_draws * (daf - 1)]       derived times,   if daf > 1
//! ```

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::evidence::{Genealogy, Realizations};
use crate::io::read_bytes;

/// `bp`, two allele bytes, `daf` and `n`.
const RECORD_HEADER_BYTES: usize = 14;
/// Largest accepted number of sampled genealogies per mutation.
const MAX_DRAWS: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct TimebRecord {
    pub bp: i32,
    pub ancestral_allele: u8,
    pub derived_allele: u8,
    pub daf: usize,
    pub n: usize,
    /// One genealogy per sampled draw.
    pub draws: Vec<Genealogy>,
}

impl TimebRecord {
    pub fn into_realizations(self) -> Realizations {
        Realizations::from_vec(self.draws)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            bail!(
                "truncated genealogy record: need {n} bytes for {what} at offset {}, {} left",
                self.pos,
                self.remaining()
            );
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    /// `rows x cols` row-major f32 matrix, widened to f64.
    fn f32_rows(&mut self, rows: usize, cols: usize, what: &str) -> Result<Vec<Vec<f64>>> {
        let Some(n_bytes) = rows.checked_mul(cols).and_then(|v| v.checked_mul(4)) else {
            bail!("{what}: {rows} x {cols} values exceed the addressable size");
        };
        let bytes = self.take(n_bytes, what)?;
        let vals: Vec<f64> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect();
        Ok(match cols {
            0 => vec![Vec::new(); rows],
            _ => vals.chunks(cols).map(<[f64]>::to_vec).collect(),
        })
    }
}

fn non_negative(v: i32, what: &str) -> Result<usize> {
    usize::try_from(v).with_context(|| format!("negative {what}: {v}"))
}

pub fn parse_timeb(buf: &[u8]) -> Result<Vec<TimebRecord>> {
    let mut cur = Cursor { buf, pos: 0 };
    let num_muts = non_negative(cur.i32("mutation count")?, "mutation count")?;
    let num_draws = non_negative(cur.i32("draw count")?, "draw count")?;
    if num_draws == 0 {
        bail!("genealogy file declares zero sampled genealogies per mutation");
    }
    if num_draws > MAX_DRAWS {
        bail!(
            "genealogy file declares {num_draws} sampled genealogies per mutation, at most {MAX_DRAWS} supported"
        );
    }
    if num_muts > cur.remaining() / RECORD_HEADER_BYTES {
        bail!(
            "truncated genealogy record: {num_muts} mutations declared but only {} bytes follow the header",
            cur.remaining()
        );
    }

    let mut records = Vec::with_capacity(num_muts);
    for _ in 0..num_muts {
        let bp = cur.i32("position")?;
        let ancestral_allele = cur.u8("ancestral allele")?;
        let derived_allele = cur.u8("derived allele")?;
        let daf = non_negative(cur.i32("derived allele count")?, "derived allele count")?;
        let n = non_negative(cur.i32("sample size")?, "sample size")?;
        if daf > n {
            bail!("derived allele count {daf} exceeds sample size {n} at bp {bp}");
        }

        let n_anc_times = if daf + 1 < n { n - daf - 1 } else { 0 };
        let n_der_times = daf.saturating_sub(1);
        let anc = cur.f32_rows(num_draws, n_anc_times, "ancestral times")?;
        let der = cur.f32_rows(num_draws, n_der_times, "derived times")?;

        let draws = der
            .iter()
            .zip(anc.iter())
            .map(|(d, a)| Genealogy::new(daf, n - daf, d, a))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid genealogy at bp {bp}"))?;

        records.push(TimebRecord {
            bp,
            ancestral_allele,
            derived_allele,
            daf,
            n,
            draws,
        });
    }
    if cur.pos != buf.len() {
        log::warn!(
            "{} trailing bytes after {num_muts} genealogy records ignored",
            buf.len() - cur.pos
        );
    }
    Ok(records)
}

pub fn read_timeb(path: &Path) -> Result<Vec<TimebRecord>> {
    let buf = read_bytes(path)?;
    parse_timeb(&buf).with_context(|| format!("failed to parse genealogy file {path:?}"))
}

/// Genealogies of the focal locus: the last record of the file.
pub fn read_locus(path: &Path) -> Result<TimebRecord> {
    let mut records = read_timeb(path)?;
    if records.len() > 1 {
        log::warn!(
            "{path:?} holds {} mutations; using the last one",
            records.len()
        );
    }
    match records.pop() {
        Some(rec) => Ok(rec),
        None => bail!("genealogy file {path:?} contains no mutations"),
    }
}
