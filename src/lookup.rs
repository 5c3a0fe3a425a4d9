//! Standard-normal log-CDF / log-SF lookup tables.
//!
//! The transition model evaluates `ln Phi(z)` and `ln (1 - Phi(z))` on the
//! order of `F^2` times per distinct transition matrix. The tables are read
//! (or generated) once at start-up and borrowed from then on.

use anyhow::{Result, bail};
use statrs::function::erf::erfc;
use std::path::Path;

use crate::io::text::read_floats;

const STANDARD_Z_MAX: f64 = 40.0;
const STANDARD_Z_STEP: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct NormalTables {
    z: Vec<f64>,
    logcdf: Vec<f64>,
    logsf: Vec<f64>,
}

impl NormalTables {
    pub fn new(z: Vec<f64>, logcdf: Vec<f64>, logsf: Vec<f64>) -> Result<Self> {
        if z.len() < 2 {
            bail!("z table needs at least 2 entries, got {}", z.len());
        }
        if logcdf.len() != z.len() || logsf.len() != z.len() {
            bail!(
                "z table lengths differ: z={}, logcdf={}, logsf={}",
                z.len(),
                logcdf.len(),
                logsf.len()
            );
        }
        if z.windows(2).any(|w| w[1] <= w[0]) {
            bail!("z table must be strictly increasing");
        }
        if logcdf.iter().chain(logsf.iter()).any(|v| v.is_nan() || *v > 1e-9) {
            bail!("z table log-probabilities must be <= 0");
        }
        Ok(Self { z, logcdf, logsf })
    }

    pub fn from_files(z_bins: &Path, z_logcdf: &Path, z_logsf: &Path) -> Result<Self> {
        Self::new(read_floats(z_bins)?, read_floats(z_logcdf)?, read_floats(z_logsf)?)
    }

    /// Tables on `[-40, 40]` with spacing `1e-3`, computed from `erfc`.
    pub fn standard() -> Self {
        let n = (2.0 * STANDARD_Z_MAX / STANDARD_Z_STEP).round() as usize + 1;
        let mut z = Vec::with_capacity(n);
        let mut logcdf = Vec::with_capacity(n);
        let mut logsf = Vec::with_capacity(n);
        for i in 0..n {
            let zi = -STANDARD_Z_MAX + STANDARD_Z_STEP * i as f64;
            z.push(zi);
            logcdf.push(ln_normal_cdf(zi));
            logsf.push(ln_normal_cdf(-zi));
        }
        Self { z, logcdf, logsf }
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn z_range(&self) -> (f64, f64) {
        (self.z[0], self.z[self.z.len() - 1])
    }

    /// `ln Phi(z)`, linearly interpolated; saturates outside the table.
    pub fn logcdf(&self, z: f64) -> f64 {
        interpolate(&self.z, &self.logcdf, z)
    }

    /// `ln (1 - Phi(z))`, linearly interpolated; saturates outside the table.
    pub fn logsf(&self, z: f64) -> f64 {
        interpolate(&self.z, &self.logsf, z)
    }
}

fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let last = xs.len() - 1;
    if x.is_nan() {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[last] {
        return ys[last];
    }
    let hi = xs.partition_point(|v| *v <= x);
    let lo = hi - 1;
    let w = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + w * (ys[hi] - ys[lo])
}

fn ln_normal_cdf(z: f64) -> f64 {
    // erfc underflows near z = -37; switch to the Mills-ratio expansion.
    if z < -30.0 {
        let z2 = z * z;
        let series = 1.0 - 1.0 / z2 + 3.0 / (z2 * z2) - 15.0 / (z2 * z2 * z2);
        return -0.5 * z2 - (-z).ln() - 0.5 * (2.0 * std::f64::consts::PI).ln() + series.ln();
    }
    (0.5 * erfc(-z / std::f64::consts::SQRT_2)).ln()
}
