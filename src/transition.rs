use anyhow::{Result, bail};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::lookup::NormalTables;
use crate::model::{FreqGrid, SelectionModel};
use crate::utils::{log_diff_exp, logsumexp};

/// Log-probabilities of one backward-in-time step of `dt` generations,
/// shape `(F, F)`: entry `(i, j)` moves from bin `i` (recent) to bin `j`
/// (older). Every row has logsumexp 0.
pub fn log_transition_matrix(
    s: f64,
    n: f64,
    dt: f64,
    freqs: &FreqGrid,
    tables: &NormalTables,
) -> Array2<f64> {
    let x = freqs.values();
    let lf = x.len();
    let mut out = Array2::from_elem((lf, lf), f64::NEG_INFINITY);

    // Upper edge of bin j; the last bin is open above.
    let edges: Vec<f64> = x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();

    let mut lc = vec![0.0f64; edges.len()];
    let mut ls = vec![0.0f64; edges.len()];
    let mut z = vec![0.0f64; edges.len()];
    let mut row = vec![f64::NEG_INFINITY; lf];

    for i in 0..lf {
        if i == 0 || i == lf - 1 {
            out[(i, i)] = 0.0;
            continue;
        }
        let p = x[i];
        let mu = p - s * p * (1.0 - p) * dt;
        let sigma = (p * (1.0 - p) * dt / (2.0 * n)).sqrt();

        for (k, e) in edges.iter().enumerate() {
            z[k] = (e - mu) / sigma;
            lc[k] = tables.logcdf(z[k]);
            ls[k] = tables.logsf(z[k]);
        }

        for j in 0..lf {
            row[j] = if j == 0 {
                lc[0]
            } else if j == lf - 1 {
                ls[j - 1]
            } else {
                let (lo, hi) = (j - 1, j);
                if z[hi] <= 0.0 {
                    log_diff_exp(lc[hi], lc[lo])
                } else if z[lo] >= 0.0 {
                    log_diff_exp(ls[lo], ls[hi])
                } else {
                    (-(lc[lo].exp() + ls[hi].exp())).ln_1p()
                }
            };
        }

        let norm = logsumexp(&row);
        for j in 0..lf {
            out[(i, j)] = if norm.is_finite() {
                row[j] - norm
            } else if j == i {
                0.0
            } else {
                f64::NEG_INFINITY
            };
        }
    }
    out
}

/// Per-row transition matrices for one selection schedule. Rows sharing the
/// same `(s, N, dt)` share one matrix.
#[derive(Debug, Clone)]
pub struct TransitionSet {
    matrices: Vec<Array2<f64>>,
    index: Vec<usize>,
}

impl TransitionSet {
    /// `selection[t]` and `model.pop_sizes[t]` drive the step from row `t`
    /// to row `t + 1`.
    pub fn build(model: &SelectionModel, selection: &[f64], tables: &NormalTables) -> Result<Self> {
        let n_rows = model.n_rows();
        if selection.len() != n_rows {
            bail!(
                "selection schedule has {} rows, expected {}",
                selection.len(),
                n_rows
            );
        }

        let mut keys: Vec<(f64, f64, f64)> = Vec::new();
        let mut lookup: HashMap<(u64, u64, u64), usize> = HashMap::new();
        let mut index = Vec::with_capacity(n_rows.saturating_sub(1));
        for t in 0..n_rows.saturating_sub(1) {
            let key = (selection[t], model.pop_sizes[t], model.epochs.dt(t));
            let bits = (key.0.to_bits(), key.1.to_bits(), key.2.to_bits());
            let next = keys.len();
            let k = *lookup.entry(bits).or_insert_with(|| {
                keys.push(key);
                next
            });
            index.push(k);
        }

        let matrices = keys
            .par_iter()
            .map(|&(s, n, dt)| log_transition_matrix(s, n, dt, &model.freqs, tables))
            .collect();

        Ok(Self { matrices, index })
    }

    /// Matrix for the step `t -> t + 1`.
    pub fn step(&self, t: usize) -> &Array2<f64> {
        &self.matrices[self.index[t]]
    }

    pub fn n_steps(&self) -> usize {
        self.index.len()
    }

    pub fn n_distinct(&self) -> usize {
        self.matrices.len()
    }
}
