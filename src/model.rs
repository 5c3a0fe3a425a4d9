use anyhow::{Result, bail};

use crate::utils::{digitize, linspace};

/// Largest population size used to place the outermost frequency bins.
const GRID_N_CAP: f64 = 100_000.0;

#[derive(Debug, Clone)]
pub struct FreqGrid {
    freqs: Vec<f64>,
}

impl FreqGrid {
    pub fn new(freqs: Vec<f64>) -> Result<Self> {
        if freqs.len() < 3 {
            bail!("frequency grid needs at least 3 bins, got {}", freqs.len());
        }
        if freqs.iter().any(|f| !(*f > 0.0 && *f < 1.0)) {
            bail!("frequency grid values must lie strictly inside (0, 1)");
        }
        if freqs.windows(2).any(|w| w[1] <= w[0]) {
            bail!("frequency grid must be strictly increasing");
        }
        Ok(Self { freqs })
    }

    /// `n_bins` evenly spaced frequencies on `[c, 1 - c]`, `c = 1 / (2 min(n0, 1e5))`.
    pub fn uniform(n_bins: usize, n0: f64) -> Result<Self> {
        if !(n0 > 0.0) {
            bail!("present-day population size must be positive, got {n0}");
        }
        let c = 1.0 / (2.0 * n0.min(GRID_N_CAP));
        Self::new(linspace(c, 1.0 - c, n_bins))
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.freqs
    }

    pub fn nearest(&self, p: f64) -> usize {
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for (i, f) in self.freqs.iter().enumerate() {
            let d = (f - p).abs();
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }
}

/// Epoch boundaries `b_0 < ... < b_T` in generations before present.
/// Lattice row `t` is the interval `[b_t, b_{t+1})`.
#[derive(Debug, Clone)]
pub struct EpochGrid {
    bounds: Vec<f64>,
}

impl EpochGrid {
    pub fn new(bounds: Vec<f64>) -> Result<Self> {
        if bounds.len() < 2 {
            bail!("epoch grid needs at least 2 boundaries, got {}", bounds.len());
        }
        if bounds[0] < 0.0 || !bounds[0].is_finite() {
            bail!("epoch grid must start at a non-negative time");
        }
        if bounds.windows(2).any(|w| !(w[1] > w[0]) || !w[1].is_finite()) {
            bail!("epoch grid must be strictly increasing and finite");
        }
        Ok(Self { bounds })
    }

    /// Unit-generation epochs `0, 1, ..., ceil(t_cutoff)`.
    pub fn generations(t_cutoff: f64) -> Result<Self> {
        if !(t_cutoff > 0.0) || !t_cutoff.is_finite() {
            bail!("time cutoff must be positive and finite, got {t_cutoff}");
        }
        let n_rows = t_cutoff.ceil() as usize;
        Self::new((0..=n_rows).map(|t| t as f64).collect())
    }

    pub fn n_rows(&self) -> usize {
        self.bounds.len() - 1
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn start(&self, t: usize) -> f64 {
        self.bounds[t]
    }

    pub fn end(&self, t: usize) -> f64 {
        self.bounds[t + 1]
    }

    pub fn dt(&self, t: usize) -> f64 {
        self.bounds[t + 1] - self.bounds[t]
    }

    pub fn cutoff(&self) -> f64 {
        self.bounds[self.bounds.len() - 1]
    }

    /// Row whose interval contains `time`, if any.
    pub fn row_of(&self, time: f64) -> Option<usize> {
        digitize(time, &self.bounds)
    }
}

/// Everything about a run that does not depend on the data: grids,
/// population sizes, selection breakpoints and the coefficient bound.
#[derive(Debug, Clone)]
pub struct SelectionModel {
    pub freqs: FreqGrid,
    pub epochs: EpochGrid,
    pub pop_sizes: Vec<f64>,
    pub time_bins: Vec<f64>,
    pub s_max: f64,
    pub current_freq: Option<f64>,
}

impl SelectionModel {
    pub fn new(
        freqs: FreqGrid,
        epochs: EpochGrid,
        pop_sizes: Vec<f64>,
        time_bins: Vec<f64>,
        s_max: f64,
        current_freq: Option<f64>,
    ) -> Result<Self> {
        if pop_sizes.len() != epochs.n_rows() {
            bail!(
                "population size schedule has {} entries but the epoch grid has {} rows",
                pop_sizes.len(),
                epochs.n_rows()
            );
        }
        if pop_sizes.iter().any(|n| !(*n > 0.0) || !n.is_finite()) {
            bail!("population sizes must be positive and finite");
        }
        if time_bins.len() < 2 {
            bail!(
                "at least 2 time-bin breakpoints are required, got {}",
                time_bins.len()
            );
        }
        if time_bins.windows(2).any(|w| !(w[1] > w[0])) {
            bail!("time-bin breakpoints must be strictly increasing");
        }
        if !(s_max > 0.0) {
            bail!("sMax must be positive, got {s_max}");
        }
        if let Some(p) = current_freq
            && !(p > 0.0 && p < 1.0)
        {
            bail!("present-day frequency must lie in (0, 1), got {p}");
        }
        Ok(Self {
            freqs,
            epochs,
            pop_sizes,
            time_bins,
            s_max,
            current_freq,
        })
    }

    /// Number of free selection coefficients (one per time bin).
    pub fn n_free_params(&self) -> usize {
        self.time_bins.len() - 1
    }

    pub fn n_rows(&self) -> usize {
        self.epochs.n_rows()
    }

    pub fn n_freqs(&self) -> usize {
        self.freqs.len()
    }

    /// Broadcasts per-bin coefficients onto epoch rows. Rows whose start
    /// lies outside `[B_0, B_K)` take the anchored coefficient 0.
    pub fn selection_per_row(&self, theta: &[f64]) -> Result<Vec<f64>> {
        if theta.len() != self.n_free_params() {
            bail!(
                "expected {} selection coefficients, got {}",
                self.n_free_params(),
                theta.len()
            );
        }
        let sel = (0..self.n_rows())
            .map(|t| match digitize(self.epochs.start(t), &self.time_bins) {
                Some(k) => theta[k],
                None => 0.0,
            })
            .collect();
        Ok(sel)
    }
}
