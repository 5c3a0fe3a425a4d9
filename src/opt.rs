use anyhow::{Result, bail};
use ndarray::Array2;

use crate::evidence::{LocusData, Realizations};
use crate::importance::{LatticeContext, aggregate_log_likelihood, aggregate_posterior};
use crate::lookup::NormalTables;
use crate::model::SelectionModel;
use crate::progress;
use crate::transition::TransitionSet;

#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub xatol: f64,
    pub fatol: f64,
    /// `None` means `200 * dim`.
    pub max_iters: Option<usize>,
    pub max_fevals: Option<usize>,
    pub progress: bool,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            xatol: 1e-4,
            fatol: 1e-4,
            max_iters: None,
            max_fevals: None,
            progress: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fun: f64,
    pub n_iter: usize,
    pub n_fev: usize,
    pub converged: bool,
}

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

struct Counted<'f, F> {
    f: &'f mut F,
    n_fev: usize,
    best: f64,
    pb: Option<indicatif::ProgressBar>,
}

impl<F> Counted<'_, F>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    fn eval(&mut self, x: &[f64]) -> Result<f64> {
        let v = (self.f)(x)?;
        self.n_fev += 1;
        if v < self.best {
            self.best = v;
        }
        if let Some(pb) = &self.pb {
            pb.set_message(format!("eval {} best {:.4}", self.n_fev, self.best));
        }
        Ok(v)
    }
}

/// Downhill simplex minimization from a caller-supplied simplex of
/// `dim + 1` vertices. `+inf` values are allowed and steer the search away.
pub fn nelder_mead<F>(f: &mut F, simplex: Array2<f64>, config: &NelderMeadConfig) -> Result<Minimum>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    let (n_vert, dim) = simplex.dim();
    if dim == 0 || n_vert != dim + 1 {
        bail!("simplex must have shape (dim + 1, dim), got ({n_vert}, {dim})");
    }
    let max_iters = config.max_iters.unwrap_or(200 * dim);
    let max_fevals = config.max_fevals.unwrap_or(200 * dim);

    let pb = config
        .progress
        .then(|| progress::spinner("OPT", "Nelder-Mead"));
    let mut counted = Counted {
        f,
        n_fev: 0,
        best: f64::INFINITY,
        pb,
    };

    let mut sim: Vec<Vec<f64>> = simplex.outer_iter().map(|r| r.to_vec()).collect();
    let mut fsim = Vec::with_capacity(n_vert);
    for v in &sim {
        fsim.push(counted.eval(v)?);
    }
    sort_simplex(&mut sim, &mut fsim);

    let mut n_iter = 1usize;
    let mut converged = false;
    while counted.n_fev < max_fevals && n_iter < max_iters {
        let x_spread = sim[1..]
            .iter()
            .flat_map(|v| v.iter().zip(sim[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0f64, f64::max);
        let f_spread = fsim[1..]
            .iter()
            .map(|v| (v - fsim[0]).abs())
            .fold(0.0f64, f64::max);
        if x_spread <= config.xatol && f_spread <= config.fatol {
            converged = true;
            break;
        }

        let mut xbar = vec![0.0f64; dim];
        for v in &sim[..dim] {
            for (acc, x) in xbar.iter_mut().zip(v.iter()) {
                *acc += x / dim as f64;
            }
        }
        let worst = sim[dim].clone();
        let affine = |c: f64| -> Vec<f64> {
            xbar.iter()
                .zip(worst.iter())
                .map(|(b, w)| (1.0 + c) * b - c * w)
                .collect()
        };

        let xr = affine(RHO);
        let fxr = counted.eval(&xr)?;
        let mut shrink = false;

        if fxr < fsim[0] {
            let xe = affine(RHO * CHI);
            let fxe = counted.eval(&xe)?;
            if fxe < fxr {
                sim[dim] = xe;
                fsim[dim] = fxe;
            } else {
                sim[dim] = xr;
                fsim[dim] = fxr;
            }
        } else if fxr < fsim[dim - 1] {
            sim[dim] = xr;
            fsim[dim] = fxr;
        } else if fxr < fsim[dim] {
            let xc = affine(PSI * RHO);
            let fxc = counted.eval(&xc)?;
            if fxc <= fxr {
                sim[dim] = xc;
                fsim[dim] = fxc;
            } else {
                shrink = true;
            }
        } else {
            let xcc = affine(-PSI);
            let fxcc = counted.eval(&xcc)?;
            if fxcc < fsim[dim] {
                sim[dim] = xcc;
                fsim[dim] = fxcc;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = sim[0].clone();
            for j in 1..n_vert {
                for (x, b) in sim[j].iter_mut().zip(best.iter()) {
                    *x = b + SIGMA * (*x - b);
                }
                fsim[j] = counted.eval(&sim[j])?;
            }
        }

        sort_simplex(&mut sim, &mut fsim);
        n_iter += 1;
    }

    if let Some(pb) = counted.pb.take() {
        pb.finish_with_message(format!("Nelder-Mead done ({} evals)", counted.n_fev));
    }

    Ok(Minimum {
        x: sim.swap_remove(0),
        fun: fsim[0],
        n_iter,
        n_fev: counted.n_fev,
        converged,
    })
}

fn sort_simplex(sim: &mut Vec<Vec<f64>>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *sim = order.iter().map(|&i| sim[i].clone()).collect();
    *fsim = order.iter().map(|&i| fsim[i]).collect();
}

/// Starting simplex for `k` free coefficients, shape `(k + 1, k)`.
pub fn initial_simplex(k: usize) -> Result<Array2<f64>> {
    match k {
        0 => bail!("at least 2 time-bin breakpoints are required to fit selection"),
        1 => Ok(Array2::from_shape_vec((2, 1), vec![-0.05, 0.05])?),
        _ => {
            let mut s = Array2::from_elem((k + 1, k), -0.01);
            for i in 0..k {
                s[(i, i)] = 0.01;
            }
            s.row_mut(k).fill(0.01);
            Ok(s)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feasibility {
    Feasible,
    OutOfBounds { index: usize, value: f64 },
}

/// Negative log-likelihood of a selection schedule for one locus.
pub struct SelectionObjective<'a> {
    pub model: &'a SelectionModel,
    pub data: &'a LocusData,
    pub tables: &'a NormalTables,
}

impl<'a> SelectionObjective<'a> {
    pub fn new(model: &'a SelectionModel, data: &'a LocusData, tables: &'a NormalTables) -> Self {
        Self {
            model,
            data,
            tables,
        }
    }

    /// Checks `theta` plus the anchored trailing 0 against `sMax`.
    pub fn check(&self, theta: &[f64]) -> Feasibility {
        for (index, &value) in theta.iter().chain(std::iter::once(&0.0)).enumerate() {
            if !(value.abs() <= self.model.s_max) {
                return Feasibility::OutOfBounds { index, value };
            }
        }
        Feasibility::Feasible
    }

    fn transitions(&self, theta: &[f64]) -> Result<TransitionSet> {
        let sel = self.model.selection_per_row(theta)?;
        TransitionSet::build(self.model, &sel, self.tables)
    }

    /// `+inf` outside the feasible region; the lattice is not touched then.
    pub fn negative_log_likelihood(&self, theta: &[f64]) -> Result<f64> {
        if let Feasibility::OutOfBounds { index, value } = self.check(theta) {
            log::trace!("theta[{index}] = {value} exceeds sMax; objective is +inf");
            return Ok(f64::INFINITY);
        }
        let trans = self.transitions(theta)?;
        let ctx = LatticeContext::new(self.model, self.data, &trans);
        let nll = -aggregate_log_likelihood(&ctx)?;
        log::debug!("theta = {theta:?}, -logL = {nll:.6}");
        Ok(nll)
    }

    /// `(F, T)` log posterior of the frequency trajectory at `theta`.
    pub fn posterior(&self, theta: &[f64]) -> Result<Array2<f64>> {
        if let Feasibility::OutOfBounds { index, value } = self.check(theta) {
            bail!(
                "selection coefficient {value} (bin {index}) exceeds sMax = {}; consider a larger --s-max",
                self.model.s_max
            );
        }
        let trans = self.transitions(theta)?;
        let ctx = LatticeContext::new(self.model, self.data, &trans);
        Ok(aggregate_posterior(&ctx)?.1)
    }
}

#[derive(Debug, Clone)]
pub struct SelectionFit {
    pub s_hat: Vec<f64>,
    pub neg_loglike: f64,
    pub neutral_neg_loglike: f64,
    pub loglr: f64,
    pub posterior: Array2<f64>,
    pub n_iter: usize,
    pub n_fev: usize,
    pub converged: bool,
}

pub fn fit_selection(
    objective: &SelectionObjective<'_>,
    config: &NelderMeadConfig,
) -> Result<SelectionFit> {
    let k = objective.model.n_free_params();
    let simplex = initial_simplex(k)?;

    let neutral = vec![0.0; k];
    let neutral_nll = objective.negative_log_likelihood(&neutral)?;
    if !neutral_nll.is_finite() {
        bail!("neutral log-likelihood is not finite ({neutral_nll}); check the input data");
    }
    if let Realizations::Multiple(draws) = &objective.data.realizations {
        log::info!("importance sampling with M = {} realizations", draws.len());
    }

    let mut f = |theta: &[f64]| objective.negative_log_likelihood(theta);
    let min = nelder_mead(&mut f, simplex, config)?;
    if !min.fun.is_finite() {
        bail!("optimizer did not reach a finite likelihood");
    }
    if !min.converged {
        log::warn!(
            "Nelder-Mead stopped after {} iterations / {} evaluations without meeting tolerance",
            min.n_iter,
            min.n_fev
        );
    }
    let s_max = objective.model.s_max;
    if min.x.iter().any(|s| s.abs() > 0.99 * s_max) {
        log::warn!("selection estimate is close to sMax = {s_max}; consider a larger --s-max");
    }

    let posterior = objective.posterior(&min.x)?;
    Ok(SelectionFit {
        loglr: neutral_nll - min.fun,
        s_hat: min.x,
        neg_loglike: min.fun,
        neutral_neg_loglike: neutral_nll,
        posterior,
        n_iter: min.n_iter,
        n_fev: min.n_fev,
        converged: min.converged,
    })
}
