//! Log-space forward/backward recursions over the `(T, F)` lattice.
//!
//! Row 0 is the present; the chain runs backwards in time, so `forward`
//! moves from the present into the past and `backward` from the cutoff
//! towards the present.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Axis};

use crate::model::SelectionModel;
use crate::transition::TransitionSet;
use crate::utils::logsumexp_iter;

#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `(T, F)`
    pub alpha: Array2<f64>,
    pub loglike: f64,
}

#[derive(Debug, Clone)]
pub struct BackwardPass {
    /// `(T, F)`
    pub beta: Array2<f64>,
    pub loglike: f64,
}

/// Present-day log prior over frequency bins.
pub fn log_prior(model: &SelectionModel) -> Array1<f64> {
    let lf = model.n_freqs();
    match model.current_freq {
        Some(p) => {
            let mut prior = Array1::from_elem(lf, f64::NEG_INFINITY);
            prior[model.freqs.nearest(p)] = 0.0;
            prior
        }
        None => Array1::from_elem(lf, -(lf as f64).ln()),
    }
}

fn check_shapes(prior: &Array1<f64>, trans: &TransitionSet, emissions: &Array2<f64>) -> Result<()> {
    let (n_rows, lf) = emissions.dim();
    if n_rows == 0 {
        bail!("emission lattice has no rows");
    }
    if prior.len() != lf {
        bail!("prior has {} bins, emissions have {}", prior.len(), lf);
    }
    if trans.n_steps() + 1 != n_rows {
        bail!(
            "transition set covers {} steps, lattice needs {}",
            trans.n_steps(),
            n_rows - 1
        );
    }
    Ok(())
}

pub fn forward(
    prior: &Array1<f64>,
    trans: &TransitionSet,
    emissions: &Array2<f64>,
) -> Result<ForwardPass> {
    check_shapes(prior, trans, emissions)?;
    let (n_rows, lf) = emissions.dim();
    let mut alpha = Array2::from_elem((n_rows, lf), f64::NEG_INFINITY);

    for f in 0..lf {
        alpha[(0, f)] = prior[f] + emissions[(0, f)];
    }
    for t in 0..n_rows - 1 {
        let a = trans.step(t);
        for f in 0..lf {
            let prev = alpha.row(t);
            let col = a.column(f);
            let acc = logsumexp_iter(prev.iter().zip(col.iter()).map(|(p, q)| p + q));
            alpha[(t + 1, f)] = acc + emissions[(t + 1, f)];
        }
    }

    let loglike = logsumexp_iter(alpha.row(n_rows - 1).iter().copied());
    Ok(ForwardPass { alpha, loglike })
}

pub fn backward(
    prior: &Array1<f64>,
    trans: &TransitionSet,
    emissions: &Array2<f64>,
) -> Result<BackwardPass> {
    check_shapes(prior, trans, emissions)?;
    let (n_rows, lf) = emissions.dim();
    let mut beta = Array2::zeros((n_rows, lf));
    let mut next = vec![0.0f64; lf];

    for t in (0..n_rows - 1).rev() {
        let a = trans.step(t);
        for (g, slot) in next.iter_mut().enumerate() {
            *slot = emissions[(t + 1, g)] + beta[(t + 1, g)];
        }
        for f in 0..lf {
            let row = a.row(f);
            beta[(t, f)] = logsumexp_iter(row.iter().zip(next.iter()).map(|(p, q)| p + q));
        }
    }

    let loglike = logsumexp_iter((0..lf).map(|f| prior[f] + emissions[(0, f)] + beta[(0, f)]));
    Ok(BackwardPass { beta, loglike })
}

/// Per-epoch normalized log posterior, shape `(F, T)`.
pub fn posterior(alpha: &Array2<f64>, beta: &Array2<f64>) -> Array2<f64> {
    let mut post = (alpha + beta).reversed_axes();
    normalize_columns(&mut post);
    post
}

/// Shifts every column of an `(F, T)` log matrix so it has logsumexp 0.
pub fn normalize_columns(post: &mut Array2<f64>) {
    for mut col in post.axis_iter_mut(Axis(1)) {
        let norm = logsumexp_iter(col.iter().copied());
        if norm.is_finite() {
            col.mapv_inplace(|v| v - norm);
        }
    }
}
