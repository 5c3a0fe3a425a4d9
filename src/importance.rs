//! Combines the passes of every realization of a locus into one likelihood
//! and one posterior.
//!
//! A single realization (or none, when only ancient samples are given)
//! takes the direct path. With `M > 1` each draw is reweighted by its
//! neutral proposal density:
//!
//! ```text
//! logL = -ln M + lse_i(logl_i - proposal_i)
//! ```

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Zip};
use rayon::prelude::*;

use crate::emission::{emission_matrix, proposal_log_density};
use crate::evidence::{Genealogy, LocusData, Realizations};
use crate::hmm::{self, backward, forward, normalize_columns};
use crate::model::SelectionModel;
use crate::transition::TransitionSet;
use crate::utils::logsumexp;

/// Shared, read-only inputs of one objective evaluation.
pub struct LatticeContext<'a> {
    pub model: &'a SelectionModel,
    pub data: &'a LocusData,
    pub trans: &'a TransitionSet,
    pub prior: Array1<f64>,
}

impl<'a> LatticeContext<'a> {
    pub fn new(model: &'a SelectionModel, data: &'a LocusData, trans: &'a TransitionSet) -> Self {
        Self {
            model,
            data,
            trans,
            prior: hmm::log_prior(model),
        }
    }

    fn emissions(&self, genealogy: Option<&Genealogy>) -> Array2<f64> {
        emission_matrix(genealogy, &self.data.ancient, self.model)
    }

    fn direct_loglike(&self, genealogy: Option<&Genealogy>) -> Result<f64> {
        let em = self.emissions(genealogy);
        Ok(backward(&self.prior, self.trans, &em)?.loglike)
    }

    fn direct_posterior(&self, genealogy: Option<&Genealogy>) -> Result<(f64, Array2<f64>)> {
        let em = self.emissions(genealogy);
        let bwd = backward(&self.prior, self.trans, &em)?;
        let fwd = forward(&self.prior, self.trans, &em)?;
        Ok((bwd.loglike, hmm::posterior(&fwd.alpha, &bwd.beta)))
    }

    fn importance_weight(&self, genealogy: &Genealogy) -> Result<f64> {
        let logl = self.direct_loglike(Some(genealogy))?;
        Ok(logl - proposal_log_density(genealogy, self.model))
    }
}

/// Log-likelihood of the locus.
pub fn aggregate_log_likelihood(ctx: &LatticeContext<'_>) -> Result<f64> {
    match &ctx.data.realizations {
        Realizations::NoEvidence => ctx.direct_loglike(None),
        Realizations::Single(g) => ctx.direct_loglike(Some(g)),
        Realizations::Multiple(draws) if draws.is_empty() => bail!("realization set is empty"),
        Realizations::Multiple(draws) => {
            let weights = draws
                .par_iter()
                .map(|g| ctx.importance_weight(g))
                .collect::<Result<Vec<f64>>>()?;
            Ok(-(draws.len() as f64).ln() + logsumexp(&weights))
        }
    }
}

/// Log-likelihood and `(F, T)` log posterior of the locus.
pub fn aggregate_posterior(ctx: &LatticeContext<'_>) -> Result<(f64, Array2<f64>)> {
    match &ctx.data.realizations {
        Realizations::NoEvidence => ctx.direct_posterior(None),
        Realizations::Single(g) => ctx.direct_posterior(Some(g)),
        Realizations::Multiple(draws) if draws.is_empty() => bail!("realization set is empty"),
        Realizations::Multiple(draws) => {
            let parts = draws
                .par_iter()
                .map(|g| {
                    let (logl, post) = ctx.direct_posterior(Some(g))?;
                    Ok((logl - proposal_log_density(g, ctx.model), post))
                })
                .collect::<Result<Vec<(f64, Array2<f64>)>>>()?;
            let weights: Vec<f64> = parts.iter().map(|(w, _)| *w).collect();
            let loglike = -(draws.len() as f64).ln() + logsumexp(&weights);

            let mut post = combine_weighted(&parts);
            normalize_columns(&mut post);
            Ok((loglike, post))
        }
    }
}

fn combine_weighted(parts: &[(f64, Array2<f64>)]) -> Array2<f64> {
    let dim = parts[0].1.dim();
    let mut max = Array2::from_elem(dim, f64::NEG_INFINITY);
    for (w, post) in parts {
        Zip::from(&mut max).and(post).for_each(|m, &p| *m = m.max(w + p));
    }
    let mut acc = Array2::<f64>::zeros(dim);
    for (w, post) in parts {
        Zip::from(&mut acc)
            .and(&max)
            .and(post)
            .for_each(|a, &m, &p| {
                if m.is_finite() {
                    *a += (w + p - m).exp();
                }
            });
    }
    Zip::from(&mut acc).and(&max).for_each(|a, &m| {
        *a = if m.is_finite() { m + a.ln() } else { f64::NEG_INFINITY };
    });
    acc
}
