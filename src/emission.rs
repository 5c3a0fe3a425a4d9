use ndarray::Array2;

use crate::evidence::{AncientSamples, Genealogy};
use crate::model::SelectionModel;
use crate::utils::{ln_choose, logsumexp};

/// Log-density of the coalescences `times` (sorted, all inside
/// `[start, end)`) among `k` lineages in an interval where each pair
/// coalesces at rate `1 / copies`, including the probability that the
/// remaining lineages survive to `end`.
pub fn log_coal_density(times: &[f64], k: usize, start: f64, end: f64, copies: f64) -> f64 {
    let rate = 1.0 / copies;
    let mut k = k;
    let mut prev = start;
    let mut logp = 0.0;
    for &t in times {
        if k < 2 {
            return f64::NEG_INFINITY;
        }
        let pairs = (k * (k - 1)) as f64 / 2.0;
        logp += (pairs * rate).ln() - pairs * rate * (t - prev);
        prev = t;
        k -= 1;
    }
    if k >= 2 {
        let pairs = (k * (k - 1)) as f64 / 2.0;
        logp -= pairs * rate * (end - prev);
    }
    logp
}

fn times_in(times: &[f64], start: f64, end: f64) -> &[f64] {
    let lo = times.partition_point(|t| *t < start);
    let hi = times.partition_point(|t| *t < end);
    &times[lo..hi]
}

/// Coalescent log-likelihoods, shape `(T, F)`.
pub fn coalescent_emissions(genealogy: &Genealogy, model: &SelectionModel) -> Array2<f64> {
    let freqs = model.freqs.values();
    let lf = freqs.len();
    let mut out = Array2::zeros((model.n_rows(), lf));

    for t in 0..model.n_rows() {
        let (start, end) = (model.epochs.start(t), model.epochs.end(t));
        let two_n = 2.0 * model.pop_sizes[t];
        let k_der = genealogy.derived_remaining(start);
        let k_anc = genealogy.ancestral_remaining(start);
        let der = times_in(genealogy.derived_times(), start, end);
        let anc = times_in(genealogy.ancestral_times(), start, end);

        // Lost: older than the mutation, so the last derived lineage has
        // merged into the ancestral background.
        out[(t, 0)] = if k_der > 1 {
            f64::NEG_INFINITY
        } else {
            log_coal_density(anc, k_anc + k_der, start, end, two_n)
        };
        for j in 1..lf {
            let x = freqs[j];
            out[(t, j)] = log_coal_density(der, k_der, start, end, two_n * x)
                + log_coal_density(anc, k_anc, start, end, two_n * (1.0 - x));
        }
    }
    out
}

/// Ancient genotype-likelihood contributions added onto `out` (`(T, F)`).
pub fn add_ancient_emissions(
    ancient: &AncientSamples,
    model: &SelectionModel,
    out: &mut Array2<f64>,
) {
    let freqs = model.freqs.values();
    for rec in &ancient.diploid {
        let Some(t) = model.epochs.row_of(rec.time) else {
            log::debug!("ancient sample at {} lies beyond the time cutoff; skipped", rec.time);
            continue;
        };
        for (j, &x) in freqs.iter().enumerate() {
            let geno = [
                2.0 * (1.0 - x).ln(),
                std::f64::consts::LN_2 + x.ln() + (1.0 - x).ln(),
                2.0 * x.ln(),
            ];
            out[(t, j)] += logsumexp(&[
                rec.log_gl[0] + geno[0],
                rec.log_gl[1] + geno[1],
                rec.log_gl[2] + geno[2],
            ]);
        }
    }
    for rec in &ancient.haploid {
        let Some(t) = model.epochs.row_of(rec.time) else {
            log::debug!("ancient haplotype at {} lies beyond the time cutoff; skipped", rec.time);
            continue;
        };
        for (j, &x) in freqs.iter().enumerate() {
            out[(t, j)] += logsumexp(&[rec.log_gl[0] + (1.0 - x).ln(), rec.log_gl[1] + x.ln()]);
        }
    }
}

/// Binomial log-probability of the present-day sample composition.
pub fn add_modern_sample(genealogy: &Genealogy, model: &SelectionModel, out: &mut Array2<f64>) {
    let (n, m) = (genealogy.n_derived, genealogy.n_ancestral);
    let base = ln_choose(n + m, n);
    for (j, &x) in model.freqs.values().iter().enumerate() {
        out[(0, j)] += base + n as f64 * x.ln() + m as f64 * (1.0 - x).ln();
    }
}

/// Full observation log-likelihood lattice, shape `(T, F)`.
pub fn emission_matrix(
    genealogy: Option<&Genealogy>,
    ancient: &AncientSamples,
    model: &SelectionModel,
) -> Array2<f64> {
    let mut out = match genealogy {
        Some(g) => {
            let mut e = coalescent_emissions(g, model);
            if model.current_freq.is_none() {
                add_modern_sample(g, model, &mut e);
            }
            e
        }
        None => Array2::zeros((model.n_rows(), model.n_freqs())),
    };
    add_ancient_emissions(ancient, model, &mut out);
    out
}

/// Log-density of the genealogy under the neutral coalescent with the
/// model's population sizes, ignoring allele labels.
pub fn proposal_log_density(genealogy: &Genealogy, model: &SelectionModel) -> f64 {
    let mut pooled: Vec<f64> = genealogy
        .derived_times()
        .iter()
        .chain(genealogy.ancestral_times())
        .copied()
        .collect();
    pooled.sort_by(|a, b| a.total_cmp(b));
    let total = genealogy.n_derived + genealogy.n_ancestral;

    let mut logp = 0.0;
    for t in 0..model.n_rows() {
        let (start, end) = (model.epochs.start(t), model.epochs.end(t));
        let k = total - pooled.partition_point(|v| *v < start);
        let events = times_in(&pooled, start, end);
        logp += log_coal_density(events, k, start, end, 2.0 * model.pop_sizes[t]);
    }
    logp
}
