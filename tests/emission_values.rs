use clues_rs::emission::{
    add_ancient_emissions, add_modern_sample, coalescent_emissions, emission_matrix,
    log_coal_density, proposal_log_density,
};
use clues_rs::evidence::{AncientSamples, DiploidRecord, Genealogy, HaploidRecord};
use clues_rs::model::{EpochGrid, FreqGrid, SelectionModel};
use ndarray::Array2;

fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "expected {a} ~= {b} within eps={eps}, got diff={}",
        (a - b).abs()
    );
}

/// Rows `[0, 10)` with N = 100 and `[10, 20)` with N = 50; bins 0.1, 0.5, 0.9.
fn two_row_model(current_freq: Option<f64>) -> SelectionModel {
    let epochs = EpochGrid::new(vec![0.0, 10.0, 20.0]).expect("epochs");
    let freqs = FreqGrid::new(vec![0.1, 0.5, 0.9]).expect("freqs");
    SelectionModel::new(freqs, epochs, vec![100.0, 50.0], vec![0.0, 20.0], 0.1, current_freq)
        .expect("model init failed")
}

/// Two derived lineages merging at 5, two ancestral ones merging at 15.
fn genealogy() -> Genealogy {
    Genealogy::new(2, 2, &[5.0], &[15.0]).expect("genealogy")
}

#[test]
fn coal_density_matches_hand_computation() {
    // One pair, rate 1/50, merging 2 generations in; nothing left to survive.
    approx_eq(
        log_coal_density(&[2.0], 2, 0.0, 10.0, 50.0),
        -(50.0f64).ln() - 2.0 / 50.0,
        1e-12,
    );

    // Three lineages: 3 pairs until t = 1, then one pair until t = 4.
    let expected =
        (3.0f64 / 20.0).ln() - 3.0 / 20.0 * 1.0 + (1.0f64 / 20.0).ln() - 1.0 / 20.0 * 3.0;
    approx_eq(log_coal_density(&[1.0, 4.0], 3, 0.0, 10.0, 20.0), expected, 1e-12);

    // No events: survival of all 3 pairs over the whole interval.
    approx_eq(log_coal_density(&[], 3, 0.0, 10.0, 20.0), -1.5, 1e-12);
    // Survival is counted from the last event to the interval end.
    approx_eq(
        log_coal_density(&[4.0], 3, 2.0, 10.0, 20.0),
        (3.0f64 / 20.0).ln() - 3.0 / 20.0 * 2.0 - 1.0 / 20.0 * 6.0,
        1e-12,
    );

    assert_eq!(log_coal_density(&[1.0, 2.0], 2, 0.0, 10.0, 20.0), f64::NEG_INFINITY);
    assert_eq!(log_coal_density(&[], 1, 0.0, 10.0, 20.0), 0.0);
}

#[test]
fn coalescent_emissions_scale_with_allele_copies() {
    let model = two_row_model(None);
    let em = coalescent_emissions(&genealogy(), &model);
    assert_eq!(em.dim(), (2, 3));

    // Row 0, 2N = 200: the derived pair merges at 5, the ancestral pair survives.
    let row0 = |x: f64| {
        let (der, anc) = (200.0 * x, 200.0 * (1.0 - x));
        -der.ln() - 5.0 / der - 10.0 / anc
    };
    approx_eq(em[(0, 1)], row0(0.5), 1e-12);
    approx_eq(em[(0, 2)], row0(0.9), 1e-12);

    // Row 1, 2N = 100: one derived lineage left, the ancestral pair merges at 15.
    let row1 = |x: f64| {
        let anc = 100.0 * (1.0 - x);
        -anc.ln() - 5.0 / anc
    };
    approx_eq(em[(1, 1)], row1(0.5), 1e-12);
    approx_eq(em[(1, 2)], row1(0.9), 1e-12);
}

#[test]
fn lost_bin_requires_a_single_derived_lineage() {
    let model = two_row_model(None);
    let em = coalescent_emissions(&genealogy(), &model);

    // Two derived lineages still present in row 0.
    assert_eq!(em[(0, 0)], f64::NEG_INFINITY);

    // Row 1: the surviving derived lineage joins the two ancestral ones; three
    // pairs at rate 1/100 until 15, then one pair survives to 20.
    let expected = (3.0f64 / 100.0).ln() - 3.0 / 100.0 * 5.0 - 1.0 / 100.0 * 5.0;
    approx_eq(em[(1, 0)], expected, 1e-12);
}

#[test]
fn ancient_genotype_likelihoods_use_hardy_weinberg_and_haploid_terms() {
    let model = two_row_model(None);
    let ancient = AncientSamples {
        diploid: vec![DiploidRecord {
            time: 12.0,
            log_gl: [0.2f64.ln(), 0.3f64.ln(), 0.5f64.ln()],
        }],
        haploid: vec![HaploidRecord {
            time: 3.0,
            log_gl: [0.6f64.ln(), 0.4f64.ln()],
        }],
    };
    let mut out = Array2::zeros((2, 3));
    add_ancient_emissions(&ancient, &model, &mut out);

    // 0.2 (1-x)^2 + 0.3 * 2x(1-x) + 0.5 x^2 at x = 0.5 and x = 0.1.
    approx_eq(out[(1, 1)], 0.325f64.ln(), 1e-12);
    approx_eq(out[(1, 0)], (0.2 * 0.81 + 0.3 * 0.18 + 0.5 * 0.01f64).ln(), 1e-12);
    // 0.6 (1-x) + 0.4 x at x = 0.9.
    approx_eq(out[(0, 2)], 0.42f64.ln(), 1e-12);
    // The diploid sample never touches row 0, the haploid one never row 1.
    approx_eq(out[(0, 1)], (0.6 * 0.5 + 0.4 * 0.5f64).ln(), 1e-12);
    approx_eq(out[(1, 2)], (0.2 * 0.01 + 0.3 * 0.18 + 0.5 * 0.81f64).ln(), 1e-12);

    let late = AncientSamples {
        diploid: vec![DiploidRecord {
            time: 25.0,
            log_gl: [0.2f64.ln(), 0.3f64.ln(), 0.5f64.ln()],
        }],
        haploid: Vec::new(),
    };
    let mut out = Array2::zeros((2, 3));
    add_ancient_emissions(&late, &model, &mut out);
    assert!(out.iter().all(|v| *v == 0.0));
}

#[test]
fn modern_sample_adds_binomial_to_present_row() {
    let model = two_row_model(None);
    let mut out = Array2::zeros((2, 3));
    add_modern_sample(&genealogy(), &model, &mut out);

    // C(4, 2) x^2 (1 - x)^2.
    approx_eq(out[(0, 0)], (6.0 * 0.01 * 0.81f64).ln(), 1e-12);
    approx_eq(out[(0, 1)], (6.0 * 0.0625f64).ln(), 1e-12);
    approx_eq(out[(0, 2)], (6.0 * 0.81 * 0.01f64).ln(), 1e-12);
    assert!(out.row(1).iter().all(|v| *v == 0.0));
}

#[test]
fn known_present_frequency_drops_binomial_term() {
    let g = genealogy();
    let free = emission_matrix(Some(&g), &AncientSamples::default(), &two_row_model(None));
    let pinned = emission_matrix(Some(&g), &AncientSamples::default(), &two_row_model(Some(0.5)));

    approx_eq(free[(0, 1)] - pinned[(0, 1)], (6.0 * 0.0625f64).ln(), 1e-12);
    approx_eq(free[(1, 1)], pinned[(1, 1)], 0.0);

    let none = emission_matrix(None, &AncientSamples::default(), &two_row_model(None));
    assert!(none.iter().all(|v| *v == 0.0));
}

#[test]
fn proposal_pools_lineages_under_neutral_coalescent() {
    let model = two_row_model(None);
    // Row 0: four lineages (6 pairs) at rate 1/200, one merge at 5, then three
    // lineages survive to 10. Row 1: three lineages at rate 1/100, one merge
    // at 15, then one pair survives to 20.
    let row0 = (6.0f64 / 200.0).ln() - 6.0 / 200.0 * 5.0 - 3.0 / 200.0 * 5.0;
    let row1 = (3.0f64 / 100.0).ln() - 3.0 / 100.0 * 5.0 - 1.0 / 100.0 * 5.0;
    approx_eq(proposal_log_density(&genealogy(), &model), row0 + row1, 1e-12);
}
