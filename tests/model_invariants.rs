use clues_rs::NormalTables;
use clues_rs::model::{EpochGrid, FreqGrid, SelectionModel};
use clues_rs::transition::{TransitionSet, log_transition_matrix};
use clues_rs::utils::logsumexp;

fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "expected {a} ~= {b} within eps={eps}, got diff={}",
        (a - b).abs()
    );
}

fn model_with_bins(time_bins: Vec<f64>) -> anyhow::Result<SelectionModel> {
    let epochs = EpochGrid::generations(60.0)?;
    let freqs = FreqGrid::uniform(15, 1000.0)?;
    SelectionModel::new(freqs, epochs, vec![1000.0; 60], time_bins, 0.1, None)
}

#[test]
fn freq_grid_spans_symmetric_interior() {
    let grid = FreqGrid::uniform(5, 10_000.0).expect("grid init failed");
    let f = grid.values();
    assert_eq!(f.len(), 5);
    approx_eq(f[0], 5e-5, 1e-15);
    approx_eq(f[4], 1.0 - 5e-5, 1e-15);
    approx_eq(f[2], 0.5, 1e-12);
    assert_eq!(grid.nearest(0.49), 2);

    let capped = FreqGrid::uniform(5, 1e7).expect("grid init failed");
    approx_eq(capped.values()[0], 5e-6, 1e-18);
}

#[test]
fn model_rejects_fewer_than_two_time_bins() {
    let err = model_with_bins(vec![0.0]).expect_err("expected time-bin error");
    assert!(
        err.to_string()
            .contains("at least 2 time-bin breakpoints are required")
    );
}

#[test]
fn model_rejects_mismatched_population_schedule() {
    let epochs = EpochGrid::generations(10.0).expect("epochs");
    let freqs = FreqGrid::uniform(7, 1000.0).expect("freqs");
    let err = SelectionModel::new(freqs, epochs, vec![1000.0; 9], vec![0.0, 10.0], 0.1, None)
        .expect_err("expected schedule length error");
    assert!(err.to_string().contains("population size schedule has 9 entries"));
}

#[test]
fn selection_broadcast_uses_right_open_bins_and_zero_anchor() {
    let model = model_with_bins(vec![10.0, 20.0, 40.0]).expect("model init failed");
    let sel = model
        .selection_per_row(&[0.03, -0.02])
        .expect("broadcast failed");
    assert_eq!(sel.len(), 60);
    assert_eq!(sel[9], 0.0);
    assert_eq!(sel[10], 0.03);
    assert_eq!(sel[19], 0.03);
    assert_eq!(sel[20], -0.02);
    assert_eq!(sel[39], -0.02);
    assert_eq!(sel[40], 0.0);
    assert_eq!(sel[59], 0.0);

    assert!(model.selection_per_row(&[0.01]).is_err());
}

#[test]
fn standard_tables_match_normal_distribution() {
    let tables = NormalTables::standard();
    approx_eq(tables.logcdf(0.0), 0.5f64.ln(), 1e-9);
    approx_eq(tables.logsf(0.0), 0.5f64.ln(), 1e-9);
    approx_eq(tables.logsf(1.959964), 0.025f64.ln(), 1e-5);
    approx_eq(tables.logcdf(-10.0), -53.231_285_150_5, 1e-4);
    approx_eq(tables.logcdf(10.0), 0.0, 1e-12);
    let (lo, hi) = tables.z_range();
    assert!(lo <= -40.0 && hi >= 40.0);
}

#[test]
fn tables_reject_inconsistent_lengths() {
    let err = NormalTables::new(vec![-1.0, 0.0, 1.0], vec![-2.0, -0.7], vec![-0.1, -0.7, -2.0])
        .expect_err("expected length error");
    assert!(err.to_string().contains("z table lengths differ"));
}

#[test]
fn transition_rows_are_distributions() {
    let tables = NormalTables::standard();
    let freqs = FreqGrid::uniform(25, 10_000.0).expect("grid init failed");
    for &s in &[-0.1, 0.0, 0.05, 0.1] {
        for &n in &[50.0, 1000.0, 10_000.0] {
            let a = log_transition_matrix(s, n, 1.0, &freqs, &tables);
            assert_eq!(a.dim(), (25, 25));
            for i in 0..25 {
                let row: Vec<f64> = a.row(i).to_vec();
                approx_eq(logsumexp(&row), 0.0, 1e-10);
                assert!(row.iter().all(|v| !v.is_nan()));
            }
            approx_eq(a[(0, 0)], 0.0, 0.0);
            approx_eq(a[(24, 24)], 0.0, 0.0);
        }
    }
}

#[test]
fn positive_selection_lowers_older_frequency() {
    let tables = NormalTables::standard();
    let freqs = FreqGrid::uniform(41, 1000.0).expect("grid init failed");
    let mean_dest = |s: f64| -> f64 {
        let a = log_transition_matrix(s, 1000.0, 1.0, &freqs, &tables);
        a.row(20)
            .iter()
            .zip(freqs.values())
            .map(|(lp, f)| lp.exp() * f)
            .sum()
    };
    let neutral = mean_dest(0.0);
    approx_eq(neutral, freqs.values()[20], 1e-6);
    assert!(mean_dest(0.1) < neutral - 0.01);
    assert!(mean_dest(-0.1) > neutral + 0.01);
}

#[test]
fn transition_set_shares_identical_steps() {
    let tables = NormalTables::standard();
    let model = model_with_bins(vec![0.0, 30.0, 60.0]).expect("model init failed");
    let sel = model
        .selection_per_row(&[0.02, -0.01])
        .expect("broadcast failed");
    let set = TransitionSet::build(&model, &sel, &tables).expect("build failed");
    assert_eq!(set.n_steps(), 59);
    assert_eq!(set.n_distinct(), 2);
    assert_eq!(set.step(0), set.step(29));
    assert_ne!(set.step(29), set.step(30));
}
