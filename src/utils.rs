pub fn logsumexp(vals: &[f64]) -> f64 {
    logsumexp_iter(vals.iter().copied())
}

/// `logsumexp` over any re-iterable sequence; used on ndarray lanes without
/// collecting them first.
pub fn logsumexp_iter<I>(vals: I) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    let mut max = f64::NEG_INFINITY;
    for v in vals.clone() {
        if v > max {
            max = v;
        }
    }
    if !max.is_finite() {
        return max;
    }
    let mut sum = 0.0;
    for v in vals {
        sum += (v - max).exp();
    }
    max + sum.ln()
}

/// `ln(exp(a) - exp(b))` for `a >= b`.
pub fn log_diff_exp(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        return a;
    }
    if b >= a {
        return f64::NEG_INFINITY;
    }
    a + (-(b - a).exp()).ln_1p()
}

/// Index of the right-open interval `[edges[k], edges[k+1])` containing `x`,
/// or `None` when `x` falls outside `[edges[0], edges[last])`.
pub fn digitize(x: f64, edges: &[f64]) -> Option<usize> {
    let pos = edges.partition_point(|e| *e <= x);
    if pos == 0 || pos >= edges.len() {
        None
    } else {
        Some(pos - 1)
    }
}

pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// `ln C(n, k)`.
pub fn ln_choose(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let k = k.min(n - k);
    let mut acc = 0.0;
    for i in 0..k {
        acc += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
    }
    acc
}
