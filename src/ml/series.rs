//! Column primitives for the feature pipeline
//!
//! Every function reads only positions `<= i` to produce position `i`, so a
//! derived column can never see the future. Undefined values (`None`) come
//! from warm-up windows or missing inputs and are never filled with zeros.

/// Nullable numeric column
pub type Column = Vec<Option<f64>>;

/// Added to denominators that may legitimately be zero
pub const EPSILON: f64 = 1e-12;

/// Value `k` rows back
pub fn shift(values: &[Option<f64>], k: usize) -> Column {
    (0..values.len())
        .map(|i| if i >= k { values[i - k] } else { None })
        .collect()
}

/// `x[i] - x[i-k]`
pub fn diff(values: &[Option<f64>], k: usize) -> Column {
    (0..values.len())
        .map(|i| {
            if i < k {
                return None;
            }
            match (values[i], values[i - k]) {
                (Some(cur), Some(prev)) => Some(cur - prev),
                _ => None,
            }
        })
        .collect()
}

/// Fractional change over `k` rows. A zero base yields `None`.
pub fn pct_change(values: &[Option<f64>], k: usize) -> Column {
    (0..values.len())
        .map(|i| {
            if i < k {
                return None;
            }
            match (values[i], values[i - k]) {
                (Some(cur), Some(prev)) if prev != 0.0 => Some(cur / prev - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Trailing window ending at `i`, or `None` if short or containing a gap
fn window(values: &[Option<f64>], i: usize, size: usize) -> Option<Vec<f64>> {
    if size == 0 || i + 1 < size {
        return None;
    }
    values[i + 1 - size..=i].iter().copied().collect()
}

pub fn rolling_mean(values: &[Option<f64>], size: usize) -> Column {
    (0..values.len())
        .map(|i| window(values, i, size).map(|w| mean(&w)))
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator)
pub fn rolling_std(values: &[Option<f64>], size: usize) -> Column {
    (0..values.len())
        .map(|i| window(values, i, size).and_then(|w| sample_std(&w)))
        .collect()
}

/// Exponentially weighted mean with recursive (non-adjusted) weighting.
///
/// Starts at the first defined value. Gaps carry the previous smoothed value
/// forward and the recurrence resumes on the next defined input.
pub fn ewm_mean(values: &[Option<f64>], alpha: f64) -> Column {
    let mut state: Option<f64> = None;
    values
        .iter()
        .map(|value| {
            state = match (state, value) {
                (None, Some(x)) => Some(*x),
                (Some(prev), Some(x)) => Some((1.0 - alpha) * prev + alpha * x),
                (prev, None) => prev,
            };
            state
        })
        .collect()
}

/// EMA parameterised by span (`alpha = 2 / (span + 1)`)
pub fn ema(values: &[Option<f64>], span: usize) -> Column {
    ewm_mean(values, 2.0 / (span as f64 + 1.0))
}

/// Relative Strength Index with Wilder smoothing (`alpha = 1 / period`)
pub fn rsi(values: &[Option<f64>], period: usize) -> Column {
    let delta = diff(values, 1);
    let gains: Column = delta.iter().map(|d| d.map(|d| d.max(0.0))).collect();
    let losses: Column = delta.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_mean(&gains, alpha);
    let avg_loss = ewm_mean(&losses, alpha);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) => {
                let rs = g / (l + EPSILON);
                Some(100.0 - 100.0 / (1.0 + rs))
            }
            _ => None,
        })
        .collect()
}

/// Distance from the rolling mean in rolling standard deviations
pub fn zscore(values: &[Option<f64>], size: usize) -> Column {
    let means = rolling_mean(values, size);
    let stds = rolling_std(values, size);
    values
        .iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(x, (m, s))| match (x, m, s) {
            (Some(x), Some(m), Some(s)) => Some((x - m) / (s + EPSILON)),
            _ => None,
        })
        .collect()
}

pub fn abs(values: &[Option<f64>]) -> Column {
    values.iter().map(|v| v.map(f64::abs)).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation, `None` with fewer than two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Population standard deviation (n denominator)
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
