use anyhow::{Result, anyhow};
use statrs::statistics::Statistics;

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Mean of the trailing `window` values. `None` until `window` observations
/// exist or when the window holds a non-finite value.
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    if !all_finite(tail) {
        return None;
    }
    Some(tail.mean())
}

/// Sample standard deviation (n - 1) of the trailing `window` values.
pub fn trailing_std(values: &[f64], window: usize) -> Option<f64> {
    if window < 2 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    if !all_finite(tail) {
        return None;
    }
    Some(tail.std_dev())
}

/// Rolling mean aligned with the input; entries before the first full window
/// are `None`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| trailing_mean(&values[..=i], window))
        .collect()
}

/// Rolling sample standard deviation aligned with the input.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| trailing_std(&values[..=i], window))
        .collect()
}

/// Quantile with linear interpolation between closest ranks, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(anyhow!("Cannot calculate quantile of empty series"));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(anyhow!("Quantile must be within [0, 1], got {}", q));
    }
    if !all_finite(values) {
        return Err(anyhow!("Cannot calculate quantile of non-finite values"));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Upper outlier fence `Q3 + multiplier * (Q3 - Q1)` over a whole batch.
pub fn iqr_threshold(values: &[f64], multiplier: f64) -> Result<f64> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    Ok(q3 + multiplier * (q3 - q1))
}
