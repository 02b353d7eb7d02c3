//! Small numeric helpers shared by the normalizer and the deviation engine.

/// Median of `values`. None for an empty slice.
///
/// Uses `total_cmp`, so callers are expected to have filtered NaN already.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation around `center`.
pub fn std_dev_around(values: &[f64], center: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let variance =
        values.iter().map(|v| (v - center).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}
