//! Small robust statistics shared by the segmenters and the report.

/// Median of the values; `None` when empty. Even counts average the middle pair.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Median of the finite values among the last `window` entries ending at `index`.
pub fn trailing_median(values: &[f64], index: usize, window: usize) -> Option<f64> {
    let start = (index + 1).saturating_sub(window.max(1));
    let finite: Vec<f64> = values[start..=index]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    median(&finite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn std_dev_of_constant_is_zero() {
        assert_eq!(std_dev(&[2.0, 2.0, 2.0]), Some(0.0));
        assert!((std_dev(&[1.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn trailing_window_shrinks_at_the_start() {
        let v = [60.0, 62.0, 60.0, 60.0, 62.0, 62.0, 62.0, 62.0];
        assert_eq!(trailing_median(&v, 0, 7), Some(60.0));
        assert_eq!(trailing_median(&v, 1, 7), Some(61.0));
        assert_eq!(trailing_median(&v, 7, 7), Some(62.0));
        assert_eq!(trailing_median(&[f64::NAN, 5.0], 1, 7), Some(5.0));
        assert_eq!(trailing_median(&[f64::NAN], 0, 7), None);
    }
}
