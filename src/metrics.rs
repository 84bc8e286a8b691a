//! Accuracy metrics for demand forecasts

/// Weighted Mean Absolute Percentage Error:
/// Σ|actual − predicted| / Σ actual over rows with positive actuals.
/// With no positive actuals there is nothing to weight against and the
/// worst case 1.0 is reported.
pub fn wmape(actual: &[f64], predicted: &[f64]) -> f64 {
    let mut abs_err = 0.0;
    let mut total = 0.0;
    for (&a, &p) in actual.iter().zip(predicted) {
        if a > 0.0 {
            abs_err += (a - p).abs();
            total += a;
        }
    }
    if total == 0.0 {
        1.0
    } else {
        abs_err / total
    }
}

/// Confidence derived from WMAPE, floored at zero
pub fn confidence_from_wmape(wmape: f64) -> f64 {
    (1.0 - wmape).max(0.0)
}

/// In-sample accuracy of a fitted model, as a [0, 1] fraction.
///
/// MAPE over the trailing overlap of fitted and actual values, positive
/// actuals only. Fewer than 5 usable points give a neutral 0.65. An
/// implausibly low MAPE accuracy falls back to R² before clamping, since
/// percentage errors explode on near-zero demand days.
pub fn in_sample_accuracy(actual: &[f64], fitted: &[f64]) -> f64 {
    let overlap = actual.len().min(fitted.len());
    if overlap == 0 {
        return 0.65;
    }
    let actual = &actual[actual.len() - overlap..];
    let fitted = &fitted[fitted.len() - overlap..];

    let pairs: Vec<(f64, f64)> = actual
        .iter()
        .zip(fitted)
        .filter(|(&a, _)| a > 0.0)
        .map(|(&a, &f)| (a, f))
        .collect();
    if pairs.len() < 5 {
        return 0.65;
    }

    let mape =
        pairs.iter().map(|(a, f)| (a - f).abs() / a).sum::<f64>() / pairs.len() as f64;
    let mut accuracy = (1.0 - mape).clamp(0.0, 1.0);

    if accuracy < 0.2 {
        let mean = pairs.iter().map(|(a, _)| a).sum::<f64>() / pairs.len() as f64;
        let ss_res: f64 = pairs.iter().map(|(a, f)| (a - f).powi(2)).sum();
        let ss_tot: f64 = pairs.iter().map(|(a, _)| (a - mean).powi(2)).sum();
        if ss_tot > 0.0 {
            let r2 = 1.0 - ss_res / ss_tot;
            accuracy = accuracy.max(r2.clamp(0.0, 1.0));
        }
    }

    accuracy
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn wmape_is_weighted_by_actuals() {
        let actual = vec![100.0, 100.0];
        let predicted = vec![90.0, 110.0];
        assert_relative_eq!(wmape(&actual, &predicted), 0.1);
    }

    #[test]
    fn wmape_ignores_zero_demand_rows() {
        let actual = vec![0.0, 50.0];
        let predicted = vec![999.0, 45.0];
        assert_relative_eq!(wmape(&actual, &predicted), 0.1);
    }

    #[test]
    fn wmape_worst_case_when_no_positive_actuals() {
        assert_relative_eq!(wmape(&[0.0, 0.0], &[1.0, 2.0]), 1.0);
    }

    #[test]
    fn confidence_floors_at_zero() {
        assert_relative_eq!(confidence_from_wmape(0.3), 0.7);
        assert_relative_eq!(confidence_from_wmape(1.8), 0.0);
    }

    #[test]
    fn perfect_fit_has_full_accuracy() {
        let series = vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        assert_relative_eq!(in_sample_accuracy(&series, &series), 1.0);
    }

    #[test]
    fn sparse_overlap_reports_neutral_accuracy() {
        assert_relative_eq!(in_sample_accuracy(&[10.0, 20.0], &[11.0, 19.0]), 0.65);
    }
}
