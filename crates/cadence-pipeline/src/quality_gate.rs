//! Quality gate: final metrics against configured thresholds.

use std::collections::BTreeMap;

use cadence_types::{metrics, QualityGateVerdict};

use crate::config::QualityThresholds;

/// Round to two decimals so report text does not carry float noise.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Two-decimal display of a value that missed `threshold`. Truncates when
/// rounding would print it as equal to the threshold.
fn shown_below(actual: f64, threshold: f64) -> f64 {
    let rounded = round2(actual);
    if rounded >= threshold {
        (actual * 100.0).floor() / 100.0
    } else {
        rounded
    }
}

fn raw_pass_rate(recorded: &BTreeMap<String, f64>) -> f64 {
    let passed = recorded.get(metrics::TESTS_PASSED).copied().unwrap_or(0.0);
    let total = recorded.get(metrics::TESTS_TOTAL).copied().unwrap_or(0.0);
    // Multiply first so whole-number rates come out exact.
    passed * 100.0 / total.max(1.0)
}

/// `passed / max(total, 1) * 100`, from the recorded test metrics, rounded
/// to two decimals.
pub fn pass_rate(recorded: &BTreeMap<String, f64>) -> f64 {
    round2(raw_pass_rate(recorded))
}

/// Evaluate every configured threshold.
///
/// Comparisons use the unrounded values. A coverage category that was never
/// recorded counts as 0%. Violations come out in category order followed by
/// the pass rate.
pub fn evaluate(
    recorded: &BTreeMap<String, f64>,
    thresholds: &QualityThresholds,
) -> QualityGateVerdict {
    let mut violations = Vec::new();

    for (category, threshold) in &thresholds.coverage {
        let actual = recorded
            .get(&metrics::coverage(category))
            .copied()
            .unwrap_or(0.0);
        if !threshold.is_met(actual) {
            violations.push(format!(
                "{} coverage {}% below threshold {}%",
                category,
                shown_below(actual, threshold.threshold),
                threshold.threshold
            ));
        }
    }

    let rate = raw_pass_rate(recorded);
    if !thresholds.pass_rate.is_met(rate) {
        violations.push(format!(
            "test pass rate {}% below threshold {}%",
            shown_below(rate, thresholds.pass_rate.threshold),
            thresholds.pass_rate.threshold
        ));
    }

    QualityGateVerdict {
        passed: violations.is_empty(),
        pass_rate: round2(rate),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Threshold;

    fn metrics_with(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn full_metrics(branches: f64) -> BTreeMap<String, f64> {
        metrics_with(&[
            ("coverage.statements", 85.0),
            ("coverage.branches", branches),
            ("coverage.functions", 90.0),
            ("coverage.lines", 88.0),
            ("tests.passed", 19.0),
            ("tests.total", 20.0),
        ])
    }

    #[test]
    fn everything_above_threshold_passes() {
        let verdict = evaluate(&full_metrics(80.0), &QualityThresholds::default());
        assert!(verdict.passed);
        assert!(verdict.violations.is_empty());
        assert_eq!(verdict.pass_rate, 95.0);
    }

    #[test]
    fn below_threshold_names_the_metric() {
        let verdict = evaluate(&full_metrics(72.0), &QualityThresholds::default());
        assert!(!verdict.passed);
        assert_eq!(
            verdict.violations,
            vec!["branches coverage 72% below threshold 80%".to_string()]
        );
    }

    #[test]
    fn pass_rate_violation() {
        let metrics = metrics_with(&[("tests.passed", 8.0), ("tests.total", 10.0)]);
        let thresholds = QualityThresholds {
            coverage: BTreeMap::new(),
            pass_rate: Threshold::gte(90.0),
        };
        let verdict = evaluate(&metrics, &thresholds);
        assert_eq!(verdict.pass_rate, 80.0);
        assert_eq!(
            verdict.violations,
            vec!["test pass rate 80% below threshold 90%".to_string()]
        );
    }

    #[test]
    fn missing_metrics_count_as_zero() {
        let verdict = evaluate(&BTreeMap::new(), &QualityThresholds::default());
        assert_eq!(verdict.pass_rate, 0.0);
        assert_eq!(verdict.violations.len(), 5);
        assert!(verdict.violations[0].starts_with("branches coverage 0%"));
    }

    #[test]
    fn zero_total_does_not_divide_by_zero() {
        let metrics = metrics_with(&[("tests.passed", 0.0), ("tests.total", 0.0)]);
        assert_eq!(pass_rate(&metrics), 0.0);
    }

    #[test]
    fn gate_is_monotonic_at_the_boundary() {
        let thresholds = QualityThresholds::uniform(80.0);
        for value in [0.0, 79.99, 79.996, 79.9999, 80.0, 80.01, 100.0] {
            let verdict = evaluate(&full_metrics(value), &thresholds);
            let flagged = verdict
                .violations
                .iter()
                .filter(|v| v.starts_with("branches"))
                .count();
            assert_eq!(flagged, usize::from(value < 80.0), "value {value}");
        }
    }

    #[test]
    fn pass_rate_just_under_threshold_is_a_violation() {
        // 22499 / 25000 = 89.996%
        let metrics = metrics_with(&[("tests.passed", 22499.0), ("tests.total", 25000.0)]);
        let thresholds = QualityThresholds {
            coverage: BTreeMap::new(),
            pass_rate: Threshold::gte(90.0),
        };
        let verdict = evaluate(&metrics, &thresholds);
        assert!(!verdict.passed);
        assert_eq!(
            verdict.violations,
            vec!["test pass rate 89.99% below threshold 90%".to_string()]
        );
    }

    #[test]
    fn coverage_just_under_threshold_never_prints_as_met() {
        let verdict = evaluate(&full_metrics(79.996), &QualityThresholds::uniform(80.0));
        assert_eq!(
            verdict.violations,
            vec!["branches coverage 79.99% below threshold 80%".to_string()]
        );
    }

    #[test]
    fn fractional_values_are_rounded() {
        let metrics = metrics_with(&[("tests.passed", 2.0), ("tests.total", 3.0)]);
        assert_eq!(pass_rate(&metrics), 66.67);
    }
}
