use crate::config::CheckSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Errored => "errored",
            CheckStatus::Skipped => "skipped",
        }
    }

    /// Failed and errored checks both count against a gate.
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Failed | CheckStatus::Errored)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single check observed.
///
/// `awarded` is `None` for all-or-nothing checks. Graded checks (test suites,
/// latency ladders) set it to the partial credit they earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub passed: bool,
    pub awarded: Option<u32>,
    pub details: String,
    pub metrics: BTreeMap<String, f64>,
}

impl Measurement {
    pub fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            awarded: None,
            details: details.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            awarded: None,
            details: details.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn graded(passed: bool, awarded: u32, details: impl Into<String>) -> Self {
        Self {
            passed,
            awarded: Some(awarded),
            details: details.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub id: String,
    pub name: String,
    pub status: CheckStatus,
    pub awarded: u32,
    pub max_points: u32,
    pub critical: bool,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    pub duration_ms: u64,
}

impl CheckOutcome {
    pub fn from_measurement(spec: &CheckSpec, measurement: Measurement, duration: Duration) -> Self {
        let max_points = spec.points;
        let awarded = match (measurement.passed, measurement.awarded) {
            (true, None) => max_points,
            (false, None) => 0,
            (false, Some(_)) if !spec.graded => 0,
            (_, Some(points)) if points > max_points => {
                warn!(
                    check = %spec.id,
                    claimed = points,
                    max = max_points,
                    "Check claimed more points than it is worth; clamping"
                );
                max_points
            }
            (_, Some(points)) => points,
        };

        let status = if measurement.passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        };

        Self {
            id: spec.id.clone(),
            name: spec.display_name().to_string(),
            status,
            awarded,
            max_points,
            critical: spec.critical,
            details: measurement.details,
            hint: spec.hint.clone(),
            metrics: measurement.metrics,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn errored(spec: &CheckSpec, error: impl fmt::Display, duration: Duration) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.display_name().to_string(),
            status: CheckStatus::Errored,
            awarded: 0,
            max_points: spec.points,
            critical: spec.critical,
            details: error.to_string(),
            hint: spec.hint.clone(),
            metrics: BTreeMap::new(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn skipped(spec: &CheckSpec, reason: impl Into<String>) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.display_name().to_string(),
            status: CheckStatus::Skipped,
            awarded: 0,
            max_points: spec.points,
            critical: spec.critical,
            details: reason.into(),
            hint: None,
            metrics: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckKind;

    fn spec(points: u32, graded: bool) -> CheckSpec {
        CheckSpec {
            id: "readme".to_string(),
            name: Some("README present".to_string()),
            points,
            critical: false,
            graded,
            hint: Some("add a README".to_string()),
            timeout_secs: None,
            kind: CheckKind::FileExists {
                path: "README.md".into(),
            },
        }
    }

    #[test]
    fn test_all_or_nothing_awards() {
        let spec = spec(10, false);
        let ok = CheckOutcome::from_measurement(&spec, Measurement::pass("found"), Duration::ZERO);
        assert_eq!(ok.status, CheckStatus::Passed);
        assert_eq!(ok.awarded, 10);
        assert_eq!(ok.name, "README present");

        let bad = CheckOutcome::from_measurement(&spec, Measurement::fail("missing"), Duration::ZERO);
        assert_eq!(bad.status, CheckStatus::Failed);
        assert_eq!(bad.awarded, 0);
        assert_eq!(bad.details, "missing");
    }

    #[test]
    fn test_partial_credit_requires_graded_on_failure() {
        let ungraded = spec(20, false);
        let outcome = CheckOutcome::from_measurement(
            &ungraded,
            Measurement::graded(false, 12, "12/20"),
            Duration::ZERO,
        );
        assert_eq!(outcome.awarded, 0);

        let graded = spec(20, true);
        let outcome = CheckOutcome::from_measurement(
            &graded,
            Measurement::graded(false, 12, "12/20"),
            Duration::ZERO,
        );
        assert_eq!(outcome.awarded, 12);
        assert_eq!(outcome.status, CheckStatus::Failed);
    }

    #[test]
    fn test_overclaimed_points_are_clamped_down() {
        let spec = spec(5, true);
        let outcome = CheckOutcome::from_measurement(
            &spec,
            Measurement::graded(true, 95, "inflated"),
            Duration::ZERO,
        );
        assert_eq!(outcome.awarded, 5);
        assert!(outcome.awarded <= outcome.max_points);
    }

    #[test]
    fn test_errored_and_skipped_award_nothing() {
        let spec = spec(10, true);
        let errored = CheckOutcome::errored(&spec, "connection refused", Duration::from_millis(12));
        assert_eq!(errored.status, CheckStatus::Errored);
        assert_eq!(errored.awarded, 0);
        assert_eq!(errored.duration_ms, 12);
        assert!(errored.status.is_failure());

        let skipped = CheckOutcome::skipped(&spec, "gate locked");
        assert_eq!(skipped.status, CheckStatus::Skipped);
        assert_eq!(skipped.awarded, 0);
        assert!(!skipped.status.is_failure());
    }

    #[test]
    fn test_metrics_carry_over() {
        let spec = spec(10, false);
        let m = Measurement::pass("ok")
            .with_metric("latency_ms", 12.5)
            .with_metric("status", 200.0);
        let outcome = CheckOutcome::from_measurement(&spec, m, Duration::ZERO);
        assert_eq!(outcome.metrics.get("latency_ms"), Some(&12.5));
        assert_eq!(outcome.metrics.len(), 2);
    }
}
