use crate::config::GateSpec;
use crate::score::Score;
use crate::types::{CheckOutcome, CheckStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Passed,
    Failed,
    /// Not run because an earlier gate failed
    Locked,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Passed => f.write_str("passed"),
            GateState::Failed => f.write_str("failed"),
            GateState::Locked => f.write_str("locked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub threshold: u8,
    pub state: GateState,
    pub score: Score,
    pub percent: u8,
    pub checks: Vec<CheckOutcome>,
    /// Ids of failed or errored critical checks
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl GateOutcome {
    pub fn locked(spec: &GateSpec, reason: &str) -> Self {
        let checks: Vec<CheckOutcome> = spec
            .checks
            .iter()
            .map(|c| CheckOutcome::skipped(c, reason))
            .collect();
        let score: Score = checks.iter().sum();

        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            threshold: spec.threshold,
            state: GateState::Locked,
            percent: score.percent(),
            score,
            checks,
            blockers: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.state == GateState::Passed
    }

    pub fn failing_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| c.status.is_failure())
    }

    pub fn check(&self, id: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.id == id)
    }
}

/// Score a gate from its check outcomes.
///
/// The gate passes only when the percentage reaches the threshold and no
/// critical check failed. A gate with no checks proves nothing and fails.
pub fn evaluate_gate(spec: &GateSpec, checks: Vec<CheckOutcome>) -> GateOutcome {
    let score: Score = checks.iter().sum();
    let percent = score.percent();

    let blockers: Vec<String> = checks
        .iter()
        .filter(|c| c.critical && c.status.is_failure())
        .map(|c| c.id.clone())
        .collect();

    let recommendations: Vec<String> = checks
        .iter()
        .filter(|c| c.status.is_failure())
        .filter_map(|c| c.hint.as_ref().map(|hint| format!("{}: {}", c.id, hint)))
        .collect();

    let ran_any = checks.iter().any(|c| c.status != CheckStatus::Skipped);
    let state = if ran_any && percent >= spec.threshold && blockers.is_empty() {
        GateState::Passed
    } else {
        GateState::Failed
    };

    GateOutcome {
        name: spec.name.clone(),
        description: spec.description.clone(),
        threshold: spec.threshold,
        state,
        score,
        percent,
        checks,
        blockers,
        recommendations,
    }
}

/// How far through the ordered gates a run got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    /// Last gate of the unbroken passing prefix
    pub highest_passed: Option<String>,
    /// Number of gates in the unbroken passing prefix
    pub unlocked: usize,
    pub total: usize,
    pub verdict: Verdict,
}

impl Progression {
    pub fn from_gates(gates: &[GateOutcome]) -> Self {
        let prefix: Vec<&GateOutcome> = gates.iter().take_while(|g| g.passed()).collect();
        let verdict = if !gates.is_empty() && gates.iter().all(GateOutcome::passed) {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        Self {
            highest_passed: prefix.last().map(|g| g.name.clone()),
            unlocked: prefix.len(),
            total: gates.len(),
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckKind, CheckSpec};
    use crate::types::Measurement;
    use std::time::Duration;

    fn check(id: &str, points: u32, critical: bool) -> CheckSpec {
        CheckSpec {
            id: id.to_string(),
            name: None,
            points,
            critical,
            graded: false,
            hint: Some(format!("fix {id}")),
            timeout_secs: None,
            kind: CheckKind::FileExists {
                path: format!("{id}.txt").into(),
            },
        }
    }

    fn gate(name: &str, threshold: u8, checks: Vec<CheckSpec>) -> GateSpec {
        GateSpec {
            name: name.to_string(),
            description: String::new(),
            threshold,
            checks,
        }
    }

    fn outcome(spec: &CheckSpec, passed: bool) -> CheckOutcome {
        let m = if passed {
            Measurement::pass("ok")
        } else {
            Measurement::fail("nope")
        };
        CheckOutcome::from_measurement(spec, m, Duration::ZERO)
    }

    #[test]
    fn test_gate_passes_at_threshold() {
        let a = check("a", 80, false);
        let b = check("b", 20, false);
        let spec = gate("g", 80, vec![a.clone(), b.clone()]);

        let result = evaluate_gate(&spec, vec![outcome(&a, true), outcome(&b, false)]);
        assert_eq!(result.percent, 80);
        assert_eq!(result.state, GateState::Passed);
        assert_eq!(result.recommendations, vec!["b: fix b".to_string()]);
    }

    #[test]
    fn test_gate_fails_below_threshold() {
        let a = check("a", 79, false);
        let b = check("b", 21, false);
        let spec = gate("g", 80, vec![a.clone(), b.clone()]);

        let result = evaluate_gate(&spec, vec![outcome(&a, true), outcome(&b, false)]);
        assert_eq!(result.percent, 79);
        assert_eq!(result.state, GateState::Failed);
    }

    #[test]
    fn test_critical_failure_blocks_gate() {
        let a = check("a", 95, false);
        let b = check("b", 5, true);
        let spec = gate("g", 50, vec![a.clone(), b.clone()]);

        let result = evaluate_gate(&spec, vec![outcome(&a, true), outcome(&b, false)]);
        assert_eq!(result.percent, 95);
        assert_eq!(result.blockers, vec!["b".to_string()]);
        assert_eq!(result.state, GateState::Failed);
    }

    #[test]
    fn test_errored_critical_check_blocks_gate() {
        let a = check("a", 10, true);
        let spec = gate("g", 0, vec![a.clone()]);
        let errored = CheckOutcome::errored(&a, "timed out", Duration::ZERO);

        let result = evaluate_gate(&spec, vec![errored]);
        assert_eq!(result.state, GateState::Failed);
        assert_eq!(result.blockers, vec!["a".to_string()]);
    }

    #[test]
    fn test_empty_gate_fails_even_with_zero_threshold() {
        let spec = gate("empty", 0, vec![]);
        let result = evaluate_gate(&spec, vec![]);
        assert_eq!(result.state, GateState::Failed);
        assert_eq!(result.percent, 0);
    }

    #[test]
    fn test_locked_gate() {
        let a = check("a", 10, false);
        let spec = gate("later", 80, vec![a]);
        let locked = GateOutcome::locked(&spec, "gate 'first' failed");

        assert_eq!(locked.state, GateState::Locked);
        assert_eq!(locked.score.awarded, 0);
        assert_eq!(locked.score.max, 10);
        assert_eq!(locked.checks[0].status, CheckStatus::Skipped);
        assert_eq!(locked.checks[0].details, "gate 'first' failed");
    }

    #[test]
    fn test_progression() {
        let a = check("a", 10, false);
        let first = evaluate_gate(&gate("first", 50, vec![a.clone()]), vec![outcome(&a, true)]);
        let second = evaluate_gate(&gate("second", 50, vec![a.clone()]), vec![outcome(&a, false)]);
        let third = GateOutcome::locked(&gate("third", 50, vec![a.clone()]), "locked");

        let progression = Progression::from_gates(&[first.clone(), second, third]);
        assert_eq!(progression.highest_passed.as_deref(), Some("first"));
        assert_eq!(progression.unlocked, 1);
        assert_eq!(progression.total, 3);
        assert_eq!(progression.verdict, Verdict::Fail);

        let all = Progression::from_gates(&[first]);
        assert_eq!(all.verdict, Verdict::Pass);

        let none = Progression::from_gates(&[]);
        assert_eq!(none.verdict, Verdict::Fail);
        assert_eq!(none.highest_passed, None);
    }
}
