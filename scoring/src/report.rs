//! Versioned run reports.
//!
//! A report is the durable output of one suite run. `schema_version` is bumped
//! whenever a field changes meaning; readers refuse versions they do not know.

use crate::error::{ScoringError, ScoringResult};
use crate::gate::{GateOutcome, GateState, Progression, Verdict};
use crate::types::CheckStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub gates: Vec<GateOutcome>,
    pub progression: Progression,
    pub verdict: Verdict,
}

impl RunReport {
    pub fn new(
        suite: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        gates: Vec<GateOutcome>,
    ) -> Self {
        let progression = Progression::from_gates(&gates);
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        Self {
            schema_version: SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            started_at,
            finished_at,
            duration_ms,
            verdict: progression.verdict,
            progression,
            gates,
        }
    }

    pub fn gate(&self, name: &str) -> Option<&GateOutcome> {
        self.gates.iter().find(|g| g.name == name)
    }

    pub fn to_json_pretty(&self) -> ScoringResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> ScoringResult<Self> {
        let value: serde_json::Value = serde_json::from_str(source)?;
        let found = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        if found != SCHEMA_VERSION {
            return Err(ScoringError::UnsupportedSchema {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# Audit report: {}", self.suite);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Verdict: **{}**", self.verdict);
        let _ = writeln!(
            out,
            "- Gates passed in order: {}/{}",
            self.progression.unlocked, self.progression.total
        );
        let _ = writeln!(out, "- Run: `{}`", self.run_id);
        let _ = writeln!(
            out,
            "- Started: {} ({} ms)",
            self.started_at.to_rfc3339(),
            self.duration_ms
        );

        for gate in &self.gates {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "## {} ({}, {} / threshold {}%)",
                gate.name, gate.state, gate.score, gate.threshold
            );
            if !gate.description.is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", gate.description);
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "| Check | Status | Points | Details |");
            let _ = writeln!(out, "|---|---|---|---|");
            for check in &gate.checks {
                let _ = writeln!(
                    out,
                    "| {}{} | {} | {}/{} | {} |",
                    check.name,
                    if check.critical { " (critical)" } else { "" },
                    check.status,
                    check.awarded,
                    check.max_points,
                    escape_cell(&check.details)
                );
            }

            if !gate.blockers.is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "Blockers: {}", gate.blockers.join(", "));
            }

            if !gate.recommendations.is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "Recommendations:");
                for rec in &gate.recommendations {
                    let _ = writeln!(out, "- {}", rec);
                }
            }
        }

        out
    }

    /// Compare this report against an earlier one.
    pub fn diff(&self, previous: &RunReport) -> ReportDiff {
        let mut gates = Vec::new();
        let mut added = Vec::new();

        for gate in &self.gates {
            let Some(before) = previous.gate(&gate.name) else {
                added.push(gate.name.clone());
                continue;
            };

            let mut regressed = Vec::new();
            let mut recovered = Vec::new();
            for check in &gate.checks {
                let was_passing = before
                    .check(&check.id)
                    .map(|c| c.status == CheckStatus::Passed);
                match (was_passing, check.passed()) {
                    (Some(true), false) => regressed.push(check.id.clone()),
                    (Some(false), true) => recovered.push(check.id.clone()),
                    _ => {}
                }
            }

            gates.push(GateDiff {
                name: gate.name.clone(),
                percent_before: before.percent,
                percent_after: gate.percent,
                state_before: before.state,
                state_after: gate.state,
                regressed,
                recovered,
            });
        }

        let removed = previous
            .gates
            .iter()
            .filter(|g| self.gate(&g.name).is_none())
            .map(|g| g.name.clone())
            .collect();

        ReportDiff {
            verdict_before: previous.verdict,
            verdict_after: self.verdict,
            gates,
            added,
            removed,
        }
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDiff {
    pub name: String,
    pub percent_before: u8,
    pub percent_after: u8,
    pub state_before: GateState,
    pub state_after: GateState,
    pub regressed: Vec<String>,
    pub recovered: Vec<String>,
}

impl GateDiff {
    pub fn delta(&self) -> i16 {
        self.percent_after as i16 - self.percent_before as i16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDiff {
    pub verdict_before: Verdict,
    pub verdict_after: Verdict,
    pub gates: Vec<GateDiff>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReportDiff {
    pub fn has_regressions(&self) -> bool {
        self.gates.iter().any(|g| !g.regressed.is_empty())
            || (self.verdict_before == Verdict::Pass && self.verdict_after == Verdict::Fail)
    }
}
