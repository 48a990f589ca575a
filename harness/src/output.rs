use crate::error::{HarnessError, HarnessResult};
use scoring::{CheckStatus, GateState, ReportDiff, RunReport};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

fn write_file(path: &Path, contents: &str) -> HarnessResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| HarnessError::io(path, e))?;
    info!(path = %path.display(), bytes = contents.len(), "Wrote report");
    Ok(())
}

pub fn write_json(report: &RunReport, path: &Path) -> HarnessResult<()> {
    write_file(path, &report.to_json_pretty()?)
}

pub fn write_markdown(report: &RunReport, path: &Path) -> HarnessResult<()> {
    write_file(path, &report.to_markdown())
}

pub fn load_report(path: &Path) -> HarnessResult<RunReport> {
    let source = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    Ok(RunReport::from_json(&source)?)
}

fn marker(state: GateState) -> &'static str {
    match state {
        GateState::Passed => "✓",
        GateState::Failed => "✗",
        GateState::Locked => "-",
    }
}

/// Terminal summary: one line per gate, one indented line per failing check.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Suite: {}", report.suite);

    for gate in &report.gates {
        let _ = writeln!(
            out,
            "{} {:<20} {:>7} {:>3}% (threshold {}%) {}",
            marker(gate.state),
            gate.name,
            format!("{}/{}", gate.score.awarded, gate.score.max),
            gate.percent,
            gate.threshold,
            gate.state
        );

        for check in gate.failing_checks() {
            let label = match check.status {
                CheckStatus::Errored => "error",
                _ => "fail",
            };
            let _ = writeln!(
                out,
                "    [{}] {}{}: {}",
                label,
                check.name,
                if check.critical { " (critical)" } else { "" },
                check.details
            );
        }
    }

    let _ = writeln!(
        out,
        "Verdict: {} ({}/{} gates passed in order)",
        report.verdict, report.progression.unlocked, report.progression.total
    );
    out
}

pub fn render_diff(diff: &ReportDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Verdict: {} -> {}", diff.verdict_before, diff.verdict_after);

    for gate in &diff.gates {
        let _ = writeln!(
            out,
            "{:<20} {:>3}% -> {:>3}% ({:+}) {} -> {}",
            gate.name,
            gate.percent_before,
            gate.percent_after,
            gate.delta(),
            gate.state_before,
            gate.state_after
        );
        for id in &gate.regressed {
            let _ = writeln!(out, "    regressed: {}", id);
        }
        for id in &gate.recovered {
            let _ = writeln!(out, "    recovered: {}", id);
        }
    }

    for name in &diff.added {
        let _ = writeln!(out, "added gate: {}", name);
    }
    for name in &diff.removed {
        let _ = writeln!(out, "removed gate: {}", name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scoring::{evaluate_gate, CheckKind, CheckOutcome, CheckSpec, GateSpec, Measurement};
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample_report() -> RunReport {
        let spec = CheckSpec {
            id: "readme".to_string(),
            name: Some("README present".to_string()),
            points: 10,
            critical: true,
            graded: false,
            hint: None,
            timeout_secs: None,
            kind: CheckKind::FileExists {
                path: "README.md".into(),
            },
        };
        let gate = GateSpec {
            name: "hygiene".to_string(),
            description: String::new(),
            threshold: 80,
            checks: vec![spec.clone()],
        };
        let outcome = CheckOutcome::from_measurement(
            &spec,
            Measurement::fail("README.md is missing"),
            Duration::ZERO,
        );
        let now = Utc::now();
        RunReport::new("release", now, now, vec![evaluate_gate(&gate, vec![outcome])])
    }

    #[test]
    fn test_summary_shows_failures() {
        let summary = render_summary(&sample_report());
        assert!(summary.contains("✗ hygiene"));
        assert!(summary.contains("0/10"));
        assert!(summary.contains("[fail] README present (critical): README.md is missing"));
        assert!(summary.ends_with("Verdict: FAIL (0/1 gates passed in order)\n"));
    }

    #[test]
    fn test_write_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let report = sample_report();
        let json_path = dir.path().join("reports/nested/run.json");
        let md_path = dir.path().join("reports/run.md");

        write_json(&report, &json_path).unwrap();
        write_markdown(&report, &md_path).unwrap();

        let loaded = load_report(&json_path).unwrap();
        assert_eq!(loaded, report);
        let markdown = std::fs::read_to_string(md_path).unwrap();
        assert!(markdown.contains("Blockers: readme"));
    }

    #[test]
    fn test_load_missing_report() {
        let dir = tempdir().unwrap();
        let err = load_report(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }

    #[test]
    fn test_render_diff() {
        let before = sample_report();
        let mut after = sample_report();
        after.gates[0].percent = 100;
        after.gates[0].state = GateState::Passed;
        after.gates[0].checks[0].status = CheckStatus::Passed;

        let text = render_diff(&after.diff(&before));
        assert!(text.contains("hygiene                0% -> 100% (+100) failed -> passed"), "{text}");
        assert!(text.contains("recovered: readme"));
    }
}
