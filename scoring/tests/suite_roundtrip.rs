use scoring::prelude::*;
use std::time::Duration;
use tempfile::tempdir;

const SUITE: &str = r#"
name = "nightly"

[[gates]]
name = "build"
threshold = 100

[[gates.checks]]
id = "lockfile"
points = 5
kind = "file_exists"
path = "Cargo.lock"

[[gates.checks]]
id = "unit-tests"
points = 20
graded = true
kind = "test_suite"
program = "cargo"
args = ["test", "--workspace"]
min_pass_rate = 0.95

[[gates]]
name = "runtime"
threshold = 60

[[gates.checks]]
id = "burst"
points = 10
kind = "load"
url = "http://127.0.0.1:5000/"
requests = 50
"#;

#[test]
fn test_suite_loads_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nightly.toml");
    std::fs::write(&path, SUITE).unwrap();

    let config = SuiteConfig::load(&path).unwrap();
    assert_eq!(config.gates.len(), 2);
    assert_eq!(config.gates[0].max_points(), 25);

    match &config.gates[1].checks[0].kind {
        CheckKind::Load {
            requests,
            concurrency,
            max_error_rate,
            max_p95_ms,
            ..
        } => {
            assert_eq!(*requests, 50);
            assert_eq!(*concurrency, 10);
            assert_eq!(*max_error_rate, 0.01);
            assert!(max_p95_ms.is_none());
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn test_missing_suite_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = SuiteConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ScoringError::Io(_)));
}

#[test]
fn test_failing_suite_reports_failure() {
    let config = SuiteConfig::from_toml_str(SUITE).unwrap();

    // Lockfile present, test suite at 90% with a 95% floor.
    let build = &config.gates[0];
    let outcomes = vec![
        CheckOutcome::from_measurement(
            &build.checks[0],
            Measurement::pass("Cargo.lock exists"),
            Duration::ZERO,
        ),
        CheckOutcome::from_measurement(
            &build.checks[1],
            Measurement::graded(false, proportional(20, 90, 100), "90 passed, 10 failed"),
            Duration::ZERO,
        ),
    ];
    let build_outcome = evaluate_gate(build, outcomes);
    assert_eq!(build_outcome.score, Score::new(23, 25));
    assert_eq!(build_outcome.percent, 92);
    assert_eq!(build_outcome.state, GateState::Failed);

    let runtime = GateOutcome::locked(&config.gates[1], "gate 'build' failed");
    let now = chrono::Utc::now();
    let report = RunReport::new(&config.name, now, now, vec![build_outcome, runtime]);

    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.progression.unlocked, 0);
    assert_eq!(report.progression.highest_passed, None);

    let parsed = RunReport::from_json(&report.to_json_pretty().unwrap()).unwrap();
    assert_eq!(parsed.gates[1].state, GateState::Locked);
    assert_eq!(parsed.gates[1].checks[0].status, CheckStatus::Skipped);
}

#[test]
fn test_bundled_release_suite_is_valid() {
    let config = SuiteConfig::from_toml_str(include_str!("../../suites/release.toml")).unwrap();
    let names: Vec<&str> = config.gates.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["hygiene", "build", "config", "runtime"]);
    assert_eq!(config.defaults.retries, 2);
    assert_eq!(config.defaults.timeout_secs, 60);
    assert!(config.gate("runtime").unwrap().checks[0].critical);
}
