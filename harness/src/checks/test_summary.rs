//! Parsing of test runner summaries.
//!
//! Understands cargo/libtest (`test result:` lines, summed across binaries),
//! pytest (the final `=== ... in 0.5s ===` line) and jest (`Tests:` line).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LIBTEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored").unwrap()
});

static PYTEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^=+ (.+?) in [\d.]+s(?: \([^)]*\))? =+$").unwrap());

static JEST_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Tests:\s+(.+?),\s*\d+ total").unwrap());

static COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) (\w+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runner {
    Libtest,
    Pytest,
    Jest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub runner: Runner,
    pub passed: u64,
    pub failed: u64,
    pub ignored: u64,
}

impl TestSummary {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.passed as f64 / self.total() as f64
        }
    }
}

pub fn parse(output: &str) -> Option<TestSummary> {
    parse_libtest(output)
        .or_else(|| parse_pytest(output))
        .or_else(|| parse_jest(output))
}

fn parse_libtest(output: &str) -> Option<TestSummary> {
    let mut summary: Option<TestSummary> = None;

    for caps in LIBTEST.captures_iter(output) {
        let entry = summary.get_or_insert(TestSummary {
            runner: Runner::Libtest,
            passed: 0,
            failed: 0,
            ignored: 0,
        });
        entry.passed += caps[1].parse::<u64>().ok()?;
        entry.failed += caps[2].parse::<u64>().ok()?;
        entry.ignored += caps[3].parse::<u64>().ok()?;
    }

    summary
}

fn parse_pytest(output: &str) -> Option<TestSummary> {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| PYTEST_LINE.captures(line))?;
    tally(Runner::Pytest, &line[1])
}

fn parse_jest(output: &str) -> Option<TestSummary> {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| JEST_LINE.captures(line))?;
    tally(Runner::Jest, &line[1])
}

fn tally(runner: Runner, counts: &str) -> Option<TestSummary> {
    let mut summary = TestSummary {
        runner,
        passed: 0,
        failed: 0,
        ignored: 0,
    };
    let mut recognized = false;

    for caps in COUNT.captures_iter(counts) {
        let n: u64 = caps[1].parse().ok()?;
        match &caps[2] {
            "passed" | "xpassed" => summary.passed += n,
            "failed" | "error" | "errors" => summary.failed += n,
            "skipped" | "xfailed" | "deselected" | "todo" => summary.ignored += n,
            _ => continue,
        }
        recognized = true;
    }

    recognized.then_some(summary)
}
