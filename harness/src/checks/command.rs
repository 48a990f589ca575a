use super::test_summary;
use super::{Check, CheckContext, CheckError, CheckResult};
use async_trait::async_trait;
use scoring::{proportional, Measurement};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn last_stderr_line(&self) -> Option<&str> {
        self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd,
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. The child is killed if this future is dropped,
    /// which is how the runner's per-check timeout reaches the process.
    pub async fn execute(&self, ctx: &CheckContext) -> CheckResult<CommandOutput> {
        let cwd = ctx.resolve_opt(self.cwd.as_ref());
        debug!(command = %self.display(), cwd = %cwd.display(), "Running command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CheckError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct CommandCheck {
    pub id: String,
    pub invocation: Invocation,
    pub expect_exit: i32,
}

#[async_trait]
impl Check for CommandCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let output = self.invocation.execute(ctx).await?;

        let code = match output.exit_code {
            Some(code) => code,
            None => {
                return Ok(Measurement::fail(format!(
                    "`{}` was terminated by a signal",
                    self.invocation.display()
                )))
            }
        };

        let mut details = format!("`{}` exited with {}", self.invocation.display(), code);
        if code != self.expect_exit {
            details.push_str(&format!(" (expected {})", self.expect_exit));
            if let Some(line) = output.last_stderr_line() {
                details.push_str(&format!(": {}", line));
            }
        }

        let measurement = if code == self.expect_exit {
            Measurement::pass(details)
        } else {
            Measurement::fail(details)
        };
        Ok(measurement.with_metric("exit_code", code as f64))
    }
}

/// Runs a real test command and scores it from the runner's own summary.
pub struct TestSuiteCheck {
    pub id: String,
    pub invocation: Invocation,
    pub min_pass_rate: f64,
    pub points: u32,
}

#[async_trait]
impl Check for TestSuiteCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let output = self.invocation.execute(ctx).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);

        let Some(summary) = test_summary::parse(&combined) else {
            return Err(CheckError::UnrecognizedOutput {
                message: format!(
                    "no test summary in output of `{}` (exit {:?})",
                    self.invocation.display(),
                    output.exit_code
                ),
            });
        };

        let awarded = proportional(self.points, summary.passed, summary.total());
        let pass_rate = summary.pass_rate();
        let exited_cleanly = output.exit_code == Some(0);

        // A perfect-rate requirement also needs the runner itself to agree.
        let passed = summary.total() > 0
            && pass_rate >= self.min_pass_rate
            && (self.min_pass_rate < 1.0 || exited_cleanly);

        let details = format!(
            "{} passed, {} failed, {} ignored ({:.1}% pass rate, minimum {:.1}%)",
            summary.passed,
            summary.failed,
            summary.ignored,
            pass_rate * 100.0,
            self.min_pass_rate * 100.0
        );

        Ok(Measurement::graded(passed, awarded, details)
            .with_metric("tests_passed", summary.passed as f64)
            .with_metric("tests_failed", summary.failed as f64)
            .with_metric("tests_ignored", summary.ignored as f64)
            .with_metric("pass_rate", pass_rate))
    }
}
