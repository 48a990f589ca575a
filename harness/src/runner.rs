//! Gate runner.
//!
//! Gates run in suite order. Checks inside a gate run concurrently, each
//! under its own timeout, and their outcomes keep suite order. Once a gate
//! fails, every later gate is locked unless the runner is told to keep going.

use crate::checks::{build_check, CheckContext, CheckError};
use crate::error::{HarnessError, HarnessResult};
use chrono::Utc;
use futures::future::join_all;
use scoring::{
    evaluate_gate, CheckOutcome, CheckSpec, CheckStatus, GateOutcome, GateSpec, RetryPolicy,
    RunReport, SuiteConfig,
};
use std::path::PathBuf;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub struct GateRunner {
    config: SuiteConfig,
    ctx: CheckContext,
    keep_going: bool,
    gate_filter: Option<String>,
}

impl GateRunner {
    pub fn new(config: SuiteConfig, ctx: CheckContext) -> Self {
        Self {
            config,
            ctx,
            keep_going: false,
            gate_filter: None,
        }
    }

    /// Runner whose request timeout and retry policy come from the suite
    /// defaults.
    pub fn from_config(config: SuiteConfig, root: impl Into<PathBuf>) -> Self {
        let ctx = CheckContext::new(root)
            .with_request_timeout(config.request_timeout())
            .with_retry(RetryPolicy::from(&config.defaults));
        Self::new(config, ctx)
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn with_gate_filter(mut self, gate: Option<String>) -> Self {
        self.gate_filter = gate;
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub async fn run(&self) -> HarnessResult<RunReport> {
        let started_at = Utc::now();

        let gates: Vec<&GateSpec> = match &self.gate_filter {
            Some(name) => vec![self
                .config
                .gate(name)
                .ok_or_else(|| HarnessError::UnknownGate(name.clone()))?],
            None => self.config.gates.iter().collect(),
        };

        info!(
            suite = %self.config.name,
            gates = gates.len(),
            root = %self.ctx.root.display(),
            "Starting audit run"
        );

        let mut outcomes = Vec::with_capacity(gates.len());
        let mut failed_gate: Option<&str> = None;

        for gate in gates {
            if let Some(failed) = failed_gate {
                info!(gate = %gate.name, blocked_by = failed, "Gate locked");
                outcomes.push(GateOutcome::locked(
                    gate,
                    &format!("locked: gate '{}' failed", failed),
                ));
                continue;
            }

            let outcome = self.run_gate(gate).await;
            if !outcome.passed() && !self.keep_going {
                failed_gate = Some(gate.name.as_str());
            }
            outcomes.push(outcome);
        }

        let report = RunReport::new(&self.config.name, started_at, Utc::now(), outcomes);
        info!(
            suite = %report.suite,
            verdict = %report.verdict,
            unlocked = report.progression.unlocked,
            total = report.progression.total,
            "Audit run finished"
        );
        Ok(report)
    }

    pub async fn run_gate(&self, gate: &GateSpec) -> GateOutcome {
        info!(gate = %gate.name, checks = gate.checks.len(), threshold = gate.threshold, "Running gate");

        let checks = join_all(gate.checks.iter().map(|spec| self.run_check(spec))).await;
        let outcome = evaluate_gate(gate, checks);

        info!(
            gate = %outcome.name,
            state = %outcome.state,
            score = %outcome.score,
            blockers = outcome.blockers.len(),
            "Gate finished"
        );
        outcome
    }

    async fn run_check(&self, spec: &CheckSpec) -> CheckOutcome {
        let started = Instant::now();

        let check = match build_check(spec) {
            Ok(check) => check,
            Err(e) => {
                error!(check = %spec.id, "Could not build check: {}", e);
                return CheckOutcome::errored(spec, e, started.elapsed());
            }
        };

        let limit = spec.timeout(&self.config.defaults);
        let outcome = match timeout(limit, check.run(&self.ctx)).await {
            Ok(Ok(measurement)) => {
                CheckOutcome::from_measurement(spec, measurement, started.elapsed())
            }
            Ok(Err(e)) => CheckOutcome::errored(spec, e, started.elapsed()),
            Err(_) => CheckOutcome::errored(spec, CheckError::Timeout(limit), started.elapsed()),
        };

        match outcome.status {
            CheckStatus::Passed => {
                debug!(check = %outcome.id, awarded = outcome.awarded, "{}", outcome.details)
            }
            CheckStatus::Failed => {
                warn!(check = %outcome.id, awarded = outcome.awarded, "Check failed: {}", outcome.details)
            }
            CheckStatus::Errored => {
                error!(check = %outcome.id, "Check errored: {}", outcome.details)
            }
            CheckStatus::Skipped => {}
        }

        outcome
    }
}
