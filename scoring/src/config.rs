//! Suite configuration.
//!
//! A suite is an ordered list of gates, each holding weighted checks. Suites
//! are written in TOML:
//!
//! ```toml
//! name = "release"
//!
//! [[gates]]
//! name = "hygiene"
//! threshold = 80
//!
//! [[gates.checks]]
//! id = "readme"
//! points = 10
//! kind = "file_exists"
//! path = "README.md"
//! ```

use crate::error::{ScoringError, ScoringResult};
use crate::score::{ScoreLadder, Tier};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const HTTP_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"];

/// Upper bound on the points a single gate can be worth.
pub const MAX_GATE_POINTS: u32 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub gates: Vec<GateSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Per-check timeout unless the check sets its own
    pub timeout_secs: u64,
    /// Upper bound for one network request made by a check
    pub request_timeout_secs: u64,
    /// Retries for transport-level failures of network checks
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter factor for retry delays (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_timeout_secs: 5,
            retries: 0,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Minimum percentage (0-100) needed to pass
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

impl GateSpec {
    /// Total points on offer. Saturates; `validate` caps it at `MAX_GATE_POINTS`.
    pub fn max_points(&self) -> u32 {
        self.checks
            .iter()
            .fold(0u32, |total, c| total.saturating_add(c.points))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub points: u32,
    /// A failing critical check blocks the gate whatever the score
    #[serde(default)]
    pub critical: bool,
    /// Keep partial credit even when the check fails
    #[serde(default)]
    pub graded: bool,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub kind: CheckKind,
}

impl CheckSpec {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn timeout(&self, defaults: &Defaults) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(defaults.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    FileExists {
        path: PathBuf,
    },
    FileContains {
        path: PathBuf,
        pattern: String,
        #[serde(default)]
        absent: bool,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        expect_exit: i32,
    },
    TestSuite {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default = "default_min_pass_rate")]
        min_pass_rate: f64,
    },
    Http {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        expect_status: Vec<u16>,
        #[serde(default)]
        body_contains: Option<String>,
    },
    Latency {
        urls: Vec<String>,
        #[serde(default)]
        ladder: Option<Vec<Tier>>,
        #[serde(default = "default_samples")]
        samples: u32,
    },
    Load {
        url: String,
        #[serde(default = "default_requests")]
        requests: u32,
        #[serde(default = "default_concurrency")]
        concurrency: usize,
        #[serde(default = "default_max_error_rate")]
        max_error_rate: f64,
        #[serde(default)]
        max_p95_ms: Option<f64>,
    },
    GitClean {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        allow_untracked: bool,
    },
    PortPolicy {
        #[serde(default)]
        root: Option<PathBuf>,
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        expect: Vec<u16>,
        #[serde(default)]
        forbid: Vec<u16>,
    },
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::FileExists { .. } => "file_exists",
            CheckKind::FileContains { .. } => "file_contains",
            CheckKind::Command { .. } => "command",
            CheckKind::TestSuite { .. } => "test_suite",
            CheckKind::Http { .. } => "http",
            CheckKind::Latency { .. } => "latency",
            CheckKind::Load { .. } => "load",
            CheckKind::GitClean { .. } => "git_clean",
            CheckKind::PortPolicy { .. } => "port_policy",
        }
    }

    /// Ladder for latency checks, falling back to the response-time default.
    pub fn ladder(&self) -> ScoringResult<Option<ScoreLadder>> {
        match self {
            CheckKind::Latency {
                ladder: Some(tiers),
                ..
            } => ScoreLadder::new(tiers.clone()).map(Some),
            CheckKind::Latency { ladder: None, .. } => Ok(Some(ScoreLadder::response_time())),
            _ => Ok(None),
        }
    }

    /// Longest time the check can spend on network requests, retries
    /// included. `None` for checks that make no requests.
    pub fn network_budget(&self, defaults: &Defaults) -> Option<Duration> {
        let request = Duration::from_secs(defaults.request_timeout_secs);
        match self {
            CheckKind::Http { .. } => {
                let worst_delay_ms =
                    (defaults.max_delay_ms as f64 * (1.0 + defaults.jitter)).ceil() as u64;
                let delays = Duration::from_millis(worst_delay_ms).saturating_mul(defaults.retries);
                Some(
                    request
                        .saturating_mul(defaults.retries.saturating_add(1))
                        .saturating_add(delays),
                )
            }
            CheckKind::Latency { urls, samples, .. } => {
                let count = u32::try_from(urls.len())
                    .unwrap_or(u32::MAX)
                    .saturating_mul(*samples);
                Some(request.saturating_mul(count))
            }
            CheckKind::Load { .. } => Some(request),
            _ => None,
        }
    }

    fn validate(&self, id: &str) -> ScoringResult<()> {
        let invalid = |message: String| -> ScoringResult<()> {
            Err(ScoringError::invalid_config(format!(
                "check '{id}': {message}"
            )))
        };

        match self {
            CheckKind::FileContains { pattern, .. } => {
                if let Err(e) = Regex::new(pattern) {
                    return invalid(format!("pattern does not compile: {e}"));
                }
            }
            CheckKind::Command { program, .. } | CheckKind::TestSuite { program, .. }
                if program.trim().is_empty() =>
            {
                return invalid("program cannot be empty".to_string());
            }
            CheckKind::Http { url, method, .. } => {
                validate_url(url).or_else(invalid)?;
                if !HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str()) {
                    return invalid(format!("unsupported HTTP method '{method}'"));
                }
            }
            CheckKind::Latency { urls, samples, .. } => {
                if urls.is_empty() {
                    return invalid("latency check needs at least one url".to_string());
                }
                for url in urls {
                    validate_url(url).or_else(invalid)?;
                }
                if *samples == 0 {
                    return invalid("samples must be greater than 0".to_string());
                }
                if let Err(e) = self.ladder() {
                    return invalid(e.to_string());
                }
            }
            CheckKind::Load {
                url,
                requests,
                concurrency,
                max_error_rate,
                max_p95_ms,
            } => {
                validate_url(url).or_else(invalid)?;
                if *requests == 0 {
                    return invalid("requests must be greater than 0".to_string());
                }
                if *concurrency == 0 {
                    return invalid("concurrency must be greater than 0".to_string());
                }
                if !(0.0..=1.0).contains(max_error_rate) {
                    return invalid("max_error_rate must be between 0.0 and 1.0".to_string());
                }
                if matches!(max_p95_ms, Some(p) if *p <= 0.0) {
                    return invalid("max_p95_ms must be greater than 0".to_string());
                }
            }
            _ => {}
        }

        if let CheckKind::TestSuite { min_pass_rate, .. } = self {
            if !(0.0..=1.0).contains(min_pass_rate) {
                return invalid("min_pass_rate must be between 0.0 and 1.0".to_string());
            }
        }

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("url '{url}' must start with http:// or https://"))
    }
}

fn default_threshold() -> u8 {
    80
}

fn default_min_pass_rate() -> f64 {
    1.0
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_samples() -> u32 {
    3
}

fn default_requests() -> u32 {
    100
}

fn default_concurrency() -> usize {
    10
}

fn default_max_error_rate() -> f64 {
    0.01
}

impl SuiteConfig {
    pub fn from_toml_str(source: &str) -> ScoringResult<Self> {
        let config: SuiteConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ScoringResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn gate(&self, name: &str) -> Option<&GateSpec> {
        self.gates.iter().find(|g| g.name == name)
    }

    pub fn check_count(&self) -> usize {
        self.gates.iter().map(|g| g.checks.len()).sum()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.request_timeout_secs)
    }

    pub fn validate(&self) -> ScoringResult<()> {
        if self.name.trim().is_empty() {
            return Err(ScoringError::invalid_config("suite name cannot be empty"));
        }

        if self.gates.is_empty() {
            return Err(ScoringError::invalid_config("suite has no gates"));
        }

        if self.defaults.timeout_secs == 0 {
            return Err(ScoringError::invalid_config(
                "default timeout must be greater than 0",
            ));
        }

        if self.defaults.request_timeout_secs == 0 {
            return Err(ScoringError::invalid_config(
                "request timeout must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.defaults.jitter) {
            return Err(ScoringError::invalid_config(
                "jitter must be between 0.0 and 1.0",
            ));
        }

        let mut gate_names = HashSet::new();
        let mut check_ids = HashSet::new();

        for gate in &self.gates {
            if gate.name.trim().is_empty() {
                return Err(ScoringError::invalid_config("gate name cannot be empty"));
            }
            if !gate_names.insert(gate.name.as_str()) {
                return Err(ScoringError::invalid_config(format!(
                    "duplicate gate '{}'",
                    gate.name
                )));
            }
            if gate.threshold > 100 {
                return Err(ScoringError::invalid_config(format!(
                    "gate '{}': threshold {} exceeds 100",
                    gate.name, gate.threshold
                )));
            }

            for check in &gate.checks {
                if check.id.trim().is_empty() {
                    return Err(ScoringError::invalid_config(format!(
                        "gate '{}': check id cannot be empty",
                        gate.name
                    )));
                }
                if !check_ids.insert(check.id.as_str()) {
                    return Err(ScoringError::invalid_config(format!(
                        "duplicate check id '{}'",
                        check.id
                    )));
                }
                if check.points == 0 {
                    return Err(ScoringError::invalid_config(format!(
                        "check '{}': points must be greater than 0",
                        check.id
                    )));
                }
                if check.timeout_secs == Some(0) {
                    return Err(ScoringError::invalid_config(format!(
                        "check '{}': timeout must be greater than 0",
                        check.id
                    )));
                }
                check.kind.validate(&check.id)?;

                let limit = check.timeout(&self.defaults);
                if let Some(budget) = check.kind.network_budget(&self.defaults) {
                    if budget > limit {
                        return Err(ScoringError::invalid_config(format!(
                            "check '{}': requests may take up to {:?} but the check times out after {:?}",
                            check.id, budget, limit
                        )));
                    }
                }
            }

            let total = gate
                .checks
                .iter()
                .try_fold(0u32, |total, c| total.checked_add(c.points));
            if !matches!(total, Some(t) if t <= MAX_GATE_POINTS) {
                return Err(ScoringError::invalid_config(format!(
                    "gate '{}': checks are worth more than {} points",
                    gate.name, MAX_GATE_POINTS
                )));
            }
        }

        Ok(())
    }
}

/// Backoff for retrying transport failures of network checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&Defaults::default())
    }
}

impl From<&Defaults> for RetryPolicy {
    fn from(defaults: &Defaults) -> Self {
        Self {
            max_retries: defaults.retries,
            base_delay_ms: defaults.base_delay_ms,
            max_delay_ms: defaults.max_delay_ms,
            jitter_factor: defaults.jitter,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Exponential backoff capped at `max_delay_ms`, plus jitter.
    pub fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        let exponential_delay = base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let max_delay = Duration::from_millis(self.max_delay_ms);

        let delay = exponential_delay.min(max_delay);

        if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..=self.jitter_factor);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }
}
