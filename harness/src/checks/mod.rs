//! Check implementations.
//!
//! Every check kind in a suite maps onto a [`Check`]. Checks only observe and
//! report a [`Measurement`]; turning that into points is done by the runner.

pub mod command;
pub mod files;
pub mod git;
pub mod http;
pub mod load;
pub mod ports;
pub mod test_summary;

use async_trait::async_trait;
use scoring::{CheckKind, CheckSpec, Measurement, RetryPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Port scan failed: {0}")]
    Scan(#[from] crate::ports::ScanError),

    #[error("Invalid check: {message}")]
    InvalidSpec { message: String },

    #[error("Unrecognized output: {message}")]
    UnrecognizedOutput { message: String },
}

pub type CheckResult<T> = Result<T, CheckError>;

/// Shared state handed to every check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Directory relative check paths resolve against
    pub root: PathBuf,
    pub client: reqwest::Client,
    /// Upper bound for a single network request
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl CheckContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: reqwest::Client::new(),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn resolve_opt(&self, path: Option<&PathBuf>) -> PathBuf {
        match path {
            Some(p) => self.resolve(p),
            None => self.root.clone(),
        }
    }
}

#[async_trait]
pub trait Check: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement>;
}

/// Build the implementation for a configured check.
pub fn build_check(spec: &CheckSpec) -> CheckResult<Box<dyn Check>> {
    let id = spec.id.clone();
    let check: Box<dyn Check> = match &spec.kind {
        CheckKind::FileExists { path } => Box::new(files::FileExists::new(id, path.clone())),
        CheckKind::FileContains {
            path,
            pattern,
            absent,
        } => Box::new(files::FileContains::new(id, path.clone(), pattern, *absent)?),
        CheckKind::Command {
            program,
            args,
            cwd,
            expect_exit,
        } => Box::new(command::CommandCheck {
            id,
            invocation: command::Invocation::new(program, args.clone(), cwd.clone()),
            expect_exit: *expect_exit,
        }),
        CheckKind::TestSuite {
            program,
            args,
            cwd,
            min_pass_rate,
        } => Box::new(command::TestSuiteCheck {
            id,
            invocation: command::Invocation::new(program, args.clone(), cwd.clone()),
            min_pass_rate: *min_pass_rate,
            points: spec.points,
        }),
        CheckKind::Http {
            url,
            method,
            expect_status,
            body_contains,
        } => Box::new(http::HttpCheck::new(
            id,
            url.clone(),
            method,
            expect_status.clone(),
            body_contains.clone(),
        )?),
        CheckKind::Latency { urls, samples, .. } => {
            let ladder = spec
                .kind
                .ladder()
                .map_err(|e| CheckError::InvalidSpec {
                    message: e.to_string(),
                })?
                .unwrap_or_else(scoring::ScoreLadder::response_time);
            Box::new(http::LatencyCheck {
                id,
                urls: urls.clone(),
                samples: *samples,
                ladder,
                points: spec.points,
            })
        }
        CheckKind::Load {
            url,
            requests,
            concurrency,
            max_error_rate,
            max_p95_ms,
        } => Box::new(load::LoadCheck {
            id,
            url: url.clone(),
            requests: *requests,
            concurrency: *concurrency,
            max_error_rate: *max_error_rate,
            max_p95_ms: *max_p95_ms,
        }),
        CheckKind::GitClean {
            path,
            allow_untracked,
        } => Box::new(git::GitCleanCheck {
            id,
            path: path.clone(),
            allow_untracked: *allow_untracked,
        }),
        CheckKind::PortPolicy {
            root,
            include,
            exclude,
            expect,
            forbid,
        } => Box::new(ports::PortPolicyCheck {
            id,
            root: root.clone(),
            include: include.clone(),
            exclude: exclude.clone(),
            expect: expect.clone(),
            forbid: forbid.clone(),
        }),
    };

    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: CheckKind) -> CheckSpec {
        CheckSpec {
            id: "probe".to_string(),
            name: None,
            points: 10,
            critical: false,
            graded: false,
            hint: None,
            timeout_secs: None,
            kind,
        }
    }

    #[test]
    fn test_build_every_kind() {
        let kinds = vec![
            CheckKind::FileExists {
                path: "README.md".into(),
            },
            CheckKind::FileContains {
                path: "src/lib.rs".into(),
                pattern: "unsafe".to_string(),
                absent: true,
            },
            CheckKind::Command {
                program: "true".to_string(),
                args: vec![],
                cwd: None,
                expect_exit: 0,
            },
            CheckKind::TestSuite {
                program: "cargo".to_string(),
                args: vec!["test".to_string()],
                cwd: None,
                min_pass_rate: 1.0,
            },
            CheckKind::Http {
                url: "http://localhost:5000/".to_string(),
                method: "head".to_string(),
                expect_status: vec![],
                body_contains: None,
            },
            CheckKind::Latency {
                urls: vec!["http://localhost:5000/".to_string()],
                ladder: None,
                samples: 1,
            },
            CheckKind::Load {
                url: "http://localhost:5000/".to_string(),
                requests: 10,
                concurrency: 2,
                max_error_rate: 0.0,
                max_p95_ms: None,
            },
            CheckKind::GitClean {
                path: None,
                allow_untracked: false,
            },
            CheckKind::PortPolicy {
                root: None,
                include: vec![],
                exclude: vec![],
                expect: vec![5000],
                forbid: vec![],
            },
        ];

        for kind in kinds {
            let label = kind.label();
            let check = build_check(&spec(kind)).unwrap_or_else(|e| panic!("{label}: {e}"));
            assert_eq!(check.id(), "probe");
        }
    }

    #[test]
    fn test_build_rejects_bad_pattern() {
        let result = build_check(&spec(CheckKind::FileContains {
            path: "x".into(),
            pattern: "(".to_string(),
            absent: false,
        }));
        assert!(matches!(result, Err(CheckError::Pattern(_))));
    }

    #[test]
    fn test_context_resolves_relative_paths() {
        let ctx = CheckContext::new("/srv/app");
        assert_eq!(ctx.resolve(Path::new("README.md")), PathBuf::from("/srv/app/README.md"));
        assert_eq!(ctx.resolve(Path::new("/etc/hosts")), PathBuf::from("/etc/hosts"));
        assert_eq!(ctx.resolve_opt(None), PathBuf::from("/srv/app"));
    }
}
