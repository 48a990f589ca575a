//! Bounded-concurrency HTTP load probe.

use super::{Check, CheckContext, CheckResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scoring::Measurement;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub requests: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub error_rate: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub requests_per_second: f64,
    pub elapsed_ms: f64,
}

struct Sample {
    ok: bool,
    elapsed: Duration,
}

/// Nearest-rank percentile over sorted values.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Fire `requests` GETs at `url` with at most `concurrency` in flight.
pub async fn run_load(ctx: &CheckContext, url: &str, requests: u32, concurrency: usize) -> LoadStats {
    info!(url, requests, concurrency, "Starting load probe");
    let started = Instant::now();

    let samples: Vec<Sample> = stream::iter(0..requests)
        .map(move |_| async move {
            let start = Instant::now();
            let result = ctx
                .client
                .get(url)
                .timeout(ctx.request_timeout)
                .send()
                .await;
            let ok = match result {
                Ok(response) => {
                    let status = response.status();
                    status.is_success() || status.is_redirection()
                }
                Err(e) => {
                    debug!(url, "Load request failed: {}", e);
                    false
                }
            };
            Sample {
                ok,
                elapsed: start.elapsed(),
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let elapsed = started.elapsed();
    summarize(&samples, elapsed)
}

fn summarize(samples: &[Sample], elapsed: Duration) -> LoadStats {
    let mut latencies: Vec<f64> = samples
        .iter()
        .map(|s| s.elapsed.as_secs_f64() * 1000.0)
        .collect();
    latencies.sort_by(|a, b| a.total_cmp(b));

    let requests = samples.len() as u32;
    let succeeded = samples.iter().filter(|s| s.ok).count() as u32;
    let failed = requests - succeeded;
    let elapsed_secs = elapsed.as_secs_f64();

    LoadStats {
        requests,
        succeeded,
        failed,
        error_rate: if requests == 0 {
            0.0
        } else {
            failed as f64 / requests as f64
        },
        p50_ms: percentile(&latencies, 50.0),
        p95_ms: percentile(&latencies, 95.0),
        max_ms: latencies.last().copied().unwrap_or(0.0),
        requests_per_second: if elapsed_secs > 0.0 {
            requests as f64 / elapsed_secs
        } else {
            0.0
        },
        elapsed_ms: elapsed_secs * 1000.0,
    }
}

pub struct LoadCheck {
    pub id: String,
    pub url: String,
    pub requests: u32,
    pub concurrency: usize,
    pub max_error_rate: f64,
    pub max_p95_ms: Option<f64>,
}

#[async_trait]
impl Check for LoadCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let stats = run_load(ctx, &self.url, self.requests, self.concurrency).await;

        let mut problems = Vec::new();
        if stats.error_rate > self.max_error_rate {
            problems.push(format!(
                "error rate {:.1}% above {:.1}%",
                stats.error_rate * 100.0,
                self.max_error_rate * 100.0
            ));
        }
        if let Some(limit) = self.max_p95_ms {
            if stats.p95_ms > limit {
                problems.push(format!("p95 {:.1}ms above {:.1}ms", stats.p95_ms, limit));
            }
        }

        let summary = format!(
            "{}/{} ok at concurrency {}, p50 {:.1}ms, p95 {:.1}ms, {:.1} req/s",
            stats.succeeded,
            stats.requests,
            self.concurrency,
            stats.p50_ms,
            stats.p95_ms,
            stats.requests_per_second
        );

        let measurement = if problems.is_empty() {
            Measurement::pass(summary)
        } else {
            Measurement::fail(format!("{}: {}", summary, problems.join("; ")))
        };

        Ok(measurement
            .with_metric("error_rate", stats.error_rate)
            .with_metric("p50_ms", stats.p50_ms)
            .with_metric("p95_ms", stats.p95_ms)
            .with_metric("rps", stats.requests_per_second))
    }
}
