use super::{Check, CheckContext, CheckError, CheckResult};
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use scoring::{Measurement, ScoreLadder};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Send one request, retrying transport failures per the context's policy.
/// HTTP error statuses are responses, not failures, and are never retried.
pub(crate) async fn send_with_retry(
    ctx: &CheckContext,
    method: &Method,
    url: &str,
) -> CheckResult<(Response, Duration)> {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let result = ctx
            .client
            .request(method.clone(), url)
            .timeout(ctx.request_timeout)
            .send()
            .await;

        match result {
            Ok(response) => return Ok((response, start.elapsed())),
            Err(e) if attempt < ctx.retry.max_retries => {
                let delay = ctx.retry.calculate_retry_delay(attempt);
                warn!(url, attempt, ?delay, "Request failed, retrying: {}", e);
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(CheckError::Http(e)),
        }
    }
}

pub struct HttpCheck {
    id: String,
    url: String,
    method: Method,
    expect_status: Vec<u16>,
    body_contains: Option<String>,
}

impl HttpCheck {
    pub fn new(
        id: impl Into<String>,
        url: String,
        method: &str,
        expect_status: Vec<u16>,
        body_contains: Option<String>,
    ) -> CheckResult<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            CheckError::InvalidSpec {
                message: format!("unsupported HTTP method '{method}'"),
            }
        })?;

        let expect_status = if expect_status.is_empty() {
            vec![StatusCode::OK.as_u16()]
        } else {
            expect_status
        };

        Ok(Self {
            id: id.into(),
            url,
            method,
            expect_status,
            body_contains,
        })
    }
}

#[async_trait]
impl Check for HttpCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let (response, latency) = send_with_retry(ctx, &self.method, &self.url).await?;
        let status = response.status().as_u16();
        let latency_ms = latency.as_secs_f64() * 1000.0;
        debug!(url = %self.url, status, latency_ms, "HTTP probe");

        let measurement = if !self.expect_status.contains(&status) {
            Measurement::fail(format!(
                "{} {} returned {} (expected {:?})",
                self.method, self.url, status, self.expect_status
            ))
        } else if let Some(needle) = &self.body_contains {
            let body = response.text().await?;
            if body.contains(needle.as_str()) {
                Measurement::pass(format!(
                    "{} {} returned {} with expected body",
                    self.method, self.url, status
                ))
            } else {
                Measurement::fail(format!(
                    "{} {} returned {} but body lacks {:?}",
                    self.method, self.url, status, needle
                ))
            }
        } else {
            Measurement::pass(format!("{} {} returned {}", self.method, self.url, status))
        };

        Ok(measurement
            .with_metric("status", status as f64)
            .with_metric("latency_ms", latency_ms))
    }
}

/// Mean response time over a set of endpoints, scored through a ladder.
///
/// A failed or 5xx request is charged the full request timeout.
pub struct LatencyCheck {
    pub id: String,
    pub urls: Vec<String>,
    pub samples: u32,
    pub ladder: ScoreLadder,
    pub points: u32,
}

#[async_trait]
impl Check for LatencyCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let penalty_ms = ctx.request_timeout.as_secs_f64() * 1000.0;
        let mut latencies = Vec::with_capacity(self.urls.len() * self.samples as usize);
        let mut failures = 0u32;

        for url in &self.urls {
            for _ in 0..self.samples {
                let start = Instant::now();
                let result = ctx
                    .client
                    .get(url)
                    .timeout(ctx.request_timeout)
                    .send()
                    .await;

                match result {
                    Ok(response) if !response.status().is_server_error() => {
                        latencies.push(start.elapsed().as_secs_f64() * 1000.0);
                    }
                    Ok(response) => {
                        debug!(url, status = %response.status(), "Latency sample failed");
                        failures += 1;
                        latencies.push(penalty_ms);
                    }
                    Err(e) => {
                        debug!(url, "Latency sample failed: {}", e);
                        failures += 1;
                        latencies.push(penalty_ms);
                    }
                }
            }
        }

        if latencies.is_empty() {
            return Err(CheckError::InvalidSpec {
                message: "latency check has no samples".to_string(),
            });
        }

        let mean_ms = latencies.iter().sum::<f64>() / latencies.len() as f64;
        let max_ms = latencies.iter().cloned().fold(0.0_f64, f64::max);
        let tier_points = self.ladder.award(mean_ms);
        let awarded = self.ladder.scaled_award(mean_ms, self.points);

        let details = format!(
            "mean {:.1}ms, max {:.1}ms over {} samples ({} failed), {}/{} points",
            mean_ms,
            max_ms,
            latencies.len(),
            failures,
            awarded,
            self.points
        );

        Ok(Measurement::graded(tier_points > 0, awarded, details)
            .with_metric("mean_ms", mean_ms)
            .with_metric("max_ms", max_ms)
            .with_metric("failures", failures as f64))
    }
}
