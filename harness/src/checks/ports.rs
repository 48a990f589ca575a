use super::{Check, CheckContext, CheckError, CheckResult};
use crate::ports::PortScanner;
use async_trait::async_trait;
use scoring::Measurement;
use std::path::PathBuf;

/// Ports that must, or must not, be declared somewhere in the tree.
pub struct PortPolicyCheck {
    pub id: String,
    pub root: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub expect: Vec<u16>,
    pub forbid: Vec<u16>,
}

#[async_trait]
impl Check for PortPolicyCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let scanner = PortScanner::new(ctx.resolve_opt(self.root.as_ref()))
            .with_include(self.include.clone())
            .with_exclude(self.exclude.clone());

        let inventory = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| CheckError::InvalidSpec {
                message: format!("port scan task failed: {e}"),
            })??;

        let missing: Vec<u16> = self
            .expect
            .iter()
            .copied()
            .filter(|p| !inventory.contains(*p))
            .collect();

        let forbidden: Vec<String> = self
            .forbid
            .iter()
            .copied()
            .filter(|p| inventory.contains(*p))
            .map(|p| {
                let first = &inventory.locations(p)[0];
                format!("{} ({}:{})", p, first.path.display(), first.line)
            })
            .collect();

        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("expected ports not declared: {:?}", missing));
        }
        if !forbidden.is_empty() {
            problems.push(format!("forbidden ports declared: {}", forbidden.join(", ")));
        }

        let summary = format!(
            "{} ports across {} files",
            inventory.ports.len(),
            inventory.files_scanned
        );

        let measurement = if problems.is_empty() {
            Measurement::pass(summary)
        } else {
            Measurement::fail(format!("{}; {}", summary, problems.join("; ")))
        };

        Ok(measurement
            .with_metric("ports", inventory.ports.len() as f64)
            .with_metric("files_scanned", inventory.files_scanned as f64)
            .with_metric("conflicts", inventory.conflicts().len() as f64))
    }
}
