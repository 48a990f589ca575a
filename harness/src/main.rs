use clap::{Parser, Subcommand};
use harness::{
    load_report, render_diff, render_summary, run_load, write_json, write_markdown, CheckContext,
    GateRunner, PortScanner,
};
use scoring::{SuiteConfig, Verdict};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Run gated audit suites and report real pass/fail scores")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite and write its report
    Run {
        /// Suite definition (TOML)
        #[arg(short, long)]
        suite: PathBuf,
        /// Directory relative check paths resolve against
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Write the JSON report here
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write a markdown report here
        #[arg(long)]
        markdown: Option<PathBuf>,
        /// Run only this gate
        #[arg(short, long)]
        gate: Option<String>,
        /// Run later gates even after one fails
        #[arg(long)]
        keep_going: bool,
        /// Override the suite's default per-check timeout (seconds)
        #[arg(long)]
        timeout: Option<u64>,
        /// Override the suite's per-request timeout for network checks (seconds)
        #[arg(long)]
        request_timeout: Option<u64>,
    },
    /// Check a suite definition without running it
    Validate {
        #[arg(short, long)]
        suite: PathBuf,
    },
    /// List gates and checks of a suite
    List {
        #[arg(short, long)]
        suite: PathBuf,
    },
    /// Inventory the ports declared in a source tree
    Ports {
        /// Root of the tree to scan
        #[arg(default_value = ".")]
        root: PathBuf,
        /// Glob of files to scan, relative to the root (repeatable)
        #[arg(long)]
        include: Vec<String>,
        /// Glob of files to skip, relative to the root (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Print the inventory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fire a burst of GET requests at a URL and print latency statistics
    Load {
        #[arg(short, long)]
        url: String,
        #[arg(short = 'n', long, default_value = "100")]
        requests: u32,
        #[arg(short, long, default_value = "10")]
        concurrency: usize,
        /// Per-request timeout (seconds)
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Compare two JSON reports
    Diff {
        old: PathBuf,
        new: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            suite,
            root,
            json,
            markdown,
            gate,
            keep_going,
            timeout,
            request_timeout,
        } => {
            let overrides = TimeoutOverrides {
                check: timeout,
                request: request_timeout,
            };
            run_suite(suite, root, json, markdown, gate, keep_going, overrides).await
        }
        Commands::Validate { suite } => validate_suite(&suite),
        Commands::List { suite } => list_suite(&suite),
        Commands::Ports {
            root,
            include,
            exclude,
            json,
        } => scan_ports(root, include, exclude, json),
        Commands::Load {
            url,
            requests,
            concurrency,
            timeout,
        } => load_probe(&url, requests, concurrency, timeout).await,
        Commands::Diff { old, new } => diff_reports(&old, &new),
    }
}

fn load_suite(path: &PathBuf) -> Result<SuiteConfig, Box<dyn std::error::Error>> {
    match SuiteConfig::load(path) {
        Ok(config) => {
            info!(suite = %config.name, path = %path.display(), "Loaded suite");
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load suite {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

struct TimeoutOverrides {
    check: Option<u64>,
    request: Option<u64>,
}

async fn run_suite(
    suite: PathBuf,
    root: PathBuf,
    json: Option<PathBuf>,
    markdown: Option<PathBuf>,
    gate: Option<String>,
    keep_going: bool,
    overrides: TimeoutOverrides,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = load_suite(&suite)?;
    if let Some(secs) = overrides.check {
        config.defaults.timeout_secs = secs;
    }
    if let Some(secs) = overrides.request {
        config.defaults.request_timeout_secs = secs;
    }
    if overrides.check.is_some() || overrides.request.is_some() {
        config.validate()?;
    }

    let runner = GateRunner::from_config(config, root)
        .with_keep_going(keep_going)
        .with_gate_filter(gate);
    let report = runner.run().await?;

    print!("{}", render_summary(&report));

    if let Some(path) = json {
        write_json(&report, &path)?;
    }
    if let Some(path) = markdown {
        write_markdown(&report, &path)?;
    }

    Ok(match report.verdict {
        Verdict::Pass => ExitCode::SUCCESS,
        Verdict::Fail => ExitCode::FAILURE,
    })
}

fn validate_suite(suite: &PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_suite(suite)?;
    println!(
        "✓ Suite '{}' is valid: {} gates, {} checks",
        config.name,
        config.gates.len(),
        config.check_count()
    );
    Ok(ExitCode::SUCCESS)
}

fn list_suite(suite: &PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_suite(suite)?;
    println!("Suite: {}", config.name);
    if !config.description.is_empty() {
        println!("  {}", config.description);
    }

    for (index, gate) in config.gates.iter().enumerate() {
        println!(
            "\n{}. {} (threshold {}%, {} points)",
            index + 1,
            gate.name,
            gate.threshold,
            gate.max_points()
        );
        for check in &gate.checks {
            println!(
                "  - {:<24} {:>4} pts  {}{}",
                check.id,
                check.points,
                check.kind.label(),
                if check.critical { "  critical" } else { "" }
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn scan_ports(
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let inventory = PortScanner::new(root)
        .with_include(include)
        .with_exclude(exclude)
        .scan()?;

    if json {
        println!("{}", inventory.to_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    if inventory.ports.is_empty() {
        println!("No ports found in {} files.", inventory.files_scanned);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} ports in {} files:",
        inventory.ports.len(),
        inventory.files_scanned
    );
    for (port, locations) in &inventory.ports {
        println!("  {}", port);
        for location in locations {
            println!(
                "    {}:{} ({})",
                location.path.display(),
                location.line,
                location.kind
            );
        }
    }

    let conflicts = inventory.conflicts();
    if !conflicts.is_empty() {
        println!("\nDeclared in more than one file:");
        for (port, files) in conflicts {
            let files: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
            println!("  {}: {}", port, files.join(", "));
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn load_probe(
    url: &str,
    requests: u32,
    concurrency: usize,
    timeout: u64,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if requests == 0 || concurrency == 0 || timeout == 0 {
        return Err("requests, concurrency and timeout must be greater than 0".into());
    }

    let ctx = CheckContext::new(".").with_request_timeout(Duration::from_secs(timeout));
    let stats = run_load(&ctx, url, requests, concurrency).await;

    println!("Requests:    {} ({} failed)", stats.requests, stats.failed);
    println!("Error rate:  {:.2}%", stats.error_rate * 100.0);
    println!("Latency p50: {:.1}ms", stats.p50_ms);
    println!("Latency p95: {:.1}ms", stats.p95_ms);
    println!("Latency max: {:.1}ms", stats.max_ms);
    println!("Throughput:  {:.1} req/s", stats.requests_per_second);

    Ok(if stats.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn diff_reports(old: &PathBuf, new: &PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let before = load_report(old)?;
    let after = load_report(new)?;
    let diff = after.diff(&before);

    print!("{}", render_diff(&diff));

    Ok(if diff.has_regressions() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
