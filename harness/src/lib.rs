pub mod checks;
pub mod error;
pub mod output;
pub mod ports;
pub mod runner;

pub use checks::load::{run_load, LoadStats};
pub use checks::test_summary::{Runner as TestRunnerKind, TestSummary};
pub use checks::{build_check, Check, CheckContext, CheckError, CheckResult};
pub use error::{HarnessError, HarnessResult};
pub use output::{load_report, render_diff, render_summary, write_json, write_markdown};
pub use ports::{scan_text, PortHit, PortInventory, PortKind, PortLocation, PortScanner, ScanError};
pub use runner::GateRunner;
