pub mod config;
pub mod error;
pub mod gate;
pub mod report;
pub mod score;
pub mod types;

pub use config::{CheckKind, CheckSpec, Defaults, GateSpec, RetryPolicy, SuiteConfig};
pub use error::{ScoringError, ScoringResult};
pub use gate::{evaluate_gate, GateOutcome, GateState, Progression, Verdict};
pub use report::{GateDiff, ReportDiff, RunReport, SCHEMA_VERSION};
pub use score::{proportional, Score, ScoreLadder, Tier};
pub use types::{CheckOutcome, CheckStatus, Measurement};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::gate::*;
    pub use crate::report::*;
    pub use crate::score::*;
    pub use crate::types::*;
}
