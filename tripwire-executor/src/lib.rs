//! Process supervision for the tripwire harness.
//!
//! Launches a target per fuzz case, feeds it the case input, scans its
//! stdout and stderr concurrently for crash signatures, enforces the case
//! deadline, and stops runaway targets with a graduated
//! interrupt/terminate/kill escalation.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod engine;
pub mod error;
pub mod escalation;
pub mod launcher;
mod monitor;
pub mod report;
pub mod supervisor;

pub use engine::CaseExecutor;
pub use error::CaseError;
pub use escalation::{
    EscalationResult, EscalationStep, Escalator, PlatformTerminator, Terminator, ESCALATION_WINDOW,
};
pub use launcher::{InputDelivery, TargetProcess};
pub use monitor::MAX_LINE_LEN;
pub use report::CaseReport;
pub use supervisor::CaseSupervisor;
