//! Outcome classification and replay cadence policy

use serde::{Deserialize, Serialize};
use std::fmt;

use super::grid::Coord;

/// Terminal result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionResult {
    /// Not yet classified
    #[default]
    Unset,
    /// Agent reached the finish
    Success,
    /// Script ended or crashed without reaching the finish
    Failure,
    /// Tick budget exhausted
    Timeout,
    /// Script could not be run (syntax, validation or interpreter fault)
    Error,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExecutionResult::Unset => "unset",
            ExecutionResult::Success => "success",
            ExecutionResult::Failure => "failure",
            ExecutionResult::Timeout => "timeout",
            ExecutionResult::Error => "error",
        };
        f.write_str(text)
    }
}

/// How execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "detail", rename_all = "kebab-case")]
pub enum Termination {
    /// Finish signal raised (finish cell entered or `finish` called)
    Finished,
    /// A move was rejected
    Crashed,
    /// Program ran off its end
    Completed,
    /// Tick budget ran out
    BudgetExhausted,
    /// Any other interpreter-level failure
    Fault(String),
}

/// Derive the run result from how execution ended and where the agent stands.
pub fn classify(termination: &Termination, final_position: Coord, finish: Coord) -> ExecutionResult {
    let at_finish = final_position == finish;
    match termination {
        Termination::Finished | Termination::Completed if at_finish => ExecutionResult::Success,
        Termination::Finished | Termination::Completed | Termination::Crashed => {
            ExecutionResult::Failure
        }
        Termination::BudgetExhausted => ExecutionResult::Timeout,
        Termination::Fault(_) => ExecutionResult::Error,
    }
}

/// Number of frames in the victory sequence
pub const VICTORY_FRAMES: u8 = 3;

/// Replay timing for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Delay between log entries
    pub step_ms: u64,
    /// Delay between victory frames
    pub victory_ms: u64,
}

/// Replay step delays per result, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadencePolicy {
    /// Successful runs
    pub success_ms: u64,
    /// Failed runs
    pub failure_ms: u64,
    /// Timed-out runs
    pub timeout_ms: u64,
    /// Runs that errored
    pub error_ms: u64,
    /// Victory sequence frames
    pub victory_ms: u64,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self {
            success_ms: 100,
            failure_ms: 150,
            timeout_ms: 150,
            error_ms: 150,
            victory_ms: 300,
        }
    }
}

impl CadencePolicy {
    /// Cadence for replaying a run with `result`
    pub fn cadence_for(&self, result: ExecutionResult) -> Cadence {
        let step_ms = match result {
            ExecutionResult::Success => self.success_ms,
            ExecutionResult::Timeout => self.timeout_ms,
            ExecutionResult::Error => self.error_ms,
            ExecutionResult::Failure | ExecutionResult::Unset => self.failure_ms,
        };
        Cadence {
            step_ms,
            victory_ms: self.victory_ms,
        }
    }
}
