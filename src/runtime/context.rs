//! Per-run state
//!
//! A `RunContext` bundles everything that belongs to exactly one run: the
//! action log, the idempotence guard handle, the agent's poses and the
//! result. A fresh context is built for every run so nothing leaks between
//! runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::action_log::{ActionLog, LogEntry};
use super::agent::{AgentState, Pose};
use super::error::ContextError;
use super::guard::IdempotenceGuard;
use super::outcome::ExecutionResult;

/// Run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new random RunId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State owned by a single run
#[derive(Debug)]
pub struct RunContext {
    id: RunId,
    log: ActionLog,
    guard: IdempotenceGuard,
    agent: AgentState,
    result: ExecutionResult,
}

impl RunContext {
    /// Fresh context with its own guard
    pub fn new(start: Pose) -> Self {
        Self::with_guard(start, IdempotenceGuard::new())
    }

    /// Fresh context sharing an existing (already cleared) guard
    pub fn with_guard(start: Pose, guard: IdempotenceGuard) -> Self {
        Self {
            id: RunId::new(),
            log: ActionLog::new(),
            guard,
            agent: AgentState::new(start),
            result: ExecutionResult::Unset,
        }
    }

    /// Run identifier
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Remaining action log
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Guard handle for this run
    pub fn guard(&self) -> &IdempotenceGuard {
        &self.guard
    }

    /// Agent poses
    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    /// Current result
    pub fn result(&self) -> ExecutionResult {
        self.result
    }

    /// Set the result. Only the first settlement counts.
    pub fn settle(&mut self, result: ExecutionResult) -> Result<(), ContextError> {
        if self.result != ExecutionResult::Unset {
            return Err(ContextError::AlreadySettled {
                run: self.id.to_string(),
                existing: self.result.to_string(),
            });
        }
        self.result = result;
        Ok(())
    }

    pub(crate) fn record(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    pub(crate) fn log_mut(&mut self) -> &mut ActionLog {
        &mut self.log
    }

    pub(crate) fn agent_mut(&mut self) -> &mut AgentState {
        &mut self.agent
    }
}
