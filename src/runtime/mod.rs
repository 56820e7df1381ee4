//! Runtime orchestrator and public API
//!
//! This module provides the main `Runtime` struct that ties a level to the
//! executor, the replay scheduler and the idempotence guard, and exposes the
//! interface a presentation layer drives.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub mod action_log;
pub mod agent;
pub mod context;
pub mod driver;
pub mod error;
pub mod executor;
pub mod grid;
pub mod guard;
pub mod level;
pub mod outcome;
pub mod scheduler;
pub mod storage;

use action_log::ActionLog;
use agent::Pose;
use context::RunContext;
use error::{Result, RuntimeError};
use executor::{ExecutionReport, Executor, SensePolicy};
use guard::IdempotenceGuard;
use level::Level;
use outcome::{CadencePolicy, ExecutionResult};
use scheduler::{ReplayScheduler, ReplaySink, ReplayState};

use crate::interpreter::{ScriptError, compile};

/// Configuration for the gridplay runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interpreter ticks a script may consume before it times out
    pub tick_budget: u64,

    /// Maximum nesting of loops, branches and procedure calls
    pub max_call_depth: usize,

    /// How repeated sense calls from one block are answered
    pub sense_policy: SensePolicy,

    /// Skip the visual step for blocks already animated in this run
    pub dedupe_animation: bool,

    /// Replay step delays
    pub cadence: CadencePolicy,

    /// Raise the binary's log level to DEBUG
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_budget: 10_000,
            max_call_depth: 64,
            sense_policy: SensePolicy::default(),
            dedupe_animation: true,
            cadence: CadencePolicy::default(),
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.tick_budget == 0 {
            return Err(RuntimeError::Config("tick_budget must be positive".into()));
        }
        if self.max_call_depth == 0 {
            return Err(RuntimeError::Config("max_call_depth must be positive".into()));
        }
        Ok(())
    }

    /// Tracing level a front end should install for this configuration
    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// The main runtime orchestrator
///
/// Owns the level, the current run's context and the replay scheduler.
/// Time is explicit: callers report elapsed milliseconds through
/// [`advance`](Self::advance), or hand the runtime to [`driver::play`].
pub struct Runtime {
    config: RuntimeConfig,
    level: Level,
    guard: IdempotenceGuard,
    context: RunContext,
    scheduler: ReplayScheduler,
    clock_ms: u64,
    last_report: Option<ExecutionReport>,
}

impl Runtime {
    /// Create a runtime for `level`
    pub fn new(config: RuntimeConfig, level: Level) -> Result<Self> {
        config.validate()?;

        let stray = level.world().off_path_cells();
        if !stray.is_empty() {
            debug!(level = level.name(), cells = stray.len(), "level has open cells off the solution path");
        }

        let guard = IdempotenceGuard::new();
        let context = RunContext::with_guard(level.start_pose(), guard.clone());
        let scheduler = ReplayScheduler::new(config.dedupe_animation);

        Ok(Self {
            config,
            level,
            guard,
            context,
            scheduler,
            clock_ms: 0,
            last_report: None,
        })
    }

    /// Load a level (and optionally a configuration) from disk
    pub fn load(level: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => storage::load_config(path)?,
            None => RuntimeConfig::default(),
        };
        let level = storage::load_level(level)?;
        Ok(Self::new(config, level)?)
    }

    /// Abandon the current run: cancel pending replay, clear the guard, and
    /// put the agent back at the start.
    pub fn reset(&mut self) {
        let dropped = self.scheduler.cancel();
        self.guard.clear();
        self.context = RunContext::with_guard(self.level.start_pose(), self.guard.clone());
        self.last_report = None;
        debug!(dropped, run = %self.context.id(), "runtime reset");
    }

    /// Reset, execute `script` and schedule its replay.
    pub fn run(&mut self, script: &str) -> Result<ExecutionReport> {
        self.reset();

        let report =
            Executor::new(self.level.world(), &self.config).execute(script, &mut self.context);

        let cadence = self.config.cadence.cadence_for(report.result);
        self.scheduler.start(&self.context, cadence, self.clock_ms)?;
        info!(
            level = self.level.name(),
            result = %report.result,
            entries = report.actions,
            "replay started"
        );

        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Move the clock forward by `elapsed_ms` and fire due replay steps.
    pub fn advance<S>(&mut self, elapsed_ms: u64, sink: &mut S) -> usize
    where
        S: ReplaySink + ?Sized,
    {
        self.clock_ms = self.clock_ms.saturating_add(elapsed_ms);
        self.scheduler.advance(self.clock_ms, &mut self.context, sink)
    }

    /// Milliseconds until the next replay timer, if any
    pub fn next_deadline_in(&self) -> Option<u64> {
        self.scheduler
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(self.clock_ms))
    }

    /// Fire every pending timer in order, jumping the clock between them.
    pub fn replay_to_end<S>(&mut self, sink: &mut S) -> usize
    where
        S: ReplaySink + ?Sized,
    {
        let mut fired = 0;
        while let Some(delay) = self.next_deadline_in() {
            fired += self.advance(delay, sink);
        }
        fired
    }

    /// Block budget left for `script`: the level's limit minus the distinct
    /// block ids the script uses. `None` if the level has no limit.
    pub fn remaining_capacity(&self, script: &str) -> std::result::Result<Option<i64>, ScriptError> {
        let program = compile(script)?;
        let used = program.block_ids().len() as i64;
        Ok(self.level.max_blocks().map(|max| max as i64 - used))
    }

    /// Result of the current run
    pub fn result(&self) -> ExecutionResult {
        self.context.result()
    }

    /// Pose shown to the player
    pub fn display_pose(&self) -> Pose {
        self.context.agent().display()
    }

    /// Authoritative pose
    pub fn logical_pose(&self) -> Pose {
        self.context.agent().logical()
    }

    /// Replay lifecycle state
    pub fn replay_state(&self) -> ReplayState {
        self.scheduler.state()
    }

    /// Entries not yet replayed
    pub fn action_log(&self) -> &ActionLog {
        self.context.log()
    }

    /// Report of the current run, if one has executed since the last reset
    pub fn last_report(&self) -> Option<&ExecutionReport> {
        self.last_report.as_ref()
    }

    /// Replay scheduler (for inspection)
    pub fn scheduler(&self) -> &ReplayScheduler {
        &self.scheduler
    }

    /// Guard shared by every run of this runtime
    pub fn guard(&self) -> &IdempotenceGuard {
        &self.guard
    }

    /// Current run context
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Loaded level
    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Get the current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Milliseconds elapsed on the runtime clock
    pub fn now_ms(&self) -> u64 {
        self.clock_ms
    }
}

// Re-export commonly used types
pub use action_log::{Action, ActionId, LogEntry};
pub use driver::{PlayOutcome, play};
pub use grid::{Coord, Direction, GridWorld, Relative};
pub use outcome::Termination;
pub use scheduler::{Frame, RecordingSink, ReplayEvent};
