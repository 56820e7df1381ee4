//! Error types for the gridplay runtime
//!
//! Domain errors use thiserror. Script outcomes (timeouts, crashes, faults in
//! user programs) are not errors: they are reported as `ExecutionResult`
//! values by the executor.

use thiserror::Error;

use super::grid::Coord;
use super::scheduler::ReplayState;
use crate::interpreter::ScriptError;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Level map errors
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    /// Replay scheduling errors
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Per-run context errors
    #[error("Run context error: {0}")]
    Context(#[from] ContextError),

    /// Script could not be parsed or validated
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Grid-world construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// The map has no rows or no columns
    #[error("map is empty")]
    Empty,

    /// A map row has a different width from the first row
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        /// Row index
        row: usize,
        /// Width of the first row
        expected: usize,
        /// Width of the offending row
        found: usize,
    },

    /// Unrecognised map symbol
    #[error("unknown cell symbol '{symbol}' at {at}")]
    UnknownCell {
        /// Symbol found in the map text
        symbol: char,
        /// Location of the symbol
        at: Coord,
    },

    /// Unrecognised direction token in the expected-direction table
    #[error("unknown direction '{token}' at {at}")]
    UnknownDirection {
        /// Token found in the table
        token: String,
        /// Location of the token
        at: Coord,
    },

    /// The expected-direction table does not match the map dimensions
    #[error("expected-direction table is {rows}x{cols}, map is {map_rows}x{map_cols}")]
    TableShape {
        /// Table rows
        rows: usize,
        /// Table columns (of the first mismatching row)
        cols: usize,
        /// Map rows
        map_rows: usize,
        /// Map columns
        map_cols: usize,
    },

    /// No START cell
    #[error("map has no start cell")]
    MissingStart,

    /// No FINISH cell
    #[error("map has no finish cell")]
    MissingFinish,

    /// More than one START cell
    #[error("second start cell at {0}")]
    DuplicateStart(Coord),

    /// More than one FINISH cell
    #[error("second finish cell at {0}")]
    DuplicateFinish(Coord),

    /// A wall carries an expected direction
    #[error("wall at {0} has an expected direction")]
    DirectionOnWall(Coord),

    /// Following expected directions from START does not reach FINISH
    #[error("expected-direction chain breaks at {at}")]
    BrokenChain {
        /// Last cell reached on the chain
        at: Coord,
    },

    /// Following expected directions from START loops
    #[error("expected-direction chain revisits {at}")]
    ChainCycle {
        /// First revisited cell
        at: Coord,
    },
}

/// Convenience result alias for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;

/// Replay scheduler errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// `start` called while a replay is already in progress or drained
    #[error("replay cannot start from state {0:?}")]
    NotIdle(ReplayState),

    /// `start` called before the run has a result
    #[error("run has no result yet")]
    Unsettled,
}

/// Convenience result alias for replay operations
pub type ReplayResult<T> = std::result::Result<T, ReplayError>;

/// Run context errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// The run result was already set
    #[error("run {run} already settled as {existing}")]
    AlreadySettled {
        /// Run identifier
        run: String,
        /// Result recorded first
        existing: String,
    },
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
