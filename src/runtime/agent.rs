//! Agent state
//!
//! The agent has two poses. The logical pose is authoritative and is only
//! advanced by the executor when a move is validated. The display pose is
//! what the player sees and is only driven by the replay scheduler.

use serde::{Deserialize, Serialize};

use super::grid::{Coord, Direction};

/// Position plus facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pose {
    /// Cell the agent stands on
    pub position: Coord,
    /// Compass facing
    pub facing: Direction,
}

impl Pose {
    /// Create a pose
    pub fn new(position: Coord, facing: Direction) -> Self {
        Self { position, facing }
    }
}

/// Logical and display poses of the agent for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    logical: Pose,
    display: Pose,
}

impl AgentState {
    /// Both poses at `start`
    pub fn new(start: Pose) -> Self {
        Self {
            logical: start,
            display: start,
        }
    }

    /// Authoritative pose used for correctness checks
    pub fn logical(&self) -> Pose {
        self.logical
    }

    /// Animated pose used for rendering
    pub fn display(&self) -> Pose {
        self.display
    }

    pub(crate) fn logical_mut(&mut self) -> &mut Pose {
        &mut self.logical
    }

    pub(crate) fn display_mut(&mut self) -> &mut Pose {
        &mut self.display
    }
}
