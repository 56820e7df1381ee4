//! Level definitions
//!
//! A level is a grid world plus the agent's starting facing and an optional
//! limit on how many distinct blocks a solution may use. On disk it is JSON:
//!
//! ```json
//! {
//!   "name": "corridor",
//!   "map": ["#####", "#S.F#", "#####"],
//!   "expected": ["- - - - -", "- E E - -", "- - - - -"],
//!   "start_facing": "east",
//!   "max_blocks": 4
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::agent::Pose;
use super::error::GridError;
use super::grid::{Direction, GridWorld};

/// Serialized form of a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFile {
    /// Display name
    pub name: String,
    /// Map rows (`#` wall, `.` open, `S` start, `F` finish)
    pub map: Vec<String>,
    /// Expected-direction rows, whitespace separated, `-` for none
    pub expected: Vec<String>,
    /// Facing of the agent at the start cell
    #[serde(default = "default_facing")]
    pub start_facing: Direction,
    /// Maximum number of distinct blocks a solution may use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks: Option<usize>,
}

fn default_facing() -> Direction {
    Direction::East
}

/// Validated level
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    name: String,
    world: GridWorld,
    start_facing: Direction,
    max_blocks: Option<usize>,
}

impl Level {
    /// Build a level from an already validated world
    pub fn new(name: impl Into<String>, world: GridWorld, start_facing: Direction) -> Self {
        Self {
            name: name.into(),
            world,
            start_facing,
            max_blocks: None,
        }
    }

    /// Limit the number of distinct blocks
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    /// Level name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid world
    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    /// Starting facing
    pub fn start_facing(&self) -> Direction {
        self.start_facing
    }

    /// Block limit, if any
    pub fn max_blocks(&self) -> Option<usize> {
        self.max_blocks
    }

    /// Pose the agent takes at the beginning of every run
    pub fn start_pose(&self) -> Pose {
        Pose::new(self.world.start(), self.start_facing)
    }

    /// Serialized form
    pub fn to_file(&self) -> LevelFile {
        LevelFile {
            name: self.name.clone(),
            map: self.world.to_rows(),
            expected: self.world.expected_rows(),
            start_facing: self.start_facing,
            max_blocks: self.max_blocks,
        }
    }
}

impl TryFrom<LevelFile> for Level {
    type Error = GridError;

    fn try_from(file: LevelFile) -> Result<Self, Self::Error> {
        let world = GridWorld::from_rows(&file.map, &file.expected)?;
        Ok(Self {
            name: file.name,
            world,
            start_facing: file.start_facing,
            max_blocks: file.max_blocks,
        })
    }
}
