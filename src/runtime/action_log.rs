//! Append-only action log
//!
//! Every native call made by a script during execution appends one entry,
//! keyed by the block that issued it. The replay scheduler consumes the log
//! front to back.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::grid::{Coord, Direction};

/// Stable identity of the block that produced an action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ActionId(String);

impl ActionId {
    /// Create a new ActionId from a block identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recorded effect of one native call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    /// Validated step between two cells
    Move {
        /// Cell left
        from: Coord,
        /// Cell entered
        to: Coord,
    },
    /// Anticlockwise rotation
    RotateLeft {
        /// Facing before
        from: Direction,
        /// Facing after
        to: Direction,
    },
    /// Clockwise rotation (also used for a zero rotation)
    RotateRight {
        /// Facing before
        from: Direction,
        /// Facing after
        to: Direction,
    },
    /// Direction query and its answer
    Sense {
        /// Absolute bearing queried
        toward: Direction,
        /// Whether the step was legal
        open: bool,
    },
    /// Rejected step; the agent stays in place
    Bump {
        /// Cell the agent stood on
        at: Coord,
        /// Bearing of the rejected step
        toward: Direction,
    },
    /// Explicit finish signal
    Finish {
        /// Cell the agent stood on
        at: Coord,
    },
}

impl Action {
    /// Short label used in logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::RotateLeft { .. } => "rotate-left",
            Action::RotateRight { .. } => "rotate-right",
            Action::Sense { .. } => "sense",
            Action::Bump { .. } => "bump",
            Action::Finish { .. } => "finish",
        }
    }
}

/// One log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Originating block
    pub block: ActionId,
    /// What happened
    pub action: Action,
}

impl LogEntry {
    /// Create an entry
    pub fn new(block: ActionId, action: Action) -> Self {
        Self { block, action }
    }
}

/// Ordered action sequence for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    entries: VecDeque<LogEntry>,
}

impl ActionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
    }

    /// Take the oldest entry
    pub fn pop_front(&mut self) -> Option<LogEntry> {
        self.entries.pop_front()
    }

    /// Oldest entry, if any
    pub fn front(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// Whether the log has no entries left
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries left
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over the remaining entries in order
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_in_push_order() {
        let mut log = ActionLog::new();
        assert!(log.is_empty());
        log.push(LogEntry::new(
            ActionId::new("a"),
            Action::Finish {
                at: Coord::new(0, 0),
            },
        ));
        log.push(LogEntry::new(
            ActionId::new("b"),
            Action::Sense {
                toward: Direction::East,
                open: true,
            },
        ));
        assert_eq!(log.len(), 2);
        assert_eq!(log.front().map(|e| e.block.as_str()), Some("a"));
        assert_eq!(log.pop_front().map(|e| e.block), Some(ActionId::new("a")));
        assert_eq!(log.pop_front().map(|e| e.action.label()), Some("sense"));
        assert!(log.pop_front().is_none());
    }

    #[test]
    fn serializes_tagged_actions() {
        let action = Action::RotateRight {
            from: Direction::East,
            to: Direction::South,
        };
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["kind"], "rotate-right");
        assert_eq!(json["to"], "south");
    }
}
