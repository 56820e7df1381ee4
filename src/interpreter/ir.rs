use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::runtime::action_log::ActionId;
use crate::runtime::grid::{Direction, Relative};

/// Fully validated program ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramIr {
    /// Program identifier.
    pub name: String,
    /// Top-level statements.
    pub main: Vec<Instruction>,
    /// Procedure definitions, referenced by index from `Instruction::Call`.
    pub procedures: Vec<Procedure>,
}

impl ProgramIr {
    /// Distinct block identifiers used anywhere in the program.
    pub fn block_ids(&self) -> BTreeSet<ActionId> {
        let mut ids = BTreeSet::new();
        collect_ids(&self.main, &mut ids);
        for procedure in &self.procedures {
            collect_ids(&procedure.body, &mut ids);
        }
        ids
    }
}

/// Named, parameterless procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Procedure name.
    pub name: String,
    /// Statements executed on call.
    pub body: Vec<Instruction>,
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Call into the host's native API.
    Native(NativeCall),
    /// Run the body a fixed number of times.
    Repeat {
        /// Iteration count.
        times: u32,
        /// Loop body.
        body: Vec<Instruction>,
    },
    /// Run the body while the condition holds (checked before each pass).
    While {
        /// Loop condition.
        condition: Condition,
        /// Loop body.
        body: Vec<Instruction>,
    },
    /// Run the body until the budget runs out or the host halts the program.
    Forever(Vec<Instruction>),
    /// Conditional branch with optional `otherwise` body.
    Branch {
        /// Conditional arms evaluated in order.
        arms: Vec<BranchArm>,
        /// Fallback body executed when no condition matches.
        otherwise: Option<Vec<Instruction>>,
    },
    /// Invoke a procedure by index.
    Call(usize),
}

/// One arm of a conditional branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchArm {
    /// Condition to evaluate for this arm.
    pub condition: Condition,
    /// Body executed when the condition holds.
    pub body: Vec<Instruction>,
}

/// Native API call issued by a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCall {
    /// Operation requested.
    pub op: NativeOp,
    /// Block that issued the call.
    pub block: ActionId,
}

/// Native operations exposed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeOp {
    /// Step one cell toward the current facing.
    MoveForward,
    /// Step one cell away from the current facing without turning.
    MoveBackward,
    /// Quarter turn anticlockwise.
    TurnLeft,
    /// Quarter turn clockwise.
    TurnRight,
    /// Turn to an absolute bearing.
    Face(Direction),
    /// Signal that the program considers itself finished.
    Finish,
}

/// Conditions used by loops and branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Constant.
    Literal(bool),
    /// Whether a step in the relative direction is legal.
    Path {
        /// Direction relative to the agent's facing.
        toward: Relative,
        /// Block that issued the query.
        block: ActionId,
    },
    /// True while the agent is not on the finish cell.
    NotDone,
    /// Negation.
    Not(Box<Condition>),
    /// Conjunction (short-circuit, left to right).
    All(Vec<Condition>),
    /// Disjunction (short-circuit, left to right).
    Any(Vec<Condition>),
}

fn collect_ids(instructions: &[Instruction], ids: &mut BTreeSet<ActionId>) {
    for instruction in instructions {
        match instruction {
            Instruction::Native(call) => {
                ids.insert(call.block.clone());
            }
            Instruction::Repeat { body, .. } | Instruction::Forever(body) => collect_ids(body, ids),
            Instruction::While { condition, body } => {
                collect_condition_ids(condition, ids);
                collect_ids(body, ids);
            }
            Instruction::Branch { arms, otherwise } => {
                for arm in arms {
                    collect_condition_ids(&arm.condition, ids);
                    collect_ids(&arm.body, ids);
                }
                if let Some(body) = otherwise {
                    collect_ids(body, ids);
                }
            }
            Instruction::Call(_) => {}
        }
    }
}

fn collect_condition_ids(condition: &Condition, ids: &mut BTreeSet<ActionId>) {
    match condition {
        Condition::Path { block, .. } => {
            ids.insert(block.clone());
        }
        Condition::Not(inner) => collect_condition_ids(inner, ids),
        Condition::All(items) | Condition::Any(items) => {
            for item in items {
                collect_condition_ids(item, ids);
            }
        }
        Condition::Literal(_) | Condition::NotDone => {}
    }
}
