//! Sandbox executor
//!
//! Bridges the interpreter's native API onto the grid world and keeps the
//! run's books: every native call is logged against its block, the logical
//! pose advances only on validated moves, and the run ends through exactly
//! one termination channel. Script problems never escape as errors; they
//! become an `ExecutionResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::RuntimeConfig;
use super::action_log::{Action, ActionId, LogEntry};
use super::agent::Pose;
use super::context::{RunContext, RunId};
use super::grid::{Coord, Direction, GridWorld, Query, Relative};
use super::guard::Phase;
use super::outcome::{ExecutionResult, Termination, classify};
use crate::interpreter::{
    InterpreterHost, InterpreterRuntime, NativeCall, NativeOp, ProgramIr, RuntimeError, compile,
};

/// How repeated sense calls from the same block are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensePolicy {
    /// Recompute every call; count answers that differ from the block's first
    #[default]
    Recompute,
    /// Reuse the first answer a block produced for the rest of the run
    FirstAnswerSticks,
}

/// Signals raised by native calls that halt the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// Finish reached or requested
    #[error("finish signal")]
    Finish,
    /// Move rejected
    #[error("crashed at {at} heading {toward}")]
    Crash {
        /// Cell the agent stood on
        at: Coord,
        /// Bearing of the rejected move
        toward: Direction,
    },
}

/// Summary of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Run identifier
    pub run_id: RunId,
    /// Program name
    pub program: String,
    /// Blake3 digest of the script text
    pub script_digest: String,
    /// When execution started
    pub started_at: DateTime<Utc>,
    /// How execution ended
    pub termination: Termination,
    /// Classified result
    pub result: ExecutionResult,
    /// Interpreter ticks consumed
    pub ticks: u64,
    /// Entries recorded in the action log
    pub actions: usize,
    /// Logical pose at the end of execution
    pub final_pose: Pose,
    /// Sense calls whose fresh answer differed from the block's first answer
    pub sense_divergences: usize,
}

/// Runs scripts against a grid world
pub struct Executor<'a> {
    world: &'a GridWorld,
    config: &'a RuntimeConfig,
}

impl<'a> Executor<'a> {
    /// Create an executor for `world`
    pub fn new(world: &'a GridWorld, config: &'a RuntimeConfig) -> Self {
        Self { world, config }
    }

    /// Execute `script`, recording into `ctx` and settling its result.
    pub fn execute(&self, script: &str, ctx: &mut RunContext) -> ExecutionReport {
        let started_at = Utc::now();
        let script_digest = blake3::hash(script.as_bytes()).to_hex().to_string();

        let (program, termination, ticks, sense_divergences) = match compile(script) {
            Ok(program) => {
                let name = program.name.clone();
                let (termination, ticks, divergences) = self.run_program(program, ctx);
                (name, termination, ticks, divergences)
            }
            Err(err) => {
                debug!(error = %err, "script rejected");
                ("anonymous".to_string(), Termination::Fault(err.to_string()), 0, 0)
            }
        };

        let final_pose = ctx.agent().logical();
        let result = classify(&termination, final_pose.position, self.world.finish());
        if let Err(err) = ctx.settle(result) {
            warn!(error = %err, "run already settled; keeping first result");
        }

        info!(
            run = %ctx.id(),
            program = %program,
            result = %ctx.result(),
            ticks,
            actions = ctx.log().len(),
            "execution finished"
        );

        ExecutionReport {
            run_id: ctx.id(),
            program,
            script_digest,
            started_at,
            termination,
            result: ctx.result(),
            ticks,
            actions: ctx.log().len(),
            final_pose,
            sense_divergences,
        }
    }

    fn run_program(&self, program: ProgramIr, ctx: &mut RunContext) -> (Termination, u64, usize) {
        let budget = self.config.tick_budget;
        let host = GameHost::new(self.world, ctx, self.config.sense_policy);
        let mut interpreter =
            InterpreterRuntime::with_max_depth(host, program, self.config.max_call_depth);

        let mut ticks = 0;
        let termination = loop {
            if !interpreter.has_work() {
                break Termination::Completed;
            }
            if ticks >= budget {
                debug!(budget, "tick budget exhausted");
                break Termination::BudgetExhausted;
            }
            ticks += 1;
            match interpreter.tick() {
                Ok(_) => {}
                Err(RuntimeError::Host(Interrupt::Finish)) => break Termination::Finished,
                Err(RuntimeError::Host(Interrupt::Crash { .. })) => break Termination::Crashed,
                Err(other) => break Termination::Fault(other.to_string()),
            }
        };

        let divergences = interpreter.into_host().divergences;
        (termination, ticks, divergences)
    }
}

struct GameHost<'a> {
    world: &'a GridWorld,
    ctx: &'a mut RunContext,
    policy: SensePolicy,
    first_answers: HashMap<ActionId, bool>,
    divergences: usize,
}

impl<'a> GameHost<'a> {
    fn new(world: &'a GridWorld, ctx: &'a mut RunContext, policy: SensePolicy) -> Self {
        Self {
            world,
            ctx,
            policy,
            first_answers: HashMap::new(),
            divergences: 0,
        }
    }

    fn pose(&self) -> Pose {
        self.ctx.agent().logical()
    }

    fn record(&mut self, block: &ActionId, action: Action) {
        self.ctx.record(LogEntry::new(block.clone(), action));
    }

    fn step(&mut self, block: &ActionId, relative: Relative) -> Result<(), Interrupt> {
        let pose = self.pose();
        let toward = pose.facing.relative(relative);
        match self.world.query(pose.position, toward) {
            Query::Open => {
                let to = pose.position.step(toward);
                self.ctx.agent_mut().logical_mut().position = to;
                self.record(
                    block,
                    Action::Move {
                        from: pose.position,
                        to,
                    },
                );
                if self.world.is_finish(to.x, to.y) {
                    return Err(Interrupt::Finish);
                }
                Ok(())
            }
            blocked => {
                debug!(%block, at = %pose.position, %toward, ?blocked, "move rejected");
                self.record(
                    block,
                    Action::Bump {
                        at: pose.position,
                        toward,
                    },
                );
                Err(Interrupt::Crash {
                    at: pose.position,
                    toward,
                })
            }
        }
    }

    fn rotate(&mut self, block: &ActionId, eighths: i32) {
        let from = self.pose().facing;
        let to = from.rotated(eighths);
        self.ctx.agent_mut().logical_mut().facing = to;
        let action = if eighths < 0 {
            Action::RotateLeft { from, to }
        } else {
            Action::RotateRight { from, to }
        };
        self.record(block, action);
    }
}

impl InterpreterHost for GameHost<'_> {
    type Error = Interrupt;

    fn call_native(&mut self, call: &NativeCall) -> Result<(), Self::Error> {
        debug!(block = %call.block, op = ?call.op, "native call");
        match call.op {
            NativeOp::MoveForward => self.step(&call.block, Relative::Forward),
            NativeOp::MoveBackward => self.step(&call.block, Relative::Back),
            NativeOp::TurnLeft => {
                self.rotate(&call.block, -2);
                Ok(())
            }
            NativeOp::TurnRight => {
                self.rotate(&call.block, 2);
                Ok(())
            }
            NativeOp::Face(target) => {
                let turn = self.pose().facing.turn_to(target);
                self.rotate(&call.block, turn);
                Ok(())
            }
            NativeOp::Finish => {
                let at = self.pose().position;
                self.record(&call.block, Action::Finish { at });
                Err(Interrupt::Finish)
            }
        }
    }

    fn sense(&mut self, toward: Relative, block: &ActionId) -> Result<bool, Self::Error> {
        let pose = self.pose();
        let absolute = pose.facing.relative(toward);
        let fresh = self.world.query(pose.position, absolute).is_open();

        let answer = if self.ctx.guard().mark(Phase::Sense, block.clone()) {
            self.first_answers.insert(block.clone(), fresh);
            fresh
        } else {
            let first = self.first_answers.get(block).copied().unwrap_or(fresh);
            match self.policy {
                SensePolicy::FirstAnswerSticks => first,
                SensePolicy::Recompute => {
                    if first != fresh {
                        self.divergences += 1;
                        debug!(%block, first, fresh, "sense answer differs from first answer");
                    }
                    fresh
                }
            }
        };

        self.record(
            block,
            Action::Sense {
                toward: absolute,
                open: answer,
            },
        );
        Ok(answer)
    }

    fn not_done(&mut self) -> Result<bool, Self::Error> {
        let position = self.pose().position;
        Ok(!self.world.is_finish(position.x, position.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> GridWorld {
        // Open cell south of the start is a decoy: physically open, never expected.
        GridWorld::from_rows(
            &["S..F", "..##"],
            &["E E E -", "- - - -"],
        )
        .expect("grid")
    }

    fn execute(script: &str, config: &RuntimeConfig) -> (ExecutionReport, RunContext) {
        let world = world();
        let mut ctx = RunContext::new(Pose::new(world.start(), Direction::East));
        let report = Executor::new(&world, config).execute(script, &mut ctx);
        (report, ctx)
    }

    #[test]
    fn reaching_finish_is_success() {
        let (report, ctx) = execute(
            "(move-forward a) (move-forward b) (move-forward c) (move-forward d)",
            &RuntimeConfig::default(),
        );
        assert_eq!(report.termination, Termination::Finished);
        assert_eq!(report.result, ExecutionResult::Success);
        // The fourth call never runs: reaching the finish halts the program.
        assert_eq!(ctx.log().len(), 3);
        assert_eq!(ctx.agent().logical().position, Coord::new(3, 0));
        assert_eq!(ctx.agent().display().position, Coord::new(0, 0));
    }

    #[test]
    fn unexpected_open_direction_crashes() {
        let (report, ctx) = execute("(turn-right a) (move-forward b)", &RuntimeConfig::default());
        assert_eq!(report.termination, Termination::Crashed);
        assert_eq!(report.result, ExecutionResult::Failure);
        let last = ctx.log().iter().last().expect("entry");
        assert_eq!(
            last.action,
            Action::Bump {
                at: Coord::new(0, 0),
                toward: Direction::South
            }
        );
        assert_eq!(ctx.agent().logical().position, Coord::new(0, 0));
    }

    #[test]
    fn fall_through_short_of_finish_is_failure() {
        let (report, _) = execute("(move-forward a)", &RuntimeConfig::default());
        assert_eq!(report.termination, Termination::Completed);
        assert_eq!(report.result, ExecutionResult::Failure);
    }

    #[test]
    fn explicit_finish_away_from_goal_fails() {
        let (report, ctx) = execute("(finish f)", &RuntimeConfig::default());
        assert_eq!(report.termination, Termination::Finished);
        assert_eq!(report.result, ExecutionResult::Failure);
        assert_eq!(ctx.log().front().map(|e| e.action.label()), Some("finish"));
    }

    #[test]
    fn infinite_loop_times_out() {
        let config = RuntimeConfig {
            tick_budget: 500,
            ..RuntimeConfig::default()
        };
        let (report, _) = execute("(forever)", &config);
        assert_eq!(report.termination, Termination::BudgetExhausted);
        assert_eq!(report.result, ExecutionResult::Timeout);
        assert_eq!(report.ticks, 500);
    }

    #[test]
    fn program_using_whole_budget_still_completes() {
        // Two ticks: the native call, then the main frame exit.
        let config = RuntimeConfig {
            tick_budget: 2,
            ..RuntimeConfig::default()
        };
        let (report, _) = execute("(turn-left a)", &config);
        assert_eq!(report.termination, Termination::Completed);
        assert_eq!(report.ticks, 2);
    }

    #[test]
    fn syntax_errors_become_error_results() {
        let (report, ctx) = execute("(move-forward", &RuntimeConfig::default());
        assert!(matches!(report.termination, Termination::Fault(_)));
        assert_eq!(report.result, ExecutionResult::Error);
        assert!(ctx.log().is_empty());
    }

    #[test]
    fn absolute_turns_take_the_short_way() {
        let (_, ctx) = execute("(turn north a) (turn south b) (turn south c)", &RuntimeConfig::default());
        let actions: Vec<_> = ctx.log().iter().map(|e| e.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::RotateLeft {
                    from: Direction::East,
                    to: Direction::North
                },
                Action::RotateRight {
                    from: Direction::North,
                    to: Direction::South
                },
                Action::RotateRight {
                    from: Direction::South,
                    to: Direction::South
                },
            ]
        );
    }

    #[test]
    fn recompute_policy_reports_divergence() {
        let script = "(repeat 2 (if (path-ahead s) (move-forward m)))";
        let (report, ctx) = execute(script, &RuntimeConfig::default());
        // (0,0) east is expected; (1,0) east is expected too, so no divergence.
        assert_eq!(report.sense_divergences, 0);
        assert_eq!(ctx.agent().logical().position, Coord::new(2, 0));

        let script = "(repeat 2 (if (path-ahead s) (move-forward m)) (turn-right r))";
        let (report, _) = execute(script, &RuntimeConfig::default());
        // Second pass senses south from (1,0): a wall, while the first answer was open.
        assert_eq!(report.sense_divergences, 1);
    }

    #[test]
    fn sticky_policy_reuses_first_answer() {
        let config = RuntimeConfig {
            sense_policy: SensePolicy::FirstAnswerSticks,
            ..RuntimeConfig::default()
        };
        let script = "(repeat 2 (if (path-ahead s) (move-forward m)) (turn-right r))";
        let (report, ctx) = execute(script, &config);
        // The stale "open" answer drives a move into the wall south of (1,0).
        assert_eq!(report.termination, Termination::Crashed);
        let senses: Vec<_> = ctx
            .log()
            .iter()
            .filter_map(|e| match e.action {
                Action::Sense { open, .. } => Some(open),
                _ => None,
            })
            .collect();
        assert_eq!(senses, vec![true, true]);
    }
}
