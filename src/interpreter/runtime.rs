use crate::interpreter::ir::{Condition, Instruction, NativeCall, ProgramIr};
use crate::runtime::action_log::ActionId;
use crate::runtime::grid::Relative;
use thiserror::Error;

/// Host trait implemented by runtimes that execute interpreter programs.
///
/// The interpreter owns control flow; everything that touches the game world
/// goes through these calls.
pub trait InterpreterHost {
    /// Error type surfaced by host operations. Hosts also use it to halt a
    /// program early (finish and crash signals).
    type Error;

    /// Execute a native call.
    fn call_native(&mut self, call: &NativeCall) -> std::result::Result<(), Self::Error>;
    /// Answer a direction query issued by `block`.
    fn sense(&mut self, toward: Relative, block: &ActionId) -> std::result::Result<bool, Self::Error>;
    /// Whether the agent has yet to reach its goal.
    fn not_done(&mut self) -> std::result::Result<bool, Self::Error>;
}

/// Outcome of a `tick` call on the interpreter runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// One statement or loop evaluation was executed.
    Progress,
    /// Program execution completed.
    Completed,
}

/// Errors surfaced while executing a program.
#[derive(Debug, Error)]
pub enum RuntimeError<E> {
    /// Host-level error bubbled up from a native call or condition.
    #[error("host: {0}")]
    Host(E),
    /// Program referenced a procedure that does not exist.
    #[error("unknown procedure index {0}")]
    UnknownProcedure(usize),
    /// Nested loops or procedure calls went deeper than the frame limit.
    #[error("frame depth limit of {0} exceeded")]
    DepthExceeded(usize),
}

/// Default frame depth limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Stateful interpreter runtime that drives IR programs against a host.
///
/// Each [`tick`](Self::tick) performs one bounded unit of work, so callers
/// can enforce a step budget by counting ticks.
pub struct InterpreterRuntime<H> {
    host: H,
    program: ProgramIr,
    frames: Vec<Frame>,
    max_depth: usize,
    completed: bool,
}

impl<H: InterpreterHost> InterpreterRuntime<H> {
    /// Create a new runtime for the provided program and host.
    pub fn new(host: H, program: ProgramIr) -> Self {
        Self::with_max_depth(host, program, DEFAULT_MAX_DEPTH)
    }

    /// Create a runtime with an explicit frame depth limit.
    pub fn with_max_depth(host: H, program: ProgramIr, max_depth: usize) -> Self {
        let main = Frame::new(program.main.clone(), FrameKind::Block);
        Self {
            host,
            program,
            frames: vec![main],
            max_depth: max_depth.max(1),
            completed: false,
        }
    }

    /// Execute one statement, loop check or frame exit.
    pub fn tick(&mut self) -> Result<RuntimeEvent, RuntimeError<H::Error>> {
        if self.completed {
            return Ok(RuntimeEvent::Completed);
        }
        let Some(frame) = self.frames.last_mut() else {
            self.completed = true;
            return Ok(RuntimeEvent::Completed);
        };

        if frame.index >= frame.instructions.len() {
            let restart = match &mut frame.kind {
                FrameKind::Block | FrameKind::Procedure => false,
                FrameKind::Forever => true,
                FrameKind::Repeat { remaining } => {
                    *remaining = remaining.saturating_sub(1);
                    *remaining > 0
                }
                FrameKind::While(condition) => {
                    evaluate(&mut self.host, condition).map_err(RuntimeError::Host)?
                }
            };
            if restart {
                frame.index = 0;
            } else {
                self.frames.pop();
            }
            return Ok(RuntimeEvent::Progress);
        }

        let instruction = frame.instructions[frame.index].clone();
        frame.index += 1;

        match instruction {
            Instruction::Native(call) => {
                self.host.call_native(&call).map_err(RuntimeError::Host)?;
            }
            Instruction::Repeat { times, body } => {
                if times > 0 {
                    self.push(Frame::new(body, FrameKind::Repeat { remaining: times }))?;
                }
            }
            Instruction::While { condition, body } => {
                if evaluate(&mut self.host, &condition).map_err(RuntimeError::Host)? {
                    self.push(Frame::new(body, FrameKind::While(condition)))?;
                }
            }
            Instruction::Forever(body) => {
                self.push(Frame::new(body, FrameKind::Forever))?;
            }
            Instruction::Branch { arms, otherwise } => {
                let mut chosen = None;
                for arm in arms {
                    if evaluate(&mut self.host, &arm.condition).map_err(RuntimeError::Host)? {
                        chosen = Some(arm.body);
                        break;
                    }
                }
                if let Some(body) = chosen.or(otherwise) {
                    self.push(Frame::new(body, FrameKind::Block))?;
                }
            }
            Instruction::Call(index) => {
                let body = self
                    .program
                    .procedures
                    .get(index)
                    .map(|procedure| procedure.body.clone())
                    .ok_or(RuntimeError::UnknownProcedure(index))?;
                self.push(Frame::new(body, FrameKind::Procedure))?;
            }
        }
        Ok(RuntimeEvent::Progress)
    }

    fn push(&mut self, frame: Frame) -> Result<(), RuntimeError<H::Error>> {
        if self.frames.len() >= self.max_depth {
            return Err(RuntimeError::DepthExceeded(self.max_depth));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Expose a reference to the underlying program.
    pub fn program(&self) -> &ProgramIr {
        &self.program
    }

    /// Access the host (useful for inspection in tests).
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consume the runtime, returning the host.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Depth of the interpreter frame stack.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the program has run to its end.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether another tick would do any work.
    pub fn has_work(&self) -> bool {
        !self.completed && !self.frames.is_empty()
    }
}

fn evaluate<H: InterpreterHost>(
    host: &mut H,
    condition: &Condition,
) -> std::result::Result<bool, H::Error> {
    match condition {
        Condition::Literal(flag) => Ok(*flag),
        Condition::Path { toward, block } => host.sense(*toward, block),
        Condition::NotDone => host.not_done(),
        Condition::Not(inner) => Ok(!evaluate(host, inner)?),
        Condition::All(items) => {
            for item in items {
                if !evaluate(host, item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any(items) => {
            for item in items {
                if evaluate(host, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[derive(Clone)]
struct Frame {
    instructions: Vec<Instruction>,
    index: usize,
    kind: FrameKind,
}

#[derive(Clone)]
enum FrameKind {
    Block,
    Procedure,
    Repeat { remaining: u32 },
    While(Condition),
    Forever,
}

impl Frame {
    fn new(instructions: Vec<Instruction>, kind: FrameKind) -> Self {
        Self {
            instructions,
            index: 0,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{build_ir, parse_program};
    use crate::interpreter::ir::NativeOp;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockHost {
        calls: Vec<(NativeOp, String)>,
        senses: Vec<(Relative, String)>,
        answers: VecDeque<bool>,
        done_after: Option<usize>,
        halt_on: Option<NativeOp>,
    }

    impl InterpreterHost for MockHost {
        type Error = String;

        fn call_native(&mut self, call: &NativeCall) -> std::result::Result<(), Self::Error> {
            self.calls.push((call.op, call.block.to_string()));
            if self.halt_on == Some(call.op) {
                return Err(format!("halted by {}", call.block));
            }
            Ok(())
        }

        fn sense(&mut self, toward: Relative, block: &ActionId) -> std::result::Result<bool, Self::Error> {
            self.senses.push((toward, block.to_string()));
            Ok(self.answers.pop_front().unwrap_or(false))
        }

        fn not_done(&mut self) -> std::result::Result<bool, Self::Error> {
            Ok(self
                .done_after
                .map(|limit| self.calls.len() < limit)
                .unwrap_or(true))
        }
    }

    fn runtime(src: &str, host: MockHost) -> InterpreterRuntime<MockHost> {
        let program = build_ir(&parse_program(src).expect("parse")).expect("build");
        InterpreterRuntime::new(host, program)
    }

    fn run_to_end(runtime: &mut InterpreterRuntime<MockHost>, limit: usize) -> usize {
        for ticks in 0..limit {
            if runtime.tick().expect("tick") == RuntimeEvent::Completed {
                return ticks;
            }
        }
        panic!("program did not complete within {} ticks", limit);
    }

    #[test]
    fn runs_statements_in_order() {
        let mut rt = runtime(
            "(move-forward a) (turn-left b) (turn east c)",
            MockHost::default(),
        );
        run_to_end(&mut rt, 10);
        let ops: Vec<_> = rt.host().calls.iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![
                NativeOp::MoveForward,
                NativeOp::TurnLeft,
                NativeOp::Face(crate::runtime::grid::Direction::East)
            ]
        );
        assert!(rt.is_completed());
    }

    #[test]
    fn repeat_runs_body_count_times() {
        let mut rt = runtime("(repeat 3 (move-forward a) (turn-right b)) (repeat 0 (finish c))", MockHost::default());
        run_to_end(&mut rt, 50);
        assert_eq!(rt.host().calls.len(), 6);
        assert!(rt.host().calls.iter().all(|(_, block)| block != "c"));
    }

    #[test]
    fn while_rechecks_condition_each_pass() {
        let host = MockHost {
            answers: VecDeque::from(vec![true, true, false]),
            ..MockHost::default()
        };
        let mut rt = runtime("(while (path-ahead s) (move-forward m))", host);
        run_to_end(&mut rt, 50);
        assert_eq!(rt.host().calls.len(), 2);
        assert_eq!(rt.host().senses.len(), 3);
        assert!(rt.host().senses.iter().all(|(toward, _)| *toward == Relative::Forward));
    }

    #[test]
    fn branch_takes_first_matching_arm() {
        let host = MockHost {
            answers: VecDeque::from(vec![false, true]),
            ..MockHost::default()
        };
        let mut rt = runtime(
            "(branch (when (path-left l) (turn-left a)) (when (path-right r) (turn-right b)) (otherwise (finish c)))",
            host,
        );
        run_to_end(&mut rt, 20);
        assert_eq!(rt.host().calls, vec![(NativeOp::TurnRight, "b".to_string())]);
    }

    #[test]
    fn not_done_loop_with_procedure() {
        let host = MockHost {
            done_after: Some(4),
            ..MockHost::default()
        };
        let mut rt = runtime(
            "(define step (move-forward a)) (while (not-done) (call step))",
            host,
        );
        run_to_end(&mut rt, 100);
        assert_eq!(rt.host().calls.len(), 4);
    }

    #[test]
    fn empty_forever_keeps_consuming_ticks() {
        let mut rt = runtime("(forever)", MockHost::default());
        for _ in 0..1000 {
            assert_eq!(rt.tick().expect("tick"), RuntimeEvent::Progress);
        }
        assert!(!rt.is_completed());
    }

    #[test]
    fn unbounded_recursion_hits_depth_limit() {
        let program = build_ir(&parse_program("(define r (call r)) (call r)").expect("parse"))
            .expect("build");
        let mut rt = InterpreterRuntime::with_max_depth(MockHost::default(), program, 16);
        let err = loop {
            match rt.tick() {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, RuntimeError::DepthExceeded(16)));
        assert_eq!(rt.frame_depth(), 16);
    }

    #[test]
    fn host_errors_stop_execution() {
        let host = MockHost {
            halt_on: Some(NativeOp::Finish),
            ..MockHost::default()
        };
        let mut rt = runtime("(move-forward a) (finish f) (move-forward b)", host);
        assert_eq!(rt.tick().expect("tick"), RuntimeEvent::Progress);
        match rt.tick() {
            Err(RuntimeError::Host(message)) => assert_eq!(message, "halted by f"),
            other => panic!("expected host error, got {:?}", other),
        }
        assert_eq!(rt.host().calls.len(), 2);
    }
}
