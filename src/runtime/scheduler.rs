//! Replay scheduler
//!
//! Turns a settled run's action log into a timed animation. Work is kept in
//! an explicit timer queue (min-heap by deadline, sequence number breaks
//! ties) and driven by `advance(now)`; nothing here sleeps. Every timer is
//! stamped with the scheduler generation, and `cancel` bumps the generation
//! while clearing the queue, so a timer from an earlier run can never fire
//! into a later one.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

use super::action_log::{Action, ActionId, LogEntry};
use super::agent::Pose;
use super::context::RunContext;
use super::error::{ReplayError, ReplayResult};
use super::guard::Phase;
use super::outcome::{Cadence, ExecutionResult, VICTORY_FRAMES};

/// Replay lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayState {
    /// Nothing scheduled
    Idle,
    /// Started, first step not yet fired
    Scheduled,
    /// Inside `advance`, applying due steps
    Animating,
    /// Between steps, waiting for the next deadline
    Waiting,
    /// Log consumed and `done` delivered
    Drained,
}

/// Kind of frame handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Regular animation step
    Step,
    /// Blocked move
    Crash,
    /// Victory sequence frame (0-based)
    Victory(u8),
}

/// Presentation callbacks driven by the scheduler
pub trait ReplaySink {
    /// Highlight the block that produced the current step
    fn highlight(&mut self, block: &ActionId);
    /// Draw the agent at `pose`
    fn render(&mut self, pose: Pose, frame: Frame);
    /// Replay finished with `result`
    fn done(&mut self, result: ExecutionResult);
}

/// Event captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayEvent {
    /// `highlight` call
    Highlight(ActionId),
    /// `render` call
    Render {
        /// Pose drawn
        pose: Pose,
        /// Frame kind
        frame: Frame,
    },
    /// `done` call
    Done(ExecutionResult),
}

/// Sink that records every callback
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Events in delivery order
    pub events: Vec<ReplayEvent>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `render` calls with the given frame kind
    pub fn frames(&self, kind: impl Fn(&Frame) -> bool) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, ReplayEvent::Render { frame, .. } if kind(frame)))
            .count()
    }

    /// Result delivered through `done`, if any
    pub fn finished(&self) -> Option<ExecutionResult> {
        self.events.iter().find_map(|event| match event {
            ReplayEvent::Done(result) => Some(*result),
            _ => None,
        })
    }
}

impl ReplaySink for RecordingSink {
    fn highlight(&mut self, block: &ActionId) {
        self.events.push(ReplayEvent::Highlight(block.clone()));
    }

    fn render(&mut self, pose: Pose, frame: Frame) {
        self.events.push(ReplayEvent::Render { pose, frame });
    }

    fn done(&mut self, result: ExecutionResult) {
        self.events.push(ReplayEvent::Done(result));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Step,
    Victory(u8),
    Complete,
}

#[derive(Debug, Clone)]
struct Timer {
    deadline: u64,
    seq: u64,
    generation: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline, then earliest seq)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cooperative replay scheduler
#[derive(Debug)]
pub struct ReplayScheduler {
    queue: BinaryHeap<Timer>,
    generation: u64,
    next_seq: u64,
    state: ReplayState,
    cadence: Option<Cadence>,
    dedupe: bool,
    steps_taken: usize,
    animated: usize,
    skipped: usize,
}

impl ReplayScheduler {
    /// Create an idle scheduler. With `dedupe` set, blocks already animated
    /// in this run are not drawn again.
    pub fn new(dedupe: bool) -> Self {
        Self {
            queue: BinaryHeap::new(),
            generation: 0,
            next_seq: 0,
            state: ReplayState::Idle,
            cadence: None,
            dedupe,
            steps_taken: 0,
            animated: 0,
            skipped: 0,
        }
    }

    /// Begin replaying `ctx`'s log. The first step fires one step interval
    /// after `now`.
    pub fn start(&mut self, ctx: &RunContext, cadence: Cadence, now: u64) -> ReplayResult<()> {
        if self.state != ReplayState::Idle {
            return Err(ReplayError::NotIdle(self.state));
        }
        if ctx.result() == ExecutionResult::Unset {
            return Err(ReplayError::Unsettled);
        }

        self.cadence = Some(cadence);
        self.steps_taken = 0;
        self.animated = 0;
        self.skipped = 0;
        self.schedule(now.saturating_add(cadence.step_ms), Task::Step);
        self.state = ReplayState::Scheduled;
        debug!(
            run = %ctx.id(),
            entries = ctx.log().len(),
            step_ms = cadence.step_ms,
            generation = self.generation,
            "replay scheduled"
        );
        Ok(())
    }

    /// Drop every pending timer and return to `Idle`. Returns the number of
    /// timers discarded.
    pub fn cancel(&mut self) -> usize {
        let dropped = self.queue.len();
        self.generation += 1;
        self.queue.clear();
        self.cadence = None;
        if self.state != ReplayState::Idle {
            debug!(dropped, generation = self.generation, "replay cancelled");
        }
        self.state = ReplayState::Idle;
        dropped
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.peek().map(|timer| timer.deadline)
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Fire every timer due at or before `now`. Returns the number fired.
    pub fn advance<S>(&mut self, now: u64, ctx: &mut RunContext, sink: &mut S) -> usize
    where
        S: ReplaySink + ?Sized,
    {
        let mut fired = 0;
        while let Some(timer) = self.pop_due(now) {
            if timer.generation != self.generation {
                debug!(generation = timer.generation, "discarding stale timer");
                continue;
            }
            self.state = ReplayState::Animating;
            fired += 1;
            match timer.task {
                Task::Step => self.step(timer.deadline, ctx, sink),
                Task::Victory(frame) => {
                    sink.render(ctx.agent().display(), Frame::Victory(frame));
                    if frame + 1 < VICTORY_FRAMES {
                        let delay = self.cadence().victory_ms;
                        self.schedule(timer.deadline.saturating_add(delay), Task::Victory(frame + 1));
                    } else {
                        self.complete(ctx, sink);
                    }
                }
                Task::Complete => self.complete(ctx, sink),
            }
        }

        if self.state == ReplayState::Animating {
            self.state = ReplayState::Waiting;
        }
        fired
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Log entries consumed so far
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Entries that produced a visual step
    pub fn animated(&self) -> usize {
        self.animated
    }

    /// Entries skipped because their block was already animated
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn pop_due(&mut self, now: u64) -> Option<Timer> {
        if self.queue.peek()?.deadline <= now {
            self.queue.pop()
        } else {
            None
        }
    }

    fn schedule(&mut self, deadline: u64, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Timer {
            deadline,
            seq,
            generation: self.generation,
            task,
        });
    }

    fn cadence(&self) -> Cadence {
        self.cadence.unwrap_or(Cadence {
            step_ms: 0,
            victory_ms: 0,
        })
    }

    fn step<S>(&mut self, deadline: u64, ctx: &mut RunContext, sink: &mut S)
    where
        S: ReplaySink + ?Sized,
    {
        let Some(entry) = ctx.log_mut().pop_front() else {
            self.schedule_tail(deadline, ctx.result());
            return;
        };
        self.steps_taken += 1;

        let first_time = ctx.guard().mark(Phase::Animate, entry.block.clone());
        if first_time || !self.dedupe {
            self.animate(&entry, ctx, sink);
            self.animated += 1;
        } else {
            debug!(block = %entry.block, "already animated; skipping visual step");
            self.skipped += 1;
        }

        if ctx.log().is_empty() {
            self.schedule_tail(deadline, ctx.result());
        } else {
            self.schedule(deadline.saturating_add(self.cadence().step_ms), Task::Step);
        }
    }

    fn animate<S>(&self, entry: &LogEntry, ctx: &mut RunContext, sink: &mut S)
    where
        S: ReplaySink + ?Sized,
    {
        let display = ctx.agent_mut().display_mut();
        match entry.action {
            Action::Move { to, .. } => display.position = to,
            Action::RotateLeft { to, .. } | Action::RotateRight { to, .. } => display.facing = to,
            Action::Sense { .. } | Action::Bump { .. } | Action::Finish { .. } => {}
        }
        let pose = *display;
        let frame = match entry.action {
            Action::Bump { .. } => Frame::Crash,
            _ => Frame::Step,
        };
        debug!(block = %entry.block, action = entry.action.label(), "replay step");
        sink.highlight(&entry.block);
        sink.render(pose, frame);
    }

    fn schedule_tail(&mut self, deadline: u64, result: ExecutionResult) {
        let cadence = self.cadence();
        if result == ExecutionResult::Success && VICTORY_FRAMES > 0 {
            self.schedule(deadline.saturating_add(cadence.victory_ms), Task::Victory(0));
        } else {
            self.schedule(deadline.saturating_add(cadence.step_ms), Task::Complete);
        }
    }

    fn complete<S>(&mut self, ctx: &RunContext, sink: &mut S)
    where
        S: ReplaySink + ?Sized,
    {
        self.state = ReplayState::Drained;
        debug!(run = %ctx.id(), result = %ctx.result(), "replay drained");
        sink.done(ctx.result());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::grid::{Coord, Direction};

    const CADENCE: Cadence = Cadence {
        step_ms: 100,
        victory_ms: 300,
    };

    fn settled(entries: &[(&str, Action)], result: ExecutionResult) -> RunContext {
        let mut ctx = RunContext::new(Pose::new(Coord::new(0, 0), Direction::East));
        for (block, action) in entries {
            ctx.record(LogEntry::new(ActionId::new(*block), action.clone()));
        }
        ctx.settle(result).expect("settle");
        ctx
    }

    fn hop(from: i32, to: i32) -> Action {
        Action::Move {
            from: Coord::new(from, 0),
            to: Coord::new(to, 0),
        }
    }

    #[test]
    fn timers_pop_earliest_first() {
        let mut heap = BinaryHeap::new();
        for (deadline, seq) in [(300, 0), (100, 1), (100, 2), (200, 3)] {
            heap.push(Timer {
                deadline,
                seq,
                generation: 0,
                task: Task::Step,
            });
        }
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|t| (t.deadline, t.seq))).collect();
        assert_eq!(order, vec![(100, 1), (100, 2), (200, 3), (300, 0)]);
    }

    #[test]
    fn steps_fire_on_cadence() {
        let mut ctx = settled(&[("a", hop(0, 1)), ("b", hop(1, 2))], ExecutionResult::Failure);
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        assert_eq!(scheduler.state(), ReplayState::Scheduled);

        assert_eq!(scheduler.advance(99, &mut ctx, &mut sink), 0);
        assert_eq!(scheduler.advance(100, &mut ctx, &mut sink), 1);
        assert_eq!(scheduler.state(), ReplayState::Waiting);
        assert_eq!(ctx.agent().display().position, Coord::new(1, 0));

        assert_eq!(scheduler.advance(200, &mut ctx, &mut sink), 1);
        assert_eq!(scheduler.next_deadline(), Some(300));
        assert_eq!(scheduler.advance(300, &mut ctx, &mut sink), 1);
        assert_eq!(scheduler.state(), ReplayState::Drained);
        assert_eq!(sink.finished(), Some(ExecutionResult::Failure));
        assert_eq!(sink.frames(|f| matches!(f, Frame::Victory(_))), 0);
    }

    #[test]
    fn success_plays_victory_frames() {
        let mut ctx = settled(&[("a", hop(0, 1))], ExecutionResult::Success);
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");

        assert_eq!(scheduler.advance(100 + 3 * 300, &mut ctx, &mut sink), 4);
        assert_eq!(sink.frames(|f| matches!(f, Frame::Victory(_))), 3);
        assert_eq!(sink.finished(), Some(ExecutionResult::Success));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn repeated_block_animates_once() {
        let mut ctx = settled(
            &[("m", hop(0, 1)), ("m", hop(1, 2)), ("m", hop(2, 3))],
            ExecutionResult::Failure,
        );
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        scheduler.advance(10_000, &mut ctx, &mut sink);

        assert_eq!(scheduler.steps_taken(), 3);
        assert_eq!(scheduler.animated(), 1);
        assert_eq!(scheduler.skipped(), 2);
        assert_eq!(ctx.agent().display().position, Coord::new(1, 0));
    }

    #[test]
    fn dedupe_can_be_disabled() {
        let mut ctx = settled(&[("m", hop(0, 1)), ("m", hop(1, 2))], ExecutionResult::Failure);
        let mut scheduler = ReplayScheduler::new(false);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        scheduler.advance(10_000, &mut ctx, &mut sink);
        assert_eq!(scheduler.animated(), 2);
        assert_eq!(ctx.agent().display().position, Coord::new(2, 0));
    }

    #[test]
    fn bump_renders_crash_frame() {
        let bump = Action::Bump {
            at: Coord::new(0, 0),
            toward: Direction::North,
        };
        let mut ctx = settled(&[("b", bump)], ExecutionResult::Failure);
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        scheduler.advance(100, &mut ctx, &mut sink);
        assert_eq!(sink.frames(|f| *f == Frame::Crash), 1);
    }

    #[test]
    fn start_requires_idle_and_settled() {
        let mut scheduler = ReplayScheduler::new(true);
        let unsettled = RunContext::new(Pose::new(Coord::new(0, 0), Direction::East));
        assert!(matches!(
            scheduler.start(&unsettled, CADENCE, 0),
            Err(ReplayError::Unsettled)
        ));

        let ctx = settled(&[("a", hop(0, 1))], ExecutionResult::Failure);
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        assert!(matches!(
            scheduler.start(&ctx, CADENCE, 0),
            Err(ReplayError::NotIdle(ReplayState::Scheduled))
        ));
    }

    #[test]
    fn cancel_discards_pending_work() {
        let mut ctx = settled(&[("a", hop(0, 1)), ("b", hop(1, 2))], ExecutionResult::Failure);
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        scheduler.advance(100, &mut ctx, &mut sink);

        assert_eq!(scheduler.cancel(), 1);
        assert_eq!(scheduler.state(), ReplayState::Idle);
        assert_eq!(scheduler.advance(10_000, &mut ctx, &mut sink), 0);
        assert_eq!(ctx.agent().display().position, Coord::new(1, 0));
        assert_eq!(sink.finished(), None);
    }

    #[test]
    fn empty_log_still_reports_done() {
        let mut ctx = settled(&[], ExecutionResult::Error);
        let mut scheduler = ReplayScheduler::new(true);
        let mut sink = RecordingSink::new();
        scheduler.start(&ctx, CADENCE, 0).expect("start");
        assert_eq!(scheduler.advance(10_000, &mut ctx, &mut sink), 2);
        assert_eq!(sink.events, vec![ReplayEvent::Done(ExecutionResult::Error)]);
        assert_eq!(scheduler.steps_taken(), 0);
    }
}
