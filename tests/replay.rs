//! Replay scheduling tests
//!
//! Drives the runtime clock by hand and checks cadence, victory frames,
//! animation dedupe and reset behaviour.

use gridplay::runtime::error::ReplayError;
use gridplay::runtime::grid::{Coord, Direction, GridWorld};
use gridplay::runtime::level::Level;
use gridplay::runtime::outcome::{Cadence, ExecutionResult};
use gridplay::runtime::scheduler::{
    Frame, RecordingSink, ReplayEvent, ReplayScheduler, ReplayState,
};
use gridplay::runtime::{Runtime, RuntimeConfig};

fn level() -> Level {
    let world = GridWorld::from_rows(
        &["#S....", "#####F", "######", "######", "######"],
        &[
            "- E E E E S",
            "- - - - - -",
            "- - - - - -",
            "- - - - - -",
            "- - - - - -",
        ],
    )
    .unwrap();
    Level::new("worked-example", world, Direction::East)
}

const SOLUTION: &str = "(move-forward b1) (move-forward b2) (move-forward b3) \
                        (move-forward b4) (turn south b5) (move-forward b6)";

fn steps(sink: &RecordingSink) -> usize {
    sink.frames(|f| *f == Frame::Step)
}

#[test]
fn success_replays_six_steps_then_victory() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run(SOLUTION).unwrap();
    assert_eq!(runtime.replay_state(), ReplayState::Scheduled);
    assert_eq!(runtime.next_deadline_in(), Some(100));

    let mut sink = RecordingSink::new();
    for step in 1..=6 {
        assert_eq!(runtime.advance(100, &mut sink), 1);
        assert_eq!(steps(&sink), step);
    }
    assert_eq!(runtime.display_pose().position, Coord::new(5, 1));
    assert!(runtime.action_log().is_empty());
    assert_eq!(sink.finished(), None);

    for _ in 0..3 {
        assert_eq!(runtime.next_deadline_in(), Some(300));
        runtime.advance(300, &mut sink);
    }
    assert_eq!(sink.frames(|f| matches!(f, Frame::Victory(_))), 3);
    assert_eq!(sink.finished(), Some(ExecutionResult::Success));
    assert_eq!(runtime.replay_state(), ReplayState::Drained);
    assert_eq!(runtime.next_deadline_in(), None);
}

#[test]
fn highlights_follow_the_log_order() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run(SOLUTION).unwrap();

    let mut sink = RecordingSink::new();
    runtime.replay_to_end(&mut sink);

    let highlighted: Vec<_> = sink
        .events
        .iter()
        .filter_map(|event| match event {
            ReplayEvent::Highlight(block) => Some(block.as_str().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(highlighted, vec!["b1", "b2", "b3", "b4", "b5", "b6"]);
    assert_eq!(sink.events.last(), Some(&ReplayEvent::Done(ExecutionResult::Success)));
}

#[test]
fn failure_replays_at_slower_cadence() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run("(move-forward a) (turn-left b) (move-forward c)").unwrap();
    assert_eq!(runtime.result(), ExecutionResult::Failure);
    assert_eq!(runtime.next_deadline_in(), Some(150));

    let mut sink = RecordingSink::new();
    assert_eq!(runtime.advance(149, &mut sink), 0);
    assert_eq!(runtime.advance(1, &mut sink), 1);

    runtime.replay_to_end(&mut sink);
    assert_eq!(sink.frames(|f| *f == Frame::Crash), 1);
    assert_eq!(sink.frames(|f| matches!(f, Frame::Victory(_))), 0);
    assert_eq!(sink.finished(), Some(ExecutionResult::Failure));
}

#[test]
fn repeated_block_is_animated_once() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime
        .run("(repeat 4 (move-forward m)) (turn south t) (move-forward f)")
        .unwrap();
    assert_eq!(runtime.logical_pose().position, Coord::new(5, 1));

    let mut sink = RecordingSink::new();
    runtime.replay_to_end(&mut sink);

    assert_eq!(runtime.scheduler().steps_taken(), 6);
    assert_eq!(runtime.scheduler().animated(), 3);
    assert_eq!(runtime.scheduler().skipped(), 3);
    assert_eq!(sink.finished(), Some(ExecutionResult::Success));
}

#[test]
fn reset_mid_replay_stops_all_mutation() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run(SOLUTION).unwrap();

    let mut sink = RecordingSink::new();
    runtime.advance(100, &mut sink);
    runtime.advance(100, &mut sink);
    assert_eq!(runtime.display_pose().position, Coord::new(3, 0));

    runtime.reset();
    let events_at_reset = sink.events.len();
    assert_eq!(runtime.replay_state(), ReplayState::Idle);
    assert_eq!(runtime.display_pose().position, Coord::new(1, 0));
    assert_eq!(runtime.result(), ExecutionResult::Unset);
    assert!(runtime.guard().is_empty());

    assert_eq!(runtime.advance(10_000, &mut sink), 0);
    assert_eq!(sink.events.len(), events_at_reset);
    assert_eq!(runtime.display_pose().position, Coord::new(1, 0));
}

#[test]
fn rerun_does_not_inherit_old_timers() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run(SOLUTION).unwrap();
    let mut sink = RecordingSink::new();
    runtime.advance(250, &mut sink);

    runtime.run("(move-forward only)").unwrap();
    assert_eq!(runtime.scheduler().pending(), 1);

    let mut fresh = RecordingSink::new();
    runtime.replay_to_end(&mut fresh);
    assert_eq!(steps(&fresh), 1);
    assert_eq!(fresh.finished(), Some(ExecutionResult::Failure));
    assert_eq!(runtime.guard().clear_count(), 2);
}

#[test]
fn start_outside_idle_is_rejected() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run(SOLUTION).unwrap();

    let cadence = Cadence {
        step_ms: 10,
        victory_ms: 10,
    };
    let mut scheduler = ReplayScheduler::new(true);
    scheduler.start(runtime.context(), cadence, 0).unwrap();
    assert_eq!(
        scheduler.start(runtime.context(), cadence, 0),
        Err(ReplayError::NotIdle(ReplayState::Scheduled))
    );

    scheduler.cancel();
    assert!(scheduler.start(runtime.context(), cadence, 0).is_ok());
}

#[test]
fn error_runs_still_signal_done() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    runtime.run("(((").unwrap();
    assert_eq!(runtime.result(), ExecutionResult::Error);

    let mut sink = RecordingSink::new();
    runtime.replay_to_end(&mut sink);
    assert_eq!(sink.events, vec![ReplayEvent::Done(ExecutionResult::Error)]);
}

#[test]
fn huge_cadence_saturates_instead_of_overflowing() {
    let mut config = RuntimeConfig::default();
    config.cadence.failure_ms = u64::MAX / 2 + 1;
    let mut runtime = Runtime::new(config, level()).unwrap();
    runtime.run("(move-forward a)").unwrap();

    let mut sink = RecordingSink::new();
    runtime.replay_to_end(&mut sink);
    assert_eq!(steps(&sink), 1);
    assert_eq!(sink.finished(), Some(ExecutionResult::Failure));
    assert_eq!(runtime.now_ms(), u64::MAX);

    // A pinned clock still lets later runs replay.
    runtime.run("(move-forward a) (move-forward b)").unwrap();
    let mut again = RecordingSink::new();
    runtime.replay_to_end(&mut again);
    assert_eq!(steps(&again), 2);
    assert_eq!(again.finished(), Some(ExecutionResult::Failure));
}

#[test]
fn clock_pins_at_its_maximum() {
    let mut runtime = Runtime::new(RuntimeConfig::default(), level()).unwrap();
    let mut sink = RecordingSink::new();
    runtime.advance(u64::MAX, &mut sink);
    runtime.advance(1, &mut sink);
    assert_eq!(runtime.now_ms(), u64::MAX);

    runtime.run(SOLUTION).unwrap();
    assert_eq!(runtime.next_deadline_in(), Some(0));
    runtime.replay_to_end(&mut sink);
    assert_eq!(steps(&sink), 6);
    assert_eq!(sink.finished(), Some(ExecutionResult::Success));
}
