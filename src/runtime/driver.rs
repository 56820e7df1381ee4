//! Real-time replay driver
//!
//! Maps the scheduler's deadlines onto tokio timers so a replay plays out in
//! wall-clock time. A `watch` channel carries cancellation: sending `true`
//! resets the runtime, which drops every pending timer.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use super::Runtime;
use super::scheduler::ReplaySink;

/// How a call to [`play`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// No timers left (replay drained, or nothing was scheduled)
    Drained,
    /// Cancelled through the watch channel; the runtime was reset
    Cancelled,
}

/// Play the pending replay in real time.
pub async fn play<S>(
    runtime: &mut Runtime,
    sink: &mut S,
    mut cancel: watch::Receiver<bool>,
) -> PlayOutcome
where
    S: ReplaySink + ?Sized,
{
    if *cancel.borrow_and_update() {
        runtime.reset();
        return PlayOutcome::Cancelled;
    }

    let mut cancel_open = true;
    while let Some(delay) = runtime.next_deadline_in() {
        let started = Instant::now();
        tokio::select! {
            _ = sleep(Duration::from_millis(delay)) => {
                let fired = runtime.advance(delay, sink);
                debug!(delay, fired, "replay timers fired");
            }
            changed = cancel.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *cancel.borrow_and_update() => {
                        runtime.reset();
                        info!("replay cancelled");
                        return PlayOutcome::Cancelled;
                    }
                    Ok(()) => {
                        let waited = started.elapsed().as_millis() as u64;
                        runtime.advance(waited.min(delay), sink);
                    }
                    Err(_) => cancel_open = false,
                }
            }
        }
    }

    PlayOutcome::Drained
}
