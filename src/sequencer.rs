// src/sequencer.rs

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Runs queued operations one at a time, in arrival order.
#[derive(Debug, Default)]
pub struct Sequencer {
    // tokio's mutex hands the lock out FIFO
    lock: tokio::sync::Mutex<()>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        operation().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleState {
    #[default]
    Idle,
    Running,
    /// Running, and one more run is owed once it finishes
    PendingRerun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// This call ran the task, `runs` times counting owed reruns
    Ran { runs: usize },
    /// Another call is running; it will run the task once more
    Coalesced,
}

/// Collapses bursts of requests: idle runs immediately, busy remembers one
/// owed rerun, and further requests while a rerun is owed do nothing.
#[derive(Debug, Default)]
pub struct Throttler {
    state: Mutex<ThrottleState>,
}

impl Throttler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ThrottleState {
        *self.lock()
    }

    /// On error the owed rerun is dropped and the throttler goes idle.
    pub async fn throttle<F, Fut, E>(&self, mut task: F) -> Result<ThrottleOutcome, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        {
            let mut state = self.lock();
            match *state {
                ThrottleState::Idle => *state = ThrottleState::Running,
                ThrottleState::Running => {
                    trace!("throttler busy, rerun owed");
                    *state = ThrottleState::PendingRerun;
                    return Ok(ThrottleOutcome::Coalesced);
                }
                ThrottleState::PendingRerun => return Ok(ThrottleOutcome::Coalesced),
            }
        }

        // a dropped caller must not leave the state at Running
        let mut run = RunGuard {
            throttler: self,
            armed: true,
        };
        let mut runs = 0;
        loop {
            let result = task().await;
            runs += 1;

            let mut state = self.lock();
            if let Err(err) = result {
                *state = ThrottleState::Idle;
                run.armed = false;
                return Err(err);
            }
            match *state {
                ThrottleState::PendingRerun => *state = ThrottleState::Running,
                ThrottleState::Running | ThrottleState::Idle => {
                    *state = ThrottleState::Idle;
                    run.armed = false;
                    return Ok(ThrottleOutcome::Ran { runs });
                }
            }
        }
    }
}

/// Puts the throttler back to idle when a run is cancelled
struct RunGuard<'a> {
    throttler: &'a Throttler,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            trace!("throttled run cancelled");
            *self.throttler.lock() = ThrottleState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn sequencer_never_overlaps() {
        let sequencer = Sequencer::new();
        let in_flight = AtomicUsize::new(0);
        let max_in_flight = AtomicUsize::new(0);
        let order = Mutex::new(Vec::new());

        let op = |n: usize| {
            let (in_flight, max_in_flight, order) = (&in_flight, &max_in_flight, &order);
            sequencer.queue(move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                order.lock().unwrap().push(n);
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        };

        tokio::join!(op(1), op(2), op(3));

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn idle_throttler_runs_once() {
        let throttler = Throttler::new();
        let outcome = throttler.throttle(|| async { Ok::<_, ()>(()) }).await;
        assert_eq!(outcome, Ok(ThrottleOutcome::Ran { runs: 1 }));
        assert_eq!(throttler.state(), ThrottleState::Idle);
    }

    #[tokio::test]
    async fn burst_collapses_to_one_rerun() {
        let throttler = Throttler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let task = || {
            let runs = Arc::clone(&runs);
            let gate = Arc::clone(&gate);
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    gate.notified().await;
                }
                Ok::<_, ()>(())
            }
        };

        let first = throttler.throttle(task);
        let burst = async {
            tokio::task::yield_now().await;
            assert_eq!(throttler.state(), ThrottleState::Running);
            let mut outcomes = Vec::new();
            for _ in 0..3 {
                outcomes.push(throttler.throttle(task).await);
            }
            assert_eq!(throttler.state(), ThrottleState::PendingRerun);
            gate.notify_one();
            outcomes
        };

        let (first, outcomes) = tokio::join!(first, burst);

        assert_eq!(first, Ok(ThrottleOutcome::Ran { runs: 2 }));
        assert_eq!(outcomes, vec![Ok(ThrottleOutcome::Coalesced); 3]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(throttler.state(), ThrottleState::Idle);
    }

    #[tokio::test]
    async fn cancelled_run_frees_the_throttler() {
        let throttler = Throttler::new();
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            throttler.throttle(|| async {
                std::future::pending::<()>().await;
                Ok::<_, ()>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(throttler.state(), ThrottleState::Idle);

        let outcome = throttler.throttle(|| async { Ok::<_, ()>(()) }).await;
        assert_eq!(outcome, Ok(ThrottleOutcome::Ran { runs: 1 }));
    }

    #[tokio::test]
    async fn failure_resets_to_idle() {
        let throttler = Throttler::new();
        let outcome = throttler.throttle(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(outcome, Err("boom"));
        assert_eq!(throttler.state(), ThrottleState::Idle);
    }
}
