//! Suspend/resume primitive and scheduling policy for the pipeline threads.
//!
//! Tasks are never torn down while the pipeline lives. Stopping a direction
//! suspends its threads at the top of their loop; starting it again resumes
//! them with their buffers intact.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    active: bool,
    parked: bool,
    shutdown: bool,
}

/// Outcome of a [`TaskGate::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// The task was active all along.
    Continue,
    /// The task was parked and has just been resumed.
    Resumed,
    /// The pipeline is shutting down; the task should return.
    Shutdown,
}

/// Per-task active flag plus the condvar a suspended task parks on.
///
/// Created suspended.
#[derive(Debug, Default)]
pub struct TaskGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl TaskGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.active = true;
        drop(state);
        self.changed.notify_all();
    }

    pub fn suspend(&self) {
        self.state.lock().active = false;
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_parked(&self) -> bool {
        self.state.lock().parked
    }

    /// Release the task for good. Parked tasks wake up and see `Shutdown`.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.active = false;
        drop(state);
        self.changed.notify_all();
    }

    /// Called by the task at the top of every iteration.
    ///
    /// If the gate is suspended, `on_park` runs first (outside the lock),
    /// then the task blocks until it is resumed or shut down.
    pub fn checkpoint(&self, on_park: impl FnOnce()) -> Checkpoint {
        {
            let state = self.state.lock();
            if state.shutdown {
                return Checkpoint::Shutdown;
            }
            if state.active {
                return Checkpoint::Continue;
            }
        }

        on_park();

        let mut state = self.state.lock();
        state.parked = true;
        self.changed.notify_all();
        while !state.active && !state.shutdown {
            self.changed.wait(&mut state);
        }
        state.parked = false;
        if state.shutdown {
            Checkpoint::Shutdown
        } else {
            Checkpoint::Resumed
        }
    }

    /// Wait until the task has reached its park point, up to `timeout`.
    ///
    /// Returns `false` if the task is still busy (for example blocked in a
    /// driver call) when the timeout expires.
    pub fn wait_parked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.parked {
            if state.shutdown || state.active {
                return false;
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.parked;
            }
        }
        true
    }
}

/// Fixed delay a task yields between iterations so lower-priority work
/// still gets CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    pub yield_delay: Duration,
}

impl IdlePolicy {
    pub fn new(yield_delay: Duration) -> Self {
        Self { yield_delay }
    }

    pub fn pause(&self) {
        if !self.yield_delay.is_zero() {
            thread::sleep(self.yield_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn starts_suspended() {
        let gate = TaskGate::new();
        assert!(!gate.is_active());
        assert!(!gate.is_parked());
    }

    #[test]
    fn active_gate_passes_without_parking() {
        let gate = TaskGate::new();
        gate.resume();
        let mut parked = false;
        assert_eq!(gate.checkpoint(|| parked = true), Checkpoint::Continue);
        assert!(!parked);
    }

    #[test]
    fn parks_until_resumed() {
        let gate = Arc::new(TaskGate::new());
        let parks = Arc::new(AtomicUsize::new(0));

        let worker = {
            let gate = gate.clone();
            let parks = parks.clone();
            thread::spawn(move || {
                gate.checkpoint(|| {
                    parks.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        assert!(gate.wait_parked(Duration::from_secs(2)));
        assert_eq!(parks.load(Ordering::SeqCst), 1);

        gate.resume();
        assert_eq!(worker.join().unwrap(), Checkpoint::Resumed);
        assert!(!gate.is_parked());
    }

    #[test]
    fn shutdown_releases_parked_task() {
        let gate = Arc::new(TaskGate::new());
        let worker = {
            let gate = gate.clone();
            thread::spawn(move || gate.checkpoint(|| {}))
        };

        assert!(gate.wait_parked(Duration::from_secs(2)));
        gate.shutdown();
        assert_eq!(worker.join().unwrap(), Checkpoint::Shutdown);
        assert_eq!(gate.checkpoint(|| {}), Checkpoint::Shutdown);
    }

    #[test]
    fn wait_parked_times_out_while_task_is_busy() {
        let gate = TaskGate::new();
        gate.resume();
        gate.suspend();
        let started = Instant::now();
        assert!(!gate.wait_parked(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
