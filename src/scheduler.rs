//! Single-instance delayed work.
//!
//! At most one worker pass is ever pending. [`WorkQueue::reschedule`] replaces
//! the pending deadline; [`WorkQueue::schedule`] leaves an existing one alone,
//! which is what the worker uses to re-arm itself so it never overrides an
//! immediate request made while it was running.

use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct QueueState {
    deadline: Option<Instant>,
    running: bool,
    shutdown: bool,
}

/// A cancellable, single-outstanding delayed work item.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl WorkQueue {
    /// Create an idle queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a run `delay` after `now` unless one is already pending.
    ///
    /// Returns false if a run was already pending.
    pub fn schedule(&self, now: Instant, delay: Duration) -> bool {
        let mut state = self.state.lock();
        if state.deadline.is_some() {
            return false;
        }
        state.deadline = Some(now + delay);
        trace!("work scheduled in {:?}", delay);
        self.cond.notify_all();
        true
    }

    /// Cancel any pending run and schedule a new one `delay` after `now`.
    pub fn reschedule(&self, now: Instant, delay: Duration) {
        let mut state = self.state.lock();
        state.deadline = Some(now + delay);
        trace!("work rescheduled in {:?}", delay);
        self.cond.notify_all();
    }

    /// Cancel a pending run without waiting. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.lock().deadline.take().is_some();
        self.cond.notify_all();
        cancelled
    }

    /// Cancel a pending run and wait for a running one to finish.
    ///
    /// Anything the running pass re-armed is cancelled too, so no run is
    /// pending or in progress when this returns.
    pub fn cancel_sync(&self) {
        let mut state = self.state.lock();
        state.deadline = None;
        while state.running {
            self.cond.wait(&mut state);
        }
        state.deadline = None;
        self.cond.notify_all();
    }

    /// When the pending run is due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Claim the pending run if it is due at `now`.
    pub(crate) fn take_due(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        match state.deadline {
            Some(deadline) if deadline <= now && !state.running && !state.shutdown => {
                state.deadline = None;
                state.running = true;
                true
            }
            _ => false,
        }
    }

    /// Block until a run is due and claim it. Returns false on shutdown.
    pub(crate) fn wait_due(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return false;
            }
            if state.running {
                self.cond.wait(&mut state);
                continue;
            }
            match state.deadline {
                Some(deadline) if deadline <= Instant::now() => {
                    state.deadline = None;
                    state.running = true;
                    return true;
                }
                Some(deadline) => {
                    self.cond.wait_until(&mut state, deadline);
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Mark the claimed run as finished.
    pub(crate) fn finish(&self) {
        self.state.lock().running = false;
        self.cond.notify_all();
    }

    /// Stop the worker thread waiting in [`wait_due`](Self::wait_due).
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.deadline = None;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_schedule_keeps_existing() {
        let queue = WorkQueue::new();
        let now = Instant::now();
        assert!(queue.schedule(now, Duration::ZERO));
        assert!(!queue.schedule(now, Duration::from_secs(20)));
        assert_eq!(queue.deadline(), Some(now));
    }

    #[test]
    fn test_reschedule_replaces() {
        let queue = WorkQueue::new();
        let now = Instant::now();
        queue.schedule(now, Duration::from_secs(20));
        queue.reschedule(now, Duration::ZERO);
        assert_eq!(queue.deadline(), Some(now));
        assert!(queue.take_due(now));
        assert_eq!(queue.deadline(), None);
    }

    #[test]
    fn test_take_due_respects_deadline() {
        let queue = WorkQueue::new();
        let now = Instant::now();
        queue.schedule(now, Duration::from_secs(5));
        assert!(!queue.take_due(now));
        assert!(queue.take_due(now + Duration::from_secs(5)));
        assert!(queue.is_running());
        queue.finish();
        assert!(!queue.is_running());
    }

    #[test]
    fn test_cancel() {
        let queue = WorkQueue::new();
        assert!(!queue.cancel());
        queue.schedule(Instant::now(), Duration::from_secs(1));
        assert!(queue.cancel());
        assert_eq!(queue.deadline(), None);
    }

    #[test]
    fn test_cancel_sync_waits_for_running_pass() {
        let queue = Arc::new(WorkQueue::new());
        queue.schedule(Instant::now(), Duration::ZERO);
        assert!(queue.take_due(Instant::now()));

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                // The pass re-arms itself before finishing.
                queue.schedule(Instant::now(), Duration::from_secs(60));
                queue.finish();
            })
        };

        queue.cancel_sync();
        assert!(!queue.is_running());
        assert_eq!(queue.deadline(), None);
        worker.join().unwrap();
    }

    #[test]
    fn test_wait_due_wakes_on_schedule() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_due())
        };
        thread::sleep(Duration::from_millis(10));
        queue.reschedule(Instant::now(), Duration::from_millis(5));
        assert!(waiter.join().unwrap());
        assert!(queue.is_running());
    }

    #[test]
    fn test_shutdown_releases_waiter() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_due())
        };
        queue.shutdown();
        assert!(!waiter.join().unwrap());
    }
}
