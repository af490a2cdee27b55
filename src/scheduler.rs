// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A single-threaded, cooperative event loop for deferred actions.
//!
//! Timeouts armed on a [`Transaction`](crate::Transaction) or a
//! [`DatasetTransaction`](crate::DatasetTransaction) are queued here and run at a later turn of
//! the loop, never concurrently with anything else. The loop keeps its own clock, which only
//! moves when it is driven:
//!
//! - [`EventLoop::advance`] moves the clock forward by a fixed amount and runs everything that
//!   became due, without sleeping. This is what tests use.
//! - [`EventLoop::run`] sleeps in real time until each deadline and drains the queue.
//!
//! Tasks run with no borrow of the loop held, so a task may schedule or cancel other tasks.
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

type Task = Box<dyn FnOnce()>;

// Earlier deadline first, then lower sequence (older) first.
type TaskKey = (Duration, u64);

#[derive(Default)]
struct LoopState {
    now: Duration,
    next_sequence: u64,
    queue: BTreeMap<TaskKey, Task>,
}

/// A cooperative event loop. Clones share the same queue and clock.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the loop's clock since it was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks still waiting to run.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Queues `task` to run once, `after` from now.
    ///
    /// Deadlines past the end of the clock's range are clamped to [`Duration::MAX`].
    pub fn schedule(&self, after: Duration, task: impl FnOnce() + 'static) -> TimerHandle {
        let mut state = self.state.borrow_mut();
        let key = (state.now.saturating_add(after), state.next_sequence);
        state.next_sequence += 1;
        state.queue.insert(key, Box::new(task));
        tracing::trace!(deadline = ?key.0, sequence = key.1, "scheduled task");
        TimerHandle {
            key,
            state: Rc::downgrade(&self.state),
        }
    }

    /// Moves the clock forward by `by`, running every task that becomes due in deadline order.
    ///
    /// Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().saturating_add(by);
        let mut ran = 0;
        while let Some(task) = self.pop_due(Some(target)) {
            task();
            ran += 1;
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Sleeps until each queued deadline and runs its task, until the queue is empty.
    ///
    /// Returns the number of tasks that ran.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        loop {
            let wait = {
                let state = self.state.borrow();
                match state.queue.keys().next() {
                    Some((deadline, _)) => deadline.saturating_sub(state.now),
                    None => break,
                }
            };
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            if let Some(task) = self.pop_due(None) {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Removes the earliest task, if it is due by `until` (or unconditionally for `None`), and
    /// moves the clock to its deadline.
    fn pop_due(&self, until: Option<Duration>) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        let (&(deadline, sequence), _) = state.queue.first_key_value()?;
        if until.is_some_and(|until| deadline > until) {
            return None;
        }
        state.now = state.now.max(deadline);
        tracing::trace!(?deadline, sequence, "running task");
        state.queue.remove(&(deadline, sequence))
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

/// Refers to one task queued on an [`EventLoop`].
///
/// Dropping the handle does not cancel the task.
#[derive(Clone)]
pub struct TimerHandle {
    key: TaskKey,
    state: Weak<RefCell<LoopState>>,
}

impl TimerHandle {
    /// The loop time at which the task is due.
    pub fn deadline(&self) -> Duration {
        self.key.0
    }

    /// Whether the task is still queued: it has neither run nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.borrow().queue.contains_key(&self.key))
    }

    /// Removes the task from the queue. Returns `false` if it already ran or was cancelled.
    pub fn cancel(&self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        // bind first so the borrow ends before the task (and whatever it captured) is dropped
        let removed = state.borrow_mut().queue.remove(&self.key);
        let cancelled = removed.is_some();
        drop(removed);
        if cancelled {
            tracing::trace!(deadline = ?self.key.0, sequence = self.key.1, "cancelled task");
        }
        cancelled
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("deadline", &self.key.0)
            .field("sequence", &self.key.1)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, EventLoop) {
        (Rc::new(RefCell::new(Vec::new())), EventLoop::new())
    }

    #[test]
    fn tasks_run_in_deadline_then_schedule_order() {
        let (ran, event_loop) = recorder();
        for (after, name) in [(20, "late"), (10, "first"), (10, "second")] {
            let ran = Rc::clone(&ran);
            event_loop.schedule(Duration::from_millis(after), move || {
                ran.borrow_mut().push(name)
            });
        }
        assert_eq!(event_loop.advance(Duration::from_millis(15)), 2);
        assert_eq!(*ran.borrow(), vec!["first", "second"]);
        assert_eq!(event_loop.now(), Duration::from_millis(15));
        assert_eq!(event_loop.advance(Duration::from_millis(5)), 1);
        assert_eq!(*ran.borrow(), vec!["first", "second", "late"]);
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let (ran, event_loop) = recorder();
        let handle = {
            let ran = Rc::clone(&ran);
            event_loop.schedule(Duration::from_millis(5), move || ran.borrow_mut().push("x"))
        };
        assert!(handle.is_pending());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(event_loop.advance(Duration::from_secs(1)), 0);
        assert!(ran.borrow().is_empty());
    }

    #[test]
    fn a_task_may_schedule_another() {
        let (ran, event_loop) = recorder();
        let inner_loop = event_loop.clone();
        let inner_ran = Rc::clone(&ran);
        event_loop.schedule(Duration::from_millis(1), move || {
            inner_ran.borrow_mut().push("outer");
            let ran = Rc::clone(&inner_ran);
            inner_loop.schedule(Duration::from_millis(1), move || ran.borrow_mut().push("inner"));
        });
        assert_eq!(event_loop.advance(Duration::from_millis(5)), 2);
        assert_eq!(*ran.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn far_deadlines_are_clamped() {
        let (ran, event_loop) = recorder();
        event_loop.advance(Duration::from_millis(1));
        let handle = {
            let ran = Rc::clone(&ran);
            event_loop.schedule(Duration::MAX, move || ran.borrow_mut().push("far"))
        };
        assert_eq!(handle.deadline(), Duration::MAX);
        assert!(handle.is_pending());
        assert_eq!(event_loop.advance(Duration::from_secs(1)), 0);

        // the clock stops at the end of its range and runs what is due there
        assert_eq!(event_loop.advance(Duration::MAX), 1);
        assert_eq!(event_loop.now(), Duration::MAX);
        assert_eq!(*ran.borrow(), vec!["far"]);
    }

    #[test]
    fn run_drains_in_real_time() {
        let (ran, event_loop) = recorder();
        let ran2 = Rc::clone(&ran);
        let handle =
            event_loop.schedule(Duration::from_millis(2), move || ran2.borrow_mut().push("x"));
        assert_eq!(event_loop.run(), 1);
        assert!(!handle.is_pending());
        assert_eq!(event_loop.now(), Duration::from_millis(2));
        assert_eq!(*ran.borrow(), vec!["x"]);
    }
}
