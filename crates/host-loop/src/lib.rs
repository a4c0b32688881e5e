//! Cooperative single-threaded dispatch loop.
//!
//! Everything built on top of this crate (job state transitions, observer
//! fan-out, deferred destruction) runs on the thread that drives the loop.
//! The handle is cheap to clone but deliberately not `Send`.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce()>;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest deadline surfaces
        // first, with post order breaking ties.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct LoopState {
    queue: RefCell<VecDeque<Task>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    next_seq: Cell<u64>,
    quit_flags: RefCell<Vec<Rc<Cell<bool>>>>,
}

/// Handle to the loop. Clones share the same task queue.
#[derive(Clone, Default)]
pub struct HostLoop {
    state: Rc<LoopState>,
}

impl HostLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `task` for execution on the next loop turn.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        self.state.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Run `task` once `delay` has elapsed. Timers with equal deadlines run
    /// in the order they were posted.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + 'static) {
        let seq = self.state.next_seq.get();
        self.state.next_seq.set(seq + 1);
        self.state.timers.borrow_mut().push(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            task: Box::new(task),
        });
    }

    /// Run until [`quit`](Self::quit) is called. Nested `run` calls unwind
    /// innermost-first: `quit` always stops the most recent `run`.
    pub fn run(&self) {
        let flag = Rc::new(Cell::new(false));
        self.state.quit_flags.borrow_mut().push(flag.clone());
        self.run_while(|| !flag.get());
        self.state.quit_flags.borrow_mut().pop();
    }

    /// Stop the innermost active [`run`](Self::run).
    pub fn quit(&self) {
        if let Some(flag) = self.state.quit_flags.borrow().last() {
            flag.set(true);
        }
    }

    /// Drive the loop while `keep_going` holds. Each nested caller owns its
    /// own predicate, so completion deep inside a nested frame cannot unwind
    /// the wrong one.
    pub fn run_while(&self, keep_going: impl Fn() -> bool) {
        while keep_going() {
            if self.turn() {
                continue;
            }
            match self.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
                None => {
                    // Single thread: with no tasks and no timers nothing can
                    // ever satisfy the predicate.
                    tracing::warn!("host loop idle with no queued tasks or timers, returning");
                    break;
                }
            }
        }
    }

    /// Drain ready work, including timers that come due before the deadline,
    /// then return.
    pub fn process_pending(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            if self.turn() {
                if Instant::now() >= deadline {
                    break;
                }
                continue;
            }
            match self.next_deadline() {
                Some(due) if due <= deadline => {
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                }
                _ => break,
            }
        }
    }

    /// Runs at most one ready task. Returns false when nothing was ready.
    fn turn(&self) -> bool {
        self.promote_due_timers();
        let task = self.state.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    fn promote_due_timers(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut timers = self.state.timers.borrow_mut();
            while timers.peek().is_some_and(|t| t.deadline <= now) {
                if let Some(entry) = timers.pop() {
                    due.push(entry.task);
                }
            }
        }
        let mut queue = self.state.queue.borrow_mut();
        for task in due {
            queue.push_back(task);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.state.timers.borrow().peek().map(|t| t.deadline)
    }
}
