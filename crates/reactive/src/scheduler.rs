//! Posting work to a session's owning thread.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A unit of work run on the scheduler's thread.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks on the thread that owns a session.
///
/// The coordinator posts a wake-up task after every batch of notifier runs;
/// the task delivers whatever became ready.
pub trait Scheduler: Send + Sync {
    /// Queues a task. Must not run it inline.
    fn post(&self, task: Task);

    /// Returns true if called from the scheduler's thread.
    fn is_on_thread(&self) -> bool;
}

/// A scheduler drained explicitly by its owner, like an event loop tick.
pub struct QueueScheduler {
    thread: ThreadId,
    queue: Mutex<VecDeque<Task>>,
}

impl QueueScheduler {
    /// Creates a scheduler bound to the current thread.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            thread: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Runs queued tasks, including any they post, and returns how many ran.
    ///
    /// Does nothing off the owning thread.
    pub fn run_pending(&self) -> usize {
        if !self.is_on_thread() {
            return 0;
        }
        let mut ran = 0;
        loop {
            // Popped before running so tasks can post more.
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Returns the number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Scheduler for QueueScheduler {
    fn post(&self, task: Task) {
        self.queue.lock().push_back(task);
    }

    fn is_on_thread(&self) -> bool {
        thread::current().id() == self.thread
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_run_pending() {
        let scheduler = QueueScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            scheduler.post(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.run_pending(), 0);
    }

    #[test]
    fn test_other_thread_does_not_run() {
        let scheduler = QueueScheduler::new();
        scheduler.post(Box::new(|| {}));
        let remote = scheduler.clone();
        let ran = thread::spawn(move || remote.run_pending()).join().unwrap();
        assert_eq!(ran, 0);
        assert_eq!(scheduler.pending(), 1);
    }
}
