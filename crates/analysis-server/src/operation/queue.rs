//
// operation/queue.rs
//
// Priority queue of FIFO buckets with merge-on-insert and context cancellation
//

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Operation, OperationPriority};

/// Shortest wait `take` will block for; a zero timeout never means "forever".
const MIN_TAKE_TIMEOUT: Duration = Duration::from_millis(1);

/// What `add` did with an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended to the back of its priority bucket.
    Appended,
    /// Absorbed by an already-queued compatible operation.
    Merged,
}

struct QueueState {
    buckets: [VecDeque<Operation>; OperationPriority::COUNT],
    /// An operation has been taken and not yet marked completed.
    executing: bool,
}

impl QueueState {
    fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    fn pop_highest(&mut self) -> Option<Operation> {
        self.buckets.iter_mut().find_map(VecDeque::pop_front)
    }
}

/// Thread-safe queue drained by a single consumer in priority order.
///
/// Equal priorities are released in insertion order. A merge keeps the
/// position of the earlier operation.
pub struct OperationQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                buckets: std::array::from_fn(|_| VecDeque::new()),
                executing: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `operation`, merging it into a compatible queued operation if possible.
    pub fn add(&self, mut operation: Operation) -> AddOutcome {
        let priority = operation.priority();
        let mut state = self.lock();
        let bucket = &mut state.buckets[priority.index()];

        if operation.is_mergeable() {
            for queued in bucket.iter_mut() {
                match queued.merge_with(operation) {
                    Ok(()) => {
                        log::trace!("Merged {} into queued operation", queued);
                        return AddOutcome::Merged;
                    }
                    Err(returned) => operation = returned,
                }
            }
        }

        log::trace!(
            "Queued {} (priority={:?}, queue_size={})",
            operation,
            priority,
            state.len() + 1
        );
        state.buckets[priority.index()].push_back(operation);
        drop(state);
        self.available.notify_one();
        AddOutcome::Appended
    }

    /// Removes and returns the highest-priority operation, waiting up to `timeout`.
    ///
    /// Returns `None` when the timeout elapses with nothing queued. The caller
    /// must report completion with [`mark_last_operation_completed`](Self::mark_last_operation_completed).
    pub fn take(&self, timeout: Duration) -> Option<Operation> {
        let deadline = Instant::now() + timeout.max(MIN_TAKE_TIMEOUT);
        let mut state = self.lock();
        loop {
            if let Some(operation) = state.pop_highest() {
                state.executing = true;
                return Some(operation);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Records that the operation returned by the last `take` has finished.
    pub fn mark_last_operation_completed(&self) {
        let mut state = self.lock();
        state.executing = false;
        if state.is_empty() {
            self.idle.notify_all();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Removes every queued operation scoped to `context_id`.
    ///
    /// Operations that are already executing are not affected.
    pub fn remove_with_context_id(&self, context_id: &str) -> usize {
        let mut state = self.lock();
        let mut removed = 0;
        for bucket in state.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|op| op.context_id() != Some(context_id));
            removed += before - bucket.len();
        }
        if removed > 0 {
            log::trace!(
                "Removed {} queued operations for context {}",
                removed,
                context_id
            );
        }
        if state.is_empty() && !state.executing {
            self.idle.notify_all();
        }
        removed
    }

    /// Blocks until nothing is queued or executing. Returns `false` on timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.is_empty() && !state.executing {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::engine::AnalysisOptions;
    use crate::operation::{OperationKind, SetContents, SetOptions};
    use crate::source::Source;

    const NO_WAIT: Duration = Duration::from_millis(1);

    fn src(name: &str) -> Source {
        Source::parse(&format!("file:///work/{}", name)).unwrap()
    }

    fn set_contents(ctx: &str, source: &str, text: &str) -> Operation {
        Operation::SetContents(SetContents {
            context_id: ctx.to_string(),
            source: src(source),
            contents: text.to_string(),
        })
    }

    fn set_options(ctx: &str) -> Operation {
        Operation::SetOptions(SetOptions {
            context_id: ctx.to_string(),
            options: AnalysisOptions::default(),
        })
    }

    fn take_now(queue: &OperationQueue) -> Option<Operation> {
        let op = queue.take(NO_WAIT);
        queue.mark_last_operation_completed();
        op
    }

    #[test]
    fn test_higher_priority_first() {
        let queue = OperationQueue::new();
        queue.add(Operation::perform_analysis("a", false, false));
        queue.add(set_options("b"));

        assert_eq!(take_now(&queue).unwrap().kind(), OperationKind::SetOptions);
        assert_eq!(
            take_now(&queue).unwrap().kind(),
            OperationKind::PerformAnalysis
        );
        assert!(take_now(&queue).is_none());
    }

    #[test]
    fn test_same_priority_fifo() {
        let queue = OperationQueue::new();
        queue.add(set_options("a"));
        queue.add(set_options("b"));

        assert_eq!(take_now(&queue).unwrap().context_id(), Some("a"));
        assert_eq!(take_now(&queue).unwrap().context_id(), Some("b"));
    }

    #[test]
    fn test_merge_collapses_queue() {
        let queue = OperationQueue::new();
        assert_eq!(
            queue.add(set_contents("ctx", "a", "first")),
            AddOutcome::Appended
        );
        assert_eq!(
            queue.add(set_contents("ctx", "a", "second")),
            AddOutcome::Merged
        );
        queue.add(set_options("ctx"));
        assert_eq!(queue.len(), 2);

        match take_now(&queue).unwrap() {
            Operation::SetContents(op) => assert_eq!(op.contents, "second"),
            other => panic!("unexpected {}", other),
        }
        assert_eq!(take_now(&queue).unwrap().kind(), OperationKind::SetOptions);
    }

    #[test]
    fn test_merge_keeps_earliest_position() {
        let queue = OperationQueue::new();
        queue.add(set_contents("ctx", "a", "first"));
        queue.add(set_options("other"));
        queue.add(set_contents("ctx", "a", "second"));

        assert_eq!(take_now(&queue).unwrap().kind(), OperationKind::SetContents);
        assert_eq!(take_now(&queue).unwrap().kind(), OperationKind::SetOptions);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_with_context_id_is_scoped() {
        let queue = OperationQueue::new();
        queue.add(set_options("A"));
        queue.add(Operation::perform_analysis("A", false, false));
        queue.add(set_options("B"));
        queue.add(Operation::Shutdown);

        assert_eq!(queue.remove_with_context_id("A"), 2);
        assert!(!queue.is_empty());
        assert_eq!(take_now(&queue).unwrap().kind(), OperationKind::Shutdown);
        assert_eq!(take_now(&queue).unwrap().context_id(), Some("B"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_times_out_empty() {
        let queue = OperationQueue::new();
        let start = Instant::now();
        assert!(queue.take(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_take_wakes_on_add_from_other_thread() {
        let queue = Arc::new(OperationQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.add(set_options("late"));
            })
        };
        let op = queue.take(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(op.unwrap().context_id(), Some("late"));
    }

    #[test]
    fn test_wait_for_idle_tracks_executing_operation() {
        let queue = OperationQueue::new();
        queue.add(set_options("a"));
        let _op = queue.take(NO_WAIT).unwrap();
        assert!(queue.is_empty());
        assert!(!queue.wait_for_idle(Duration::from_millis(10)));
        queue.mark_last_operation_completed();
        assert!(queue.wait_for_idle(Duration::from_millis(10)));
    }
}
