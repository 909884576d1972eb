// Package tasks provides the ready heap and the delayed area.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tokio::time::Instant;

use super::task::Task;

/// Ready entry: max-heap order is the most urgent first.
struct Ready(Task);

impl Ready {
    fn rank(&self) -> (u8, Instant, u64) {
        (self.0.priority.0, self.0.created_at, self.0.seq)
    }
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        // smaller rank is more urgent
        other.rank().cmp(&self.rank())
    }
}

struct Delayed {
    at: Reverse<(Instant, u64)>,
    task: Task,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at)
    }
}

/// Bounded task queue. Capacity applies to new submissions per area; tasks
/// already owned by the manager (promotions, retries) always fit.
pub(crate) struct TaskQueue {
    ready: BinaryHeap<Ready>,
    delayed: BinaryHeap<Delayed>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            ready: BinaryHeap::new(),
            delayed: BinaryHeap::new(),
            capacity,
        }
    }

    /// Enqueues a new submission, handing the task back when full.
    pub fn submit(&mut self, task: Task) -> Result<(), Task> {
        if task.scheduled_at.is_some() {
            if self.delayed.len() >= self.capacity {
                return Err(task);
            }
            self.park(task);
        } else {
            if self.ready.len() >= self.capacity {
                return Err(task);
            }
            self.ready.push(Ready(task));
        }
        Ok(())
    }

    /// Parks a task until its `scheduled_at`, ignoring capacity.
    pub fn park(&mut self, task: Task) {
        let at = task.scheduled_at.unwrap_or_else(Instant::now);
        self.delayed.push(Delayed {
            at: Reverse((at, task.seq)),
            task,
        });
    }

    pub fn pop_ready(&mut self) -> Option<Task> {
        self.ready.pop().map(|r| r.0)
    }

    /// Moves every due delayed task to the ready heap.
    pub fn promote_due(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while let Some(next) = self.delayed.peek() {
            if next.at.0 .0 > now {
                break;
            }
            if let Some(Delayed { mut task, .. }) = self.delayed.pop() {
                task.scheduled_at = None;
                self.ready.push(Ready(task));
                promoted += 1;
            }
        }
        promoted
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::Instant;

    use super::TaskQueue;
    use crate::tasks::task::{task_fn, Priority, Task};

    fn task(id: &str, priority: u8, seq: u64, created_at: Instant, scheduled_at: Option<Instant>) -> Task {
        Task {
            id: id.to_string(),
            priority: Priority(priority),
            run: task_fn(|| async { Ok(Value::Null) }),
            retry_count: 0,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            timeout: None,
            callback: None,
            created_at,
            scheduled_at,
            seq,
        }
    }

    /// Test priority order with FIFO inside a priority class.
    #[tokio::test(start_paused = true)]
    async fn test_ready_order() {
        let mut q = TaskQueue::new(10);
        let t0 = Instant::now();
        q.submit(task("a", 3, 0, t0, None)).unwrap();
        q.submit(task("b", 1, 1, t0, None)).unwrap();
        q.submit(task("c", 2, 2, t0, None)).unwrap();
        q.submit(task("d", 1, 3, t0 + Duration::from_millis(1), None)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| q.pop_ready()).map(|t| t.id).collect();
        assert_eq!(order, vec!["b", "d", "c", "a"]);
    }

    /// Test that delayed tasks are promoted only once due.
    #[tokio::test(start_paused = true)]
    async fn test_promote_due() {
        let mut q = TaskQueue::new(10);
        let now = Instant::now();
        q.submit(task("late", 0, 0, now, Some(now + Duration::from_secs(2)))).unwrap();
        q.submit(task("soon", 0, 1, now, Some(now + Duration::from_secs(1)))).unwrap();

        assert_eq!(q.promote_due(now), 0);
        assert!(q.pop_ready().is_none());
        assert_eq!(q.promote_due(now + Duration::from_secs(1)), 1);
        assert_eq!(q.pop_ready().map(|t| t.id), Some("soon".to_string()));
        assert_eq!(q.promote_due(now + Duration::from_secs(3)), 1);
        assert_eq!(q.delayed_len(), 0);
    }

    /// Test that capacity rejects submissions per area but not parking.
    #[tokio::test(start_paused = true)]
    async fn test_capacity() {
        let mut q = TaskQueue::new(1);
        let now = Instant::now();
        assert!(q.submit(task("a", 0, 0, now, None)).is_ok());
        assert!(q.submit(task("b", 0, 1, now, None)).is_err());
        assert!(q.submit(task("c", 0, 2, now, Some(now))).is_ok());
        assert!(q.submit(task("d", 0, 3, now, Some(now))).is_err());

        q.park(task("e", 0, 4, now, Some(now)));
        assert_eq!(q.delayed_len(), 2);
        assert_eq!(q.promote_due(now), 2);
        assert_eq!(q.ready_len(), 3);
        assert_eq!(q.delayed_len(), 0);
    }
}
