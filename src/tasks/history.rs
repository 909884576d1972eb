// Package tasks keeps a bounded record of finished tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use super::task::{Priority, TaskFailure, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
}

/// One finished task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub priority: Priority,
    pub outcome: Outcome,
    pub attempts: u32,
    pub worker: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub error: Option<TaskFailure>,
}

/// Ring of the most recent records; oldest drop first.
#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<ExecutionRecord>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.entries.iter().cloned().collect()
    }
}
