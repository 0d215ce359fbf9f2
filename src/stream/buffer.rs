//! Bounded replay history for one workload

use std::collections::VecDeque;

use crate::models::LogLine;

/// Most recent `capacity` lines in arrival order
///
/// Oldest lines are evicted first. The hub is the only writer; readers take
/// snapshots under the hub lock.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Point-in-time copy, oldest first
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
