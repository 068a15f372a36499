//! Expansion task queue
//!
//! Sub-expansions are processed breadth-first in FIFO order. The queue is
//! rebuilt from the entry point at the start of every pass.

use crate::blueprint::{Args, Blueprint};
use std::collections::VecDeque;
use std::sync::Arc;
use void_core::Namespace;

/// A pending blueprint invocation
#[derive(Debug, Clone)]
pub struct Task {
    pub namespace: Namespace,
    pub blueprint: Arc<Blueprint>,
    pub args: Args,
}

/// FIFO of pending invocations
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    executed: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue at the back
    pub fn push(&mut self, task: Task) {
        self.pending.push_back(task);
    }

    /// Take the next task from the front
    pub fn pop(&mut self) -> Option<Task> {
        let task = self.pending.pop_front()?;
        self.executed += 1;
        Some(task)
    }

    /// Tasks taken since the last reset
    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop pending tasks and reset the counter
    pub fn reset(&mut self) {
        self.pending.clear();
        self.executed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(ns: &str) -> Task {
        Task {
            namespace: Namespace::new(ns),
            blueprint: Arc::new(Blueprint::new("noop", |_, _| Ok(()))),
            args: Args::new(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.push(task("a"));
        queue.push(task("b"));
        queue.push(task("c"));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.namespace.as_str().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(queue.executed(), 3);

        queue.reset();
        assert_eq!(queue.executed(), 0);
        assert!(queue.is_empty());
    }
}
