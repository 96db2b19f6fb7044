//! A run queue split into feedback levels, searched round-robin starting
//! from a given level. Grounded on
//! `examples/original_source/P4/multilevel_queue.h`: `enqueue` appends at a
//! specific level, `dequeue`/`peek` start scanning at a given level and wrap
//! around, returning the level the item was found on.

use crate::thread::ThreadId;
use std::collections::VecDeque;

pub struct MultilevelQueue {
    levels: Vec<VecDeque<ThreadId>>,
}

impl MultilevelQueue {
    pub fn new(count: usize) -> MultilevelQueue {
        MultilevelQueue {
            levels: (0..count).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn enqueue(&mut self, level: usize, item: ThreadId) {
        self.levels[level].push_back(item);
    }

    /// Starting at `start_level` and wrapping forward, returns the first
    /// non-empty level's front item without removing it.
    pub fn peek(&self, start_level: usize) -> Option<(usize, ThreadId)> {
        let n = self.levels.len();
        for offset in 0..n {
            let level = (start_level + offset) % n;
            if let Some(&item) = self.levels[level].front() {
                return Some((level, item));
            }
        }
        None
    }

    /// Same scan as [`peek`], removing the item it finds.
    pub fn dequeue(&mut self, start_level: usize) -> Option<(usize, ThreadId)> {
        let n = self.levels.len();
        for offset in 0..n {
            let level = (start_level + offset) % n;
            if let Some(item) = self.levels[level].pop_front() {
                return Some((level, item));
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|q| q.is_empty())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.levels.iter().map(|q| q.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u64) -> ThreadId {
        // ThreadId's inner field is crate-visible only; tests live inside
        // the crate so this still works via the tuple constructor.
        ThreadId(n)
    }

    #[test]
    fn wraps_around_to_find_nonempty_level() {
        let mut q = MultilevelQueue::new(4);
        q.enqueue(1, tid(7));
        assert_eq!(q.peek(2), Some((1, tid(7))));
        assert_eq!(q.dequeue(2), Some((1, tid(7))));
        assert!(q.is_empty());
    }

    #[test]
    fn prefers_start_level_over_wrapped_levels() {
        let mut q = MultilevelQueue::new(3);
        q.enqueue(0, tid(1));
        q.enqueue(2, tid(2));
        assert_eq!(q.dequeue(2), Some((2, tid(2))));
        assert_eq!(q.dequeue(0), Some((0, tid(1))));
        assert_eq!(q.dequeue(0), None);
    }

    #[test]
    fn fifo_within_a_level() {
        let mut q = MultilevelQueue::new(2);
        q.enqueue(0, tid(1));
        q.enqueue(0, tid(2));
        assert_eq!(q.dequeue(0), Some((0, tid(1))));
        assert_eq!(q.dequeue(0), Some((0, tid(2))));
    }
}
