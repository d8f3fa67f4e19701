//! Append-only bounded ring buffer shared by every audit/action log in the
//! core (query audit, middleware audit, scaling action log). Overflow
//! evicts the oldest entry first (spec §3, §9).

use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct RingLog<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> RingLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_on_overflow() {
        let log: RingLog<u32> = RingLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.snapshot(), vec![2, 3, 4]);
    }
}
