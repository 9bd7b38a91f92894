// Fixed-capacity circular buffer of the last N requests a session saw.
//
// Used wherever a component needs "what did this user/chat just say"
// without growing without bound. One mutex per ring, guarding a plain
// `VecDeque`: overwriting the oldest slot and popping the front is the
// same operation, so there's no need for manual index bookkeeping.

use super::types::Request;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_MESSAGE_LEN: usize = 1024;

pub struct RingHistory {
    capacity: usize,
    items: Mutex<VecDeque<Request>>,
}

impl RingHistory {
    /// Minimum capacity is 1; a requested size below that is clamped.
    pub fn new(size: usize) -> Self {
        let capacity = size.max(1);
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Push a request, truncating oversized text and evicting the oldest
    /// entry once the ring is full.
    pub fn push(&self, mut req: Request) {
        if req.msg.len() > MAX_MESSAGE_LEN {
            req.msg = req.msg.chars().take(MAX_MESSAGE_LEN).collect();
        }

        let mut items = self.items.lock().expect("ring history mutex poisoned");
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(req);
    }

    /// Return up to `n` entries, oldest first. `n <= 0` returns empty;
    /// `n` larger than the capacity is clamped.
    pub fn last(&self, n: i64) -> Vec<Request> {
        if n <= 0 {
            return Vec::new();
        }
        let n = (n as usize).min(self.capacity);
        let items = self.items.lock().expect("ring history mutex poisoned");
        let skip = items.len().saturating_sub(n);
        items.iter().skip(skip).cloned().collect()
    }

    /// The configured capacity (not the current length).
    pub fn size(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(msg: &str) -> Request {
        Request::new(msg, "1")
    }

    #[test]
    fn clamps_minimum_capacity() {
        let ring = RingHistory::new(0);
        assert_eq!(ring.size(), 1);
    }

    #[test]
    fn fifo_after_overflow() {
        let ring = RingHistory::new(3);
        for i in 0..5 {
            ring.push(req(&format!("msg{i}")));
        }
        let last = ring.last(3);
        let texts: Vec<&str> = last.iter().map(|r| r.msg.as_str()).collect();
        assert_eq!(texts, vec!["msg2", "msg3", "msg4"]);
    }

    #[test]
    fn last_clamped_to_capacity_and_length() {
        let ring = RingHistory::new(5);
        ring.push(req("a"));
        ring.push(req("b"));
        assert_eq!(ring.last(10).len(), 2);
        assert!(ring.last(0).is_empty());
        assert!(ring.last(-1).is_empty());
    }

    #[test]
    fn truncates_oversized_messages() {
        let ring = RingHistory::new(1);
        let long = "x".repeat(2000);
        ring.push(req(&long));
        let stored = ring.last(1);
        assert_eq!(stored[0].msg.chars().count(), 1024);
    }
}
