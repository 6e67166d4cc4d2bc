//! Two-class LIFO request queues.
//!
//! Each class is an insertion-ordered set of [`RequestId`]s. Popping
//! takes the most recently inserted id, so the newest view is serviced
//! first. A request lives in at most one class: promotion and demotion
//! move it rather than enqueueing it twice.

use indexmap::IndexSet;
use tilestream_core::TilePriority;

use crate::request::RequestId;

/// High and low priority request queues.
#[derive(Debug, Default)]
pub struct TileQueues {
    high: IndexSet<RequestId>,
    low: IndexSet<RequestId>,
}

impl TileQueues {
    /// Empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` on top of its class.
    pub fn push(&mut self, id: RequestId, priority: TilePriority) {
        match priority {
            TilePriority::High => {
                self.low.shift_remove(&id);
                self.high.insert(id);
            }
            TilePriority::Low => {
                self.high.shift_remove(&id);
                self.low.insert(id);
            }
        }
    }

    /// Take the newest high-priority id, else the newest low-priority id.
    pub fn pop(&mut self) -> Option<(RequestId, TilePriority)> {
        if let Some(id) = self.high.pop() {
            return Some((id, TilePriority::High));
        }
        self.low.pop().map(|id| (id, TilePriority::Low))
    }

    /// Move `id` from the low queue to the top of the high queue.
    ///
    /// Returns `false` if `id` was not in the low queue.
    pub fn promote(&mut self, id: RequestId) -> bool {
        if !self.low.shift_remove(&id) {
            return false;
        }
        self.high.insert(id);
        true
    }

    /// Move every high-priority id onto the low queue, keeping their
    /// relative order. Returns the moved ids.
    pub fn demote_all(&mut self) -> Vec<RequestId> {
        let moved: Vec<RequestId> = self.high.drain(..).collect();
        for &id in &moved {
            self.low.insert(id);
        }
        moved
    }

    /// Number of queued high-priority ids.
    pub fn high_len(&self) -> usize {
        self.high.len()
    }

    /// Number of queued low-priority ids.
    pub fn low_len(&self) -> usize {
        self.low.len()
    }

    /// Drop every queued id.
    pub fn clear(&mut self) {
        self.high.clear();
        self.low.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn high_drains_before_low() {
        let mut q = TileQueues::new();
        q.push(RequestId(1), TilePriority::Low);
        q.push(RequestId(2), TilePriority::High);
        q.push(RequestId(3), TilePriority::Low);
        assert_eq!(q.pop(), Some((RequestId(2), TilePriority::High)));
        assert_eq!(q.pop(), Some((RequestId(3), TilePriority::Low)));
        assert_eq!(q.pop(), Some((RequestId(1), TilePriority::Low)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn pop_is_lifo_within_class() {
        let mut q = TileQueues::new();
        for i in 0..4 {
            q.push(RequestId(i), TilePriority::High);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.pop().map(|(id, _)| id.0)).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[test]
    fn promote_moves_to_top_of_high() {
        let mut q = TileQueues::new();
        q.push(RequestId(1), TilePriority::Low);
        q.push(RequestId(2), TilePriority::High);
        q.push(RequestId(3), TilePriority::Low);
        assert!(q.promote(RequestId(1)));
        assert!(!q.promote(RequestId(1)));
        assert!(!q.promote(RequestId(42)));
        assert_eq!(q.high_len(), 2);
        assert_eq!(q.pop(), Some((RequestId(1), TilePriority::High)));
        assert_eq!(q.low_len(), 1);
    }

    #[test]
    fn demote_all_preserves_order() {
        let mut q = TileQueues::new();
        q.push(RequestId(0), TilePriority::Low);
        q.push(RequestId(1), TilePriority::High);
        q.push(RequestId(2), TilePriority::High);
        assert_eq!(q.demote_all(), vec![RequestId(1), RequestId(2)]);
        assert_eq!(q.high_len(), 0);
        let order: Vec<_> = std::iter::from_fn(|| q.pop().map(|(id, _)| id.0)).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    proptest! {
        #[test]
        fn each_id_queued_at_most_once(ops in proptest::collection::vec((0u64..8, any::<bool>()), 0..64)) {
            let mut q = TileQueues::new();
            for (id, high) in ops {
                let p = if high { TilePriority::High } else { TilePriority::Low };
                q.push(RequestId(id), p);
            }
            let mut seen = std::collections::HashSet::new();
            while let Some((id, _)) = q.pop() {
                prop_assert!(seen.insert(id));
            }
        }
    }
}
