use indexmap::IndexSet;

use super::user::UserId;

/// FIFO-by-insertion-order index over waiting users (spec.md §3.1, §4.2).
///
/// Backed by an `IndexSet` so membership tests are O(1) and removal by id
/// preserves the relative order of everything that was not removed.
#[derive(Default, Debug)]
pub struct WaitingQueue {
    order: IndexSet<UserId>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tail(&mut self, id: UserId) {
        self.order.insert(id);
    }

    pub fn remove(&mut self, id: UserId) -> bool {
        self.order.shift_remove(&id)
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.order.contains(&id)
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    /// Ordered snapshot of ids currently queued, oldest first.
    pub fn snapshot(&self) -> Vec<UserId> {
        self.order.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn preserves_fifo_order_after_removal() {
        let mut q = WaitingQueue::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        q.push_tail(a);
        q.push_tail(b);
        q.push_tail(c);

        assert!(q.remove(b));
        assert_eq!(q.snapshot(), vec![a, c]);
        assert!(!q.contains(b));
    }

    #[test]
    fn no_duplicate_entries() {
        let mut q = WaitingQueue::new();
        let a = Uuid::new_v4();
        q.push_tail(a);
        q.push_tail(a);
        assert_eq!(q.size(), 1);
    }
}
