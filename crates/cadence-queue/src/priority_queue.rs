//! Three-tier priority FIFO
//!
//! Dequeue is tier-major, FIFO-minor: High drains completely before Medium,
//! Medium before Low. Nothing prevents a steady stream of High entries from
//! delaying Low forever.

use std::collections::VecDeque;

use cadence_core::Priority;

/// Priority-tiered FIFO queue
#[derive(Clone, Debug)]
pub struct PriorityQueue<T> {
    tiers: [VecDeque<T>; 3],
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        PriorityQueue {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }

    /// Append to the tail of a tier
    pub fn enqueue(&mut self, priority: Priority, item: T) {
        self.tiers[priority.index()].push_back(item);
    }

    /// Take the head of the highest non-empty tier
    pub fn dequeue(&mut self) -> Option<(Priority, T)> {
        for priority in Priority::ALL {
            if let Some(item) = self.tiers[priority.index()].pop_front() {
                return Some((priority, item));
            }
        }
        None
    }

    /// Take the first entry, in dequeue order, that satisfies `pred`
    pub fn take_first<F>(&mut self, mut pred: F) -> Option<(Priority, T)>
    where
        F: FnMut(&T) -> bool,
    {
        for priority in Priority::ALL {
            let tier = &mut self.tiers[priority.index()];
            if let Some(pos) = tier.iter().position(&mut pred) {
                return tier.remove(pos).map(|item| (priority, item));
            }
        }
        None
    }

    /// Head of the highest non-empty tier, without removing it
    pub fn peek(&self) -> Option<(Priority, &T)> {
        Priority::ALL
            .into_iter()
            .find_map(|p| self.tiers[p.index()].front().map(|item| (p, item)))
    }

    /// First entry matching `pred`, searching tiers in dequeue order
    pub fn find_mut<F>(&mut self, mut pred: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        self.tiers
            .iter_mut()
            .flat_map(|tier| tier.iter_mut())
            .find(|item| pred(item))
    }

    pub fn contains<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.tiers.iter().any(|tier| tier.iter().any(&mut pred))
    }

    /// Remove every entry matching `pred`, preserving the order of the rest.
    /// Returns how many entries were removed.
    pub fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.len();
        for tier in &mut self.tiers {
            tier.retain(|item| !pred(item));
        }
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        self.tiers[priority.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        for tier in &mut self.tiers {
            tier.clear();
        }
    }

    /// Entries in dequeue order
    pub fn iter(&self) -> impl Iterator<Item = (Priority, &T)> {
        Priority::ALL
            .into_iter()
            .flat_map(move |p| self.tiers[p.index()].iter().map(move |item| (p, item)))
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tier_major_order() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Priority::High, "f1");
        queue.enqueue(Priority::Low, "f2");
        queue.enqueue(Priority::Medium, "f3");

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue().map(|(_, f)| f)).collect();
        assert_eq!(order, vec!["f1", "f3", "f2"]);
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut queue = PriorityQueue::new();
        for i in 0..4 {
            queue.enqueue(Priority::Medium, i);
        }
        assert_eq!(queue.peek(), Some((Priority::Medium, &0)));
        for i in 0..4 {
            assert_eq!(queue.dequeue(), Some((Priority::Medium, i)));
        }
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_find_and_remove() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Priority::Low, (1, 'a'));
        queue.enqueue(Priority::High, (2, 'b'));
        queue.enqueue(Priority::Low, (3, 'c'));

        if let Some(entry) = queue.find_mut(|(id, _)| *id == 3) {
            entry.1 = 'z';
        }
        assert!(queue.contains(|(_, c)| *c == 'z'));
        assert_eq!(queue.remove_where(|(id, _)| *id == 1), 1);
        assert_eq!(queue.remove_where(|(id, _)| *id == 99), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.len_of(Priority::Low), 1);

        let ids: Vec<_> = queue.iter().map(|(_, (id, _))| *id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_take_first_skips_non_matching() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Priority::High, 10);
        queue.enqueue(Priority::Medium, 21);
        queue.enqueue(Priority::Medium, 22);

        assert_eq!(queue.take_first(|n| n % 2 == 1), Some((Priority::Medium, 21)));
        assert_eq!(queue.take_first(|n| *n > 100), None);
        assert_eq!(queue.dequeue(), Some((Priority::High, 10)));
        assert_eq!(queue.dequeue(), Some((Priority::Medium, 22)));
    }

    fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::High),
            Just(Priority::Medium),
            Just(Priority::Low),
        ]
    }

    proptest! {
        /// Dequeued priorities never go back up
        #[test]
        fn dequeue_is_tier_major(entries in proptest::collection::vec(arb_priority(), 0..64)) {
            let mut queue = PriorityQueue::new();
            for (i, p) in entries.iter().enumerate() {
                queue.enqueue(*p, i);
            }
            let mut last: Option<(Priority, usize)> = None;
            while let Some((p, i)) = queue.dequeue() {
                if let Some((lp, li)) = last {
                    prop_assert!(lp <= p);
                    if lp == p {
                        prop_assert!(li < i, "FIFO violated within {:?}", p);
                    }
                }
                last = Some((p, i));
            }
        }
    }
}
