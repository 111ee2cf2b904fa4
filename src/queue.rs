//! Ordered collection deciding vertical display order of bars.
//!
//! A binary min-heap keyed by `(priority, id)`. Lower priorities sit higher on
//! screen; equal priorities keep creation order because ids only grow. Every
//! item's slot is tracked by id, so removal and re-prioritization of an
//! arbitrary item stay `O(log n)`.

use std::collections::HashMap;

/// Items the queue can order.
pub trait Prioritized {
    /// Unique, monotonically assigned creation id.
    fn id(&self) -> u64;
    fn priority(&self) -> i32;
    fn set_priority(&mut self, priority: i32);
}

#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: Vec<T>,
    slots: HashMap<u64, usize>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Current slot of the item with `id`, or `None` when it is not queued.
    pub fn position(&self, id: u64) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.position(id).map(|i| &self.heap[i])
    }

    /// Items in storage order. Not sorted, but stable between mutations.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter()
    }

    /// Items in storage order, mutably. Keys must not be changed through this.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.heap.iter_mut()
    }

    pub fn push(&mut self, item: T) {
        let n = self.heap.len();
        self.slots.insert(item.id(), n);
        self.heap.push(item);
        self.up(n);
    }

    /// Remove and return the top item.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let n = self.heap.len() - 1;
        self.swap(0, n);
        self.down(0, n);
        self.take_last()
    }

    /// Remove the item with `id`, wherever it sits.
    pub fn remove(&mut self, id: u64) -> Option<T> {
        let i = self.position(id)?;
        let n = self.heap.len() - 1;
        if n != i {
            self.swap(i, n);
            if !self.down(i, n) {
                self.up(i);
            }
        }
        self.take_last()
    }

    /// Change the priority of the item with `id` and restore heap order.
    ///
    /// Returns `false` if the item is not queued.
    pub fn update(&mut self, id: u64, priority: i32) -> bool {
        let Some(i) = self.position(id) else {
            return false;
        };
        self.heap[i].set_priority(priority);
        self.fix(i);
        true
    }

    fn take_last(&mut self) -> Option<T> {
        let item = self.heap.pop()?;
        self.slots.remove(&item.id());
        Some(item)
    }

    fn key(&self, i: usize) -> (i32, u64) {
        (self.heap[i].priority(), self.heap[i].id())
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.key(i) < self.key(j)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.slots.insert(self.heap[i].id(), i);
        self.slots.insert(self.heap[j].id(), j);
    }

    fn fix(&mut self, i: usize) {
        let n = self.heap.len();
        if !self.down(i, n) {
            self.up(i);
        }
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    /// Sift down within the first `n` items. Returns whether the item moved.
    fn down(&mut self, i0: usize, n: usize) -> bool {
        let mut i = i0;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > i0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item {
        id: u64,
        priority: i32,
    }

    impl Prioritized for Item {
        fn id(&self) -> u64 {
            self.id
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn set_priority(&mut self, priority: i32) {
            self.priority = priority;
        }
    }

    fn queue(priorities: &[i32]) -> PriorityQueue<Item> {
        let mut q = PriorityQueue::new();
        for (id, priority) in priorities.iter().enumerate() {
            q.push(Item {
                id: id as u64,
                priority: *priority,
            });
        }
        q
    }

    fn drain(q: &mut PriorityQueue<Item>) -> Vec<u64> {
        std::iter::from_fn(|| q.pop()).map(|item| item.id).collect()
    }

    fn assert_slots_consistent(q: &PriorityQueue<Item>) {
        for (i, item) in q.iter().enumerate() {
            assert_eq!(q.position(item.id), Some(i));
        }
        assert_eq!(q.slots.len(), q.len());
    }

    #[test]
    fn pops_in_ascending_priority() {
        let mut q = queue(&[5, 1, 3, 0, 4, 2]);
        assert_slots_consistent(&q);
        assert_eq!(drain(&mut q), vec![3, 1, 5, 2, 4, 0]);
    }

    #[test]
    fn equal_priorities_keep_creation_order() {
        let mut q = queue(&[1, 0, 1, 0, 1, 0, 1]);
        assert_eq!(drain(&mut q), vec![1, 3, 5, 0, 2, 4, 6]);
    }

    #[test]
    fn update_reorders() {
        let mut q = queue(&[0, 1, 2, 3]);
        assert!(q.update(3, -1));
        assert!(q.update(0, 10));
        assert_slots_consistent(&q);
        assert_eq!(drain(&mut q), vec![3, 1, 2, 0]);
    }

    #[test]
    fn update_unknown_is_rejected() {
        let mut q = queue(&[0]);
        assert!(!q.update(42, 1));
    }

    #[test]
    fn remove_by_id() {
        let mut q = queue(&[4, 2, 6, 0, 3, 1, 5]);
        let removed = q.remove(2).unwrap();
        assert_eq!(removed.priority, 6);
        assert_eq!(q.position(2), None);
        assert!(q.remove(2).is_none());
        assert_slots_consistent(&q);
        assert_eq!(drain(&mut q), vec![3, 5, 1, 4, 0, 6]);
    }

    #[test]
    fn popped_items_lose_their_slot() {
        let mut q = queue(&[0, 1]);
        let top = q.pop().unwrap();
        assert_eq!(q.position(top.id), None);
        assert_eq!(q.position(1), Some(0));
    }

    #[test]
    fn many_mutations_keep_slots_in_sync() {
        let mut q = queue(&(0..32).map(|i| (i * 7) % 11).collect::<Vec<_>>());
        for id in (0..32).step_by(3) {
            q.update(id, (id as i32 * 5) % 13);
            assert_slots_consistent(&q);
        }
        for id in (1..32).step_by(4) {
            q.remove(id);
            assert_slots_consistent(&q);
        }
        let order: Vec<(i32, u64)> = std::iter::from_fn(|| q.pop())
            .map(|item| (item.priority, item.id))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }
}
