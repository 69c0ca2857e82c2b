//! Bounded undo/redo history of owned snapshots

use std::collections::VecDeque;

/// Hard cap on retained snapshots
pub const MAX_HISTORY_DEPTH: usize = 50;

/// Linear snapshot history with a movable pointer
///
/// `push` drops any redo tail past the pointer, appends, evicts the oldest
/// entry once over capacity, and leaves the pointer on the new entry.
/// `undo`/`redo` only move the pointer.
#[derive(Debug, Clone)]
pub struct SnapshotHistory<T> {
    snapshots: VecDeque<T>,
    pointer: Option<usize>,
    capacity: usize,
}

impl<T: Clone> SnapshotHistory<T> {
    /// Capacity is clamped to `1..=MAX_HISTORY_DEPTH`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_HISTORY_DEPTH);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            pointer: None,
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: T) {
        if let Some(pointer) = self.pointer {
            self.snapshots.truncate(pointer + 1);
        }

        self.snapshots.push_back(snapshot);

        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
            tracing::trace!(capacity = self.capacity, "History full; evicted oldest snapshot");
        }

        self.pointer = Some(self.snapshots.len() - 1);
    }

    /// Step back; returns a copy of the snapshot now pointed at
    pub fn undo(&mut self) -> Option<T> {
        let pointer = self.pointer.filter(|p| *p > 0)?;
        self.pointer = Some(pointer - 1);
        self.snapshots.get(pointer - 1).cloned()
    }

    /// Step forward; returns a copy of the snapshot now pointed at
    pub fn redo(&mut self) -> Option<T> {
        let pointer = self.pointer?;
        if pointer + 1 >= self.snapshots.len() {
            return None;
        }
        self.pointer = Some(pointer + 1);
        self.snapshots.get(pointer + 1).cloned()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.pointer, Some(p) if p > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.pointer, Some(p) if p + 1 < self.snapshots.len())
    }

    pub fn pointer(&self) -> Option<usize> {
        self.pointer
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.snapshots.get(index)
    }
}

impl<T: Clone> Default for SnapshotHistory<T> {
    fn default() -> Self {
        Self::new(MAX_HISTORY_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_cannot_move() {
        let mut history: SnapshotHistory<u32> = SnapshotHistory::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(history.pointer().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn test_bound_evicts_oldest_first() {
        let mut history = SnapshotHistory::new(MAX_HISTORY_DEPTH);
        for i in 0..51u32 {
            history.push(i);
            assert!(history.len() <= MAX_HISTORY_DEPTH);
        }

        assert_eq!(history.len(), 50);
        assert_eq!(history.get(0), Some(&1));
        assert_eq!(history.get(49), Some(&50));
        assert_eq!(history.pointer(), Some(49));
    }

    #[test]
    fn test_pointer_valid_after_eviction_and_undo() {
        let mut history = SnapshotHistory::new(3);
        for i in 0..5u32 {
            history.push(i);
        }

        assert_eq!(history.undo(), Some(3));
        assert_eq!(history.undo(), Some(2));
        assert_eq!(history.undo(), None);
        assert_eq!(history.pointer(), Some(0));
    }

    #[test]
    fn test_push_after_undo_drops_redo_tail() {
        let mut history = SnapshotHistory::new(10);
        history.push("a");
        history.push("b");
        history.push("c");

        history.undo();
        history.undo();
        assert!(history.can_redo());

        history.push("d");

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(1), Some(&"d"));
        assert!(!history.can_redo());
        assert_eq!(history.pointer(), Some(1));
    }

    #[test]
    fn test_undo_redo_do_not_change_contents() {
        let mut history = SnapshotHistory::new(10);
        history.push(1);
        history.push(2);

        assert_eq!(history.undo(), Some(1));
        assert_eq!(history.redo(), Some(2));
        assert_eq!(history.redo(), None);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(SnapshotHistory::<u8>::new(0).capacity(), 1);
        assert_eq!(SnapshotHistory::<u8>::new(500).capacity(), MAX_HISTORY_DEPTH);
    }
}
