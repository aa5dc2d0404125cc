//! Child status records held by a parent until it collects them.

use serde::Serialize;

use crate::task::TaskId;

/// Exit outcome of one child, pending collection by its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChildStatus {
    pub child: TaskId,
    pub exited: bool,
    pub status: i32,
}

impl ChildStatus {
    #[must_use]
    pub const fn new(child: TaskId) -> Self {
        Self {
            child,
            exited: false,
            status: 0,
        }
    }

    /// Record the child's termination.
    pub fn mark_exited(&mut self, status: i32) {
        self.exited = true;
        self.status = status;
    }
}

/// The set of child status records owned by one parent, in creation order.
#[derive(Debug, Clone, Default)]
pub struct ChildStatusList {
    records: Vec<ChildStatus>,
}

impl ChildStatusList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record for `child`. Returns false if one already exists.
    pub fn insert(&mut self, child: TaskId) -> bool {
        if self.find(child).is_some() {
            return false;
        }
        self.records.push(ChildStatus::new(child));
        true
    }

    #[must_use]
    pub fn find(&self, child: TaskId) -> Option<&ChildStatus> {
        self.records.iter().find(|r| r.child == child)
    }

    pub fn find_mut(&mut self, child: TaskId) -> Option<&mut ChildStatus> {
        self.records.iter_mut().find(|r| r.child == child)
    }

    /// Remove and return the record for `child`.
    pub fn remove(&mut self, child: TaskId) -> Option<ChildStatus> {
        let index = self.records.iter().position(|r| r.child == child)?;
        Some(self.records.remove(index))
    }

    /// Remove and return the oldest record whose child has exited.
    pub fn remove_first_exited(&mut self) -> Option<ChildStatus> {
        let index = self.records.iter().position(|r| r.exited)?;
        Some(self.records.remove(index))
    }

    /// Destroy every record. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.records.len();
        self.records.clear();
        discarded
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChildStatus> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_keyed_by_child() {
        let mut list = ChildStatusList::new();
        assert!(list.insert(TaskId(4)));
        assert!(!list.insert(TaskId(4)));
        assert!(list.insert(TaskId(5)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn mark_exited_records_status() {
        let mut list = ChildStatusList::new();
        list.insert(TaskId(4));
        list.find_mut(TaskId(4)).unwrap().mark_exited(3);
        let record = list.find(TaskId(4)).unwrap();
        assert!(record.exited);
        assert_eq!(record.status, 3);
    }

    #[test]
    fn remove_first_exited_skips_live_children() {
        let mut list = ChildStatusList::new();
        for id in 1..=3 {
            list.insert(TaskId(id));
        }
        assert!(list.remove_first_exited().is_none());
        list.find_mut(TaskId(3)).unwrap().mark_exited(9);
        list.find_mut(TaskId(2)).unwrap().mark_exited(8);
        assert_eq!(list.remove_first_exited().map(|r| r.child), Some(TaskId(2)));
        assert_eq!(list.remove_first_exited().map(|r| r.child), Some(TaskId(3)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn clear_discards_everything() {
        let mut list = ChildStatusList::new();
        list.insert(TaskId(1));
        list.insert(TaskId(2));
        assert_eq!(list.clear(), 2);
        assert!(list.is_empty());
        assert_eq!(list.clear(), 0);
        assert!(list.remove(TaskId(1)).is_none());
    }
}
