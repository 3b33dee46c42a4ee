//! Pending rotations ordered by due time

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One scheduled rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub role_name: String,
    pub due_time: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(role_name: impl Into<String>, due_time: DateTime<Utc>) -> Self {
        Self {
            role_name: role_name.into(),
            due_time,
        }
    }
}

type Slot = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct QueueState {
    order: BTreeMap<Slot, String>,
    index: HashMap<String, Slot>,
    next_seq: u64,
}

impl QueueState {
    fn remove(&mut self, name: &str) -> Option<QueueItem> {
        let slot = self.index.remove(name)?;
        self.order.remove(&slot);
        Some(QueueItem::new(name, slot.0))
    }
}

/// Priority queue of rotations, unique by role name
///
/// Earliest due time first; equal due times come out in insertion order.
/// All methods take `&self` and synchronize internally.
#[derive(Debug, Default)]
pub struct RotationQueue {
    state: Mutex<QueueState>,
}

impl RotationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `item`, replacing the role's existing entry
    ///
    /// Returns the due time it replaced, if any.
    pub fn push(&self, item: QueueItem) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        let previous = state.remove(&item.role_name).map(|old| old.due_time);

        let slot = (item.due_time, state.next_seq);
        state.next_seq += 1;
        state.order.insert(slot, item.role_name.clone());
        state.index.insert(item.role_name, slot);
        previous
    }

    /// Remove the earliest item if it is due at `now`
    pub fn pop_next_due(&self, now: DateTime<Utc>) -> Option<QueueItem> {
        let mut state = self.state.lock();
        let (&(due, _), _) = state.order.first_key_value()?;
        if due > now {
            return None;
        }
        let ((due, _), name) = state.order.pop_first()?;
        state.index.remove(&name);
        Some(QueueItem::new(name, due))
    }

    /// Remove the entry for `name`, if queued
    pub fn pop_by_key(&self, name: &str) -> Option<QueueItem> {
        self.state.lock().remove(name)
    }

    /// Earliest item without removing it
    pub fn peek(&self) -> Option<QueueItem> {
        let state = self.state.lock();
        state
            .order
            .first_key_value()
            .map(|(&(due, _), name)| QueueItem::new(name.clone(), due))
    }

    /// Scheduled due time of `name`
    pub fn due_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.state.lock().index.get(name).map(|&(due, _)| due)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
