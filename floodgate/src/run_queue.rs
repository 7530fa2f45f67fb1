//! Bounded set of jids currently in flight for one input queue.

use crate::error::QueueError;
use std::collections::HashSet;

/// Set semantics keep duplicate jids from double-counting against capacity;
/// jids should already be unique, this just refuses to make a bad day worse.
#[derive(Debug, Clone)]
pub struct RunQueue {
    name: String,
    capacity: usize,
    items: HashSet<String>,
}

impl RunQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: HashSet::new(),
        }
    }

    /// Insert a jid. Re-adding a jid that is already present is a no-op
    /// success; inserting into a full queue is an error.
    pub fn add(&mut self, item: impl Into<String>) -> Result<(), QueueError> {
        let item = item.into();
        if self.items.contains(&item) {
            return Ok(());
        }
        if self.items.len() >= self.capacity {
            return Err(QueueError::Full {
                name: self.name.clone(),
                capacity: self.capacity,
            });
        }
        self.items.insert(item);
        Ok(())
    }

    /// Remove a jid. Removing one that is absent is a silent no-op; duplicate
    /// completion events land here after the first one retired the slot.
    pub fn remove(&mut self, item: &str) {
        self.items.remove(item);
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.contains(item)
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}
