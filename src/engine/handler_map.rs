//! Correlation map
//!
//! Bijection between wire sequence numbers and handler keys. Every entry is
//! present in both directions or in neither.

use std::collections::HashMap;

use super::handler::{Handler, HandlerKey};

struct Entry {
    handler: Box<dyn Handler>,
    key: HandlerKey,
}

/// Outstanding handlers indexed by sequence and by key
#[derive(Default)]
pub struct HandlerMap {
    by_sequence: HashMap<i64, Entry>,
    by_key: HashMap<HandlerKey, i64>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handler under both indexes.
    ///
    /// If either the sequence or the key is already present nothing changes
    /// and the handler is handed back.
    pub fn insert(
        &mut self,
        sequence: i64,
        key: HandlerKey,
        handler: Box<dyn Handler>,
    ) -> Result<(), Box<dyn Handler>> {
        if self.by_sequence.contains_key(&sequence) || self.by_key.contains_key(&key) {
            return Err(handler);
        }
        self.by_sequence.insert(sequence, Entry { handler, key });
        self.by_key.insert(key, sequence);
        Ok(())
    }

    /// Remove the handler waiting on `sequence`
    pub fn remove_by_sequence(&mut self, sequence: i64) -> Option<(Box<dyn Handler>, HandlerKey)> {
        let entry = self.by_sequence.remove(&sequence)?;
        self.by_key.remove(&entry.key);
        Some((entry.handler, entry.key))
    }

    /// Remove the handler registered under `key`
    pub fn remove_by_key(&mut self, key: HandlerKey) -> Option<(Box<dyn Handler>, i64)> {
        let sequence = self.by_key.remove(&key)?;
        let entry = self.by_sequence.remove(&sequence)?;
        Some((entry.handler, sequence))
    }

    /// Take every handler out, leaving the map empty
    pub fn drain(&mut self) -> Vec<Box<dyn Handler>> {
        self.by_key.clear();
        self.by_sequence.drain().map(|(_, entry)| entry.handler).collect()
    }

    pub fn contains_sequence(&self, sequence: i64) -> bool {
        self.by_sequence.contains_key(&sequence)
    }

    pub fn contains_key(&self, key: HandlerKey) -> bool {
        self.by_key.contains_key(&key)
    }

    /// Sequence registered for `key`
    pub fn sequence_of(&self, key: HandlerKey) -> Option<i64> {
        self.by_key.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sequence.is_empty()
    }
}
