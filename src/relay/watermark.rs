//! Per-metric watermarks: the last forwarded timestamp for each metric id
//!
//! Owned by the relay engine and touched only from its loop. Watermarks
//! never move backwards while the process runs and are not persisted.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct WatermarkStore {
    marks: HashMap<String, i64>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `timestamp` is strictly after the stored watermark (or none is stored)
    pub fn is_new(&self, id: &str, timestamp: i64) -> bool {
        match self.marks.get(id) {
            Some(&mark) => timestamp > mark,
            None => true,
        }
    }

    /// Set the watermark for `id` unconditionally. The relay loop goes
    /// through `try_advance` instead.
    pub fn advance(&mut self, id: &str, timestamp: i64) {
        self.marks.insert(id.to_string(), timestamp);
    }

    /// Check-and-set in one step. Returns true if the watermark moved.
    pub fn try_advance(&mut self, id: &str, timestamp: i64) -> bool {
        if !self.is_new(id, timestamp) {
            return false;
        }
        self.marks.insert(id.to_string(), timestamp);
        true
    }

    pub fn get(&self, id: &str) -> Option<i64> {
        self.marks.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
