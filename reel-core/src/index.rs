//! Chunk index cache.
//!
//! Every chunk visited by the forward scan is recorded once, in scan order.
//! Revisiting a scan position that is already known costs a table lookup
//! instead of a read from the backing stream.

use serde::Serialize;

use crate::container::ChunkKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkIndexEntry {
    pub kind: ChunkKind,
    /// Position of the chunk's first header byte.
    pub offset: u64,
}

/// Outcome of looking up a scan position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Cached(ChunkIndexEntry),
    NeedsFreshRead,
}

/// Append-only, offset-monotonic table of visited chunks.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    entries: Vec<ChunkIndexEntry>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, scan_pos: usize) -> Resolved {
        match self.entries.get(scan_pos) {
            Some(entry) => Resolved::Cached(*entry),
            None => Resolved::NeedsFreshRead,
        }
    }

    /// Record the chunk found by a fresh read and return its scan position.
    pub fn append(&mut self, entry: ChunkIndexEntry) -> usize {
        debug_assert!(
            self.entries.last().map_or(true, |last| last.offset < entry.offset),
            "chunk offsets must strictly increase: {:?} after {:?}",
            entry,
            self.entries.last()
        );
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkIndexEntry] {
        &self.entries
    }
}
