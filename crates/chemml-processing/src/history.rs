//! Linear undo/redo history of dataset snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::HistoryError;
use crate::operations::Operation;

/// One applied operation with the snapshots on either side of it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub operation: Operation,
    pub before: Arc<Dataset>,
    pub after: Arc<Dataset>,
    pub applied_at: DateTime<Utc>,
}

/// Serializable view of an entry for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub index: usize,
    pub operation: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: usize,
    /// Undone entries stay available for redo until the next apply.
    pub undone: bool,
}

/// Snapshots plus a cursor. `cursor` counts the entries currently applied,
/// so `0` means the base snapshot is current.
///
/// With `max_entries` set, the oldest entry is folded once the bound is
/// exceeded: its result becomes the new base and its operation moves to
/// `folded`, so the applied operations still lead from the loaded dataset
/// to the current one.
#[derive(Debug, Clone)]
pub struct History {
    origin: Arc<Dataset>,
    base: Arc<Dataset>,
    folded: Vec<Operation>,
    entries: Vec<HistoryEntry>,
    cursor: usize,
    max_entries: Option<usize>,
}

impl History {
    pub fn new(initial: Arc<Dataset>, max_entries: Option<usize>) -> Self {
        Self {
            base: Arc::clone(&initial),
            origin: initial,
            folded: Vec::new(),
            entries: Vec::new(),
            cursor: 0,
            max_entries,
        }
    }

    pub fn current(&self) -> Arc<Dataset> {
        match self.cursor {
            0 => Arc::clone(&self.base),
            n => Arc::clone(&self.entries[n - 1].after),
        }
    }

    /// The dataset the history was created with.
    pub fn initial(&self) -> Arc<Dataset> {
        Arc::clone(&self.origin)
    }

    /// Record `operation` producing `after` from the current snapshot.
    /// Redoable entries are discarded.
    pub fn push(&mut self, operation: Operation, after: Arc<Dataset>) {
        let before = self.current();
        self.entries.truncate(self.cursor);
        self.entries.push(HistoryEntry {
            operation,
            before,
            after,
            applied_at: Utc::now(),
        });
        self.cursor = self.entries.len();

        if let Some(max) = self.max_entries
            && self.entries.len() > max
        {
            let oldest = self.entries.remove(0);
            self.base = oldest.after;
            self.folded.push(oldest.operation);
            self.cursor -= 1;
        }
    }

    pub fn undo(&mut self) -> Result<Arc<Dataset>, HistoryError> {
        if self.cursor == 0 {
            return Err(HistoryError::NothingToUndo);
        }
        self.cursor -= 1;
        Ok(self.current())
    }

    pub fn redo(&mut self) -> Result<Arc<Dataset>, HistoryError> {
        if self.cursor == self.entries.len() {
            return Err(HistoryError::NothingToRedo);
        }
        self.cursor += 1;
        Ok(self.current())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Total entries, including undone ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Operations leading from the initial snapshot to the current one,
    /// folded entries included.
    pub fn applied_operations(&self) -> Vec<Operation> {
        self.folded
            .iter()
            .chain(self.entries[..self.cursor].iter().map(|entry| &entry.operation))
            .cloned()
            .collect()
    }

    pub fn items(&self) -> Vec<HistoryItem> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| HistoryItem {
                index,
                operation: entry.operation.name().to_string(),
                description: entry.operation.describe(),
                applied_at: entry.applied_at,
                rows: entry.after.height(),
                columns: entry.after.width(),
                undone: index >= self.cursor,
            })
            .collect()
    }
}
