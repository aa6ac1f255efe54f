//! Batch progress accounting.
//!
//! One [`ProgressTracker`] instance covers one batch of capture files. The
//! pipeline registers every file's declared size up front, reports each
//! frame's captured length as it is consumed, and marks files complete so
//! that drift between declared size and attributable bytes (capture framing
//! overhead, truncated files) never stalls the percentage short of 100.
//!
//! The tracker returns a value only when the rounded percentage actually
//! changed, which bounds notification volume for subscribers.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Byte-level progress accounting across a batch of capture files.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    /// Sum of declared sizes of all registered files.
    total_bytes: u64,
    /// Declared sizes of completed files, fully credited.
    finished_bytes: u64,
    /// Bytes attributed to files still in flight.
    current_bytes: u64,
    declared: HashMap<PathBuf, u64>,
    completed: HashSet<PathBuf>,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register files and their declared sizes for this batch.
    ///
    /// Re-registering a path replaces its declared size.
    pub fn register(&mut self, files: &[(PathBuf, u64)]) {
        for (path, size) in files {
            match self.declared.insert(path.clone(), *size) {
                None => self.total_bytes += size,
                Some(prev) => self.total_bytes = self.total_bytes - prev + size,
            }
        }
    }

    /// Reset all counters before a new batch.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Account consumed bytes; returns the new percentage when the rounded
    /// value changed since the last notification.
    pub fn notify_consumed(&mut self, n_bytes: u64) -> Option<u8> {
        self.current_bytes += n_bytes;
        self.check_changed()
    }

    /// Mark a file fully accounted, crediting its whole declared size.
    ///
    /// Idempotent per file. Returns the new percentage when it changed.
    pub fn notify_file_complete(&mut self, path: &Path) -> Option<u8> {
        if !self.completed.insert(path.to_path_buf()) {
            return None;
        }
        let declared = self.declared.get(path).copied().unwrap_or(0);
        // Credit whichever is larger so the percentage never moves backward
        // when a file held more frames than its declared size suggested.
        self.finished_bytes += declared.max(self.current_bytes);
        self.current_bytes = 0;
        self.check_changed()
    }

    /// Current percentage, 0..=100. A zero-size batch reports 0.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let consumed = self.finished_bytes + self.current_bytes;
        let rounded = (consumed as u128 * 100 + (self.total_bytes / 2) as u128)
            / self.total_bytes as u128;
        rounded.min(100) as u8
    }

    /// Total bytes attributed so far.
    pub fn consumed_bytes(&self) -> u64 {
        self.finished_bytes + self.current_bytes
    }

    /// Total declared bytes registered for the batch.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn check_changed(&mut self) -> Option<u8> {
        let percent = self.percent();
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            Some(percent)
        } else {
            None
        }
    }
}
