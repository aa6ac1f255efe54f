//! Sparse byte reassembly with explicit gaps.
//!
//! [`ByteAssembly`] is the payload store behind one direction of a TCP
//! session: bytes are placed at the stream offset implied by their sequence
//! number, overlapping writes are resolved first-writer-wins, and missing
//! ranges stay visible as [`ByteRange`] gaps instead of being silently
//! coalesced. A consumer that wants only safe data reads
//! [`ByteAssembly::contiguous_prefix`]; a consumer that tolerates holes
//! walks [`ByteAssembly::filled`].

use std::collections::BTreeMap;

/// A half-open byte range `[start, end)` in stream-offset space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Sparse byte buffer addressed by stream offset.
///
/// Invariants: stored chunks are non-empty, disjoint and non-adjacent
/// (adjacent chunks coalesce on insert). A byte once written is never
/// overwritten.
#[derive(Debug, Clone, Default)]
pub struct ByteAssembly {
    chunks: BTreeMap<u64, Vec<u8>>,
}

impl ByteAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bytes at the given offset, first-writer-wins.
    ///
    /// Only the sub-ranges of `[offset, offset + data.len())` that are not
    /// yet filled are written; bytes already present are left untouched.
    pub fn insert(&mut self, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let new_end = offset + data.len() as u64;

        // Existing chunks overlapping the new range, including one that may
        // begin before `offset` and extend into it.
        let mut covered: Vec<ByteRange> = Vec::new();
        if let Some((&start, chunk)) = self.chunks.range(..=offset).next_back() {
            let end = start + chunk.len() as u64;
            if end > offset {
                covered.push(ByteRange { start, end });
            }
        }
        for (&start, chunk) in self.chunks.range(offset..new_end) {
            if covered.last().map(|r| r.start) != Some(start) {
                covered.push(ByteRange {
                    start,
                    end: start + chunk.len() as u64,
                });
            }
        }

        // Write the uncovered sub-ranges.
        let mut cursor = offset;
        for range in &covered {
            if range.start > cursor {
                let lo = (cursor - offset) as usize;
                let hi = (range.start - offset) as usize;
                self.chunks.insert(cursor, data[lo..hi].to_vec());
            }
            cursor = cursor.max(range.end);
        }
        if cursor < new_end {
            let lo = (cursor - offset) as usize;
            self.chunks.insert(cursor, data[lo..].to_vec());
        }

        self.coalesce_around(offset.saturating_sub(1), new_end);
    }

    /// Merge chunks that became exactly adjacent after an insert.
    fn coalesce_around(&mut self, from: u64, to: u64) {
        let mut anchor = match self.chunks.range(..=from).next_back() {
            Some((&start, _)) => start,
            None => match self.chunks.keys().next() {
                Some(&start) => start,
                None => return,
            },
        };
        loop {
            let end = anchor + self.chunks[&anchor].len() as u64;
            match self.chunks.range(anchor + 1..).next().map(|(&s, _)| s) {
                Some(next) if next == end => {
                    let tail = self.chunks.remove(&next).unwrap_or_default();
                    if let Some(chunk) = self.chunks.get_mut(&anchor) {
                        chunk.extend_from_slice(&tail);
                    }
                }
                Some(next) if next < to => anchor = next,
                _ => break,
            }
        }
    }

    /// Bytes from offset 0 up to the first gap.
    ///
    /// Empty when nothing has been written at offset 0 yet.
    pub fn contiguous_prefix(&self) -> &[u8] {
        match self.chunks.get(&0) {
            Some(chunk) => chunk,
            None => &[],
        }
    }

    /// Unfilled ranges below the high-water mark, in ascending order.
    pub fn gaps(&self) -> Vec<ByteRange> {
        let mut gaps = Vec::new();
        let mut cursor = 0u64;
        for (&start, chunk) in &self.chunks {
            if start > cursor {
                gaps.push(ByteRange {
                    start: cursor,
                    end: start,
                });
            }
            cursor = start + chunk.len() as u64;
        }
        gaps
    }

    /// Whether all bytes below the high-water mark are present.
    pub fn is_contiguous(&self) -> bool {
        self.chunks.len() <= 1 && self.chunks.keys().next().map_or(true, |&s| s == 0)
    }

    /// Iterate the filled chunks as `(offset, bytes)`, ascending.
    pub fn filled(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.chunks.iter().map(|(&off, chunk)| (off, chunk.as_slice()))
    }

    /// Highest filled offset (exclusive); 0 when empty.
    pub fn end(&self) -> u64 {
        self.chunks
            .iter()
            .next_back()
            .map(|(&start, chunk)| start + chunk.len() as u64)
            .unwrap_or(0)
    }

    /// Total number of bytes present (gaps excluded).
    pub fn bytes_filled(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
