//! Fixed-capacity staging area for color sets waiting to be encoded.

use crate::Color;

const WORD_BYTES: usize = std::mem::size_of::<u32>();

/// An append-only arena of size-prefixed color sets with a fixed byte capacity.
///
/// The layout is `[len_0][colors_0...][len_1][colors_1...]...`, all 32-bit words.
/// The backing storage is allocated once; [clear](StagingBuffer::clear) only resets the counters.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    data: Vec<u32>,
    size: usize, // Words in use
    num_sets: usize,
}

impl StagingBuffer {

    /// Allocates a buffer holding at most `capacity_bytes` bytes (rounded down to whole words).
    pub fn new(capacity_bytes: usize) -> Self {
        Self { data: vec![0; capacity_bytes / WORD_BYTES], size: 0, num_sets: 0 }
    }

    /// Bytes needed to stage a color set with `num_colors` colors.
    pub fn record_bytes(num_colors: usize) -> usize {
        (num_colors + 1) * WORD_BYTES
    }

    /// Appends a color set. Returns false and leaves the buffer untouched if the
    /// set does not fit in the remaining capacity.
    pub fn insert(&mut self, colors: &[Color]) -> bool {
        let record_len = colors.len() + 1;
        if self.size + record_len > self.data.len() {
            return false;
        }
        self.data[self.size] = colors.len() as u32;
        self.data[self.size + 1..self.size + record_len].copy_from_slice(colors);
        self.size += record_len;
        self.num_sets += 1;
        true
    }

    /// Empties the buffer without releasing memory.
    pub fn clear(&mut self) {
        self.size = 0;
        self.num_sets = 0;
    }

    /// Number of color sets in the buffer.
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn is_empty(&self) -> bool {
        self.num_sets == 0
    }

    /// Bytes in use.
    pub fn size_in_bytes(&self) -> usize {
        self.size * WORD_BYTES
    }

    pub fn capacity_in_bytes(&self) -> usize {
        self.data.len() * WORD_BYTES
    }

    /// The raw words in use, size prefixes included.
    pub fn raw(&self) -> &[u32] {
        &self.data[..self.size]
    }

    /// Iterates the staged color sets in insertion order.
    pub fn iter(&self) -> StagedSets<'_> {
        StagedSets { words: self.raw(), remaining: self.num_sets }
    }
}

/// Iterator over the color sets of a [StagingBuffer].
pub struct StagedSets<'a> {
    words: &'a [u32],
    remaining: usize,
}

impl<'a> Iterator for StagedSets<'a> {
    type Item = &'a [Color];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.words[0] as usize;
        let (set, rest) = self.words[1..].split_at(len);
        self.words = rest;
        self.remaining -= 1;
        Some(set)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StagedSets<'_> {}
