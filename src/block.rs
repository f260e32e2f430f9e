//! Accumulation of records into bounded blocks

use tracing::debug;

use crate::{
    Record,
    settings::CompressionSettings,
    split::{Splitter, StreamFragments},
};

/// Hard cap on the number of records in a single block
pub const MAX_BLOCK_RECORDS: usize = 1 << 22;

/// A sealed block of split records with its sequence number
#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    pub id: u64,
    pub fragments: StreamFragments,
}
impl RawBlock {
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.fragments.num_records()
    }
}

/// Collects records until the configured buffer size is reached
///
/// A block is sealed before the record that would push it past the buffer
/// size, so a single record larger than the buffer ends up alone in its own
/// block.
pub struct BlockBuffer {
    splitter: Splitter,
    buffer_size: u64,

    /// Record bytes accumulated in the open block
    bytes: u64,
    fragments: StreamFragments,
    next_id: u64,
}
impl BlockBuffer {
    #[must_use]
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            splitter: Splitter::new(settings),
            buffer_size: settings.buffer_size,
            bytes: 0,
            fragments: StreamFragments::default(),
            next_id: 0,
        }
    }

    /// Sequence number the next sealed block will receive
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of records in the open block
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.fragments.num_records()
    }

    #[must_use]
    pub fn filter_fallbacks(&self) -> u64 {
        self.splitter.filter_fallbacks()
    }

    fn can_fit(&self, record: &Record) -> bool {
        self.fragments.is_empty()
            || (self.bytes + record.size() as u64 <= self.buffer_size
                && self.fragments.num_records() < MAX_BLOCK_RECORDS)
    }

    /// Adds a validated record, returning the block it sealed (if any)
    pub fn push(&mut self, record: &Record) -> Option<RawBlock> {
        let sealed = if self.can_fit(record) {
            None
        } else {
            self.seal()
        };
        self.splitter.push(record, &mut self.fragments);
        self.bytes += record.size() as u64;
        sealed
    }

    /// Seals the open block, if it holds any records
    pub fn finish(&mut self) -> Option<RawBlock> {
        self.seal()
    }

    fn seal(&mut self) -> Option<RawBlock> {
        if self.fragments.is_empty() {
            return None;
        }
        let block = RawBlock {
            id: self.next_id,
            fragments: std::mem::take(&mut self.fragments),
        };
        debug!(
            block = block.id,
            records = block.num_records(),
            bytes = self.bytes,
            "sealed block"
        );
        self.next_id += 1;
        self.bytes = 0;
        Some(block)
    }
}
