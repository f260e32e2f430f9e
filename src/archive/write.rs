use std::io::{self, Write};

use tracing::debug;

use super::core::{BlockEntry, FileHeader, Index, IndexHeader, Trailer};
use crate::{Result, codec::EncodedBlock, error::ArchiveError, settings::CompressionSettings};

/// Tracks the position and running checksum of everything written
struct ChecksumWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    position: u64,
}
impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Appends encoded blocks to an archive and seals it with an index
///
/// The index and trailer are only written by [`ArchiveWriter::finish`]; a
/// writer dropped before that leaves an archive that readers reject as
/// truncated.
pub struct ArchiveWriter<W: Write> {
    inner: ChecksumWriter<W>,
    header: FileHeader,
    index: Index,
}
impl<W: Write> ArchiveWriter<W> {
    /// Creates a new writer with the file header written to the inner writer
    pub fn new(inner: W, settings: &CompressionSettings) -> Result<Self> {
        let header = FileHeader::new(settings);
        let mut inner = ChecksumWriter {
            inner,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        };
        inner.write_all(header.as_bytes())?;
        Ok(Self {
            inner,
            header,
            index: Index::default(),
        })
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.index.num_blocks()
    }

    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.index.num_records()
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position
    }

    /// Appends the segments of the next block
    ///
    /// Blocks must arrive in sequence-number order.
    pub fn write_block(&mut self, block: &EncodedBlock) -> Result<()> {
        let expected = self.index.num_blocks() as u64;
        if block.id != expected {
            return Err(ArchiveError::OutOfOrderBlock {
                found: block.id,
                expected,
            }
            .into());
        }
        let entry = BlockEntry::new(block, self.inner.position);
        for segment in &block.segments {
            self.inner.write_all(segment)?;
        }
        self.index.push(entry);
        Ok(())
    }

    /// Writes the index and trailer, returning the inner writer
    pub fn finish(mut self) -> Result<W> {
        let index_offset = self.inner.position;
        let header = IndexHeader::new(self.index.num_blocks() as u64);
        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(self.index.as_bytes())?;

        let trailer = Trailer::new(
            index_offset,
            self.index.num_records(),
            self.inner.hasher.clone().finalize(),
        );
        self.inner.write_all(trailer.as_bytes())?;
        self.inner.flush()?;
        debug!(
            blocks = self.index.num_blocks(),
            records = self.index.num_records(),
            bytes = self.inner.position,
            "sealed archive"
        );
        Ok(self.inner.inner)
    }
}
