use std::{fs, path::Path};

use memmap2::Mmap;

use super::core::{BlockEntry, FileHeader, HEADER_SIZE, Index, IndexHeader, Trailer};
use crate::{
    Record, Result,
    codec::{BlockCodec, StreamKind},
    error::ArchiveError,
    settings::CompressionSettings,
};

/// A memory-mapped, validated archive
///
/// Opening checks, in order: the header magic and version, the trailer, the
/// file checksum and the index. Blocks can then be fetched in any order.
#[derive(Debug)]
pub struct ArchiveReader {
    inner: Mmap,
    header: FileHeader,
    index: Index,
    trailer: Trailer,
}
impl ArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() < HEADER_SIZE {
            return Err(ArchiveError::Truncated {
                reason: "file is shorter than the archive header",
            }
            .into());
        }

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;
        Self::validate(inner)
    }

    fn validate(inner: Mmap) -> Result<Self> {
        let header = FileHeader::from_bytes(&inner)?;

        let trailer_size = size_of::<Trailer>();
        let iheader_size = size_of::<IndexHeader>() as u64;
        if (inner.len() as u64) < HEADER_SIZE + iheader_size + trailer_size as u64 {
            return Err(ArchiveError::Truncated {
                reason: "missing index",
            }
            .into());
        }
        let trailer_start = inner.len() - trailer_size;
        let trailer = Trailer::from_bytes(&inner[trailer_start..])?;

        let actual = crc32fast::hash(&inner[..trailer_start]);
        if actual != trailer.file_checksum {
            return Err(ArchiveError::ChecksumMismatch {
                expected: trailer.file_checksum,
                actual,
            }
            .into());
        }

        // Locate the index between its header and the trailer
        let index_offset = trailer.index_offset;
        let Some(entries_start) = index_offset
            .checked_add(iheader_size)
            .filter(|&end| index_offset >= HEADER_SIZE && end <= trailer_start as u64)
        else {
            return Err(ArchiveError::Truncated {
                reason: "index offset out of bounds",
            }
            .into());
        };
        let entries_start = entries_start as usize;
        let iheader = IndexHeader::from_bytes(&inner[index_offset as usize..entries_start])?;
        let index = Index::from_bytes(
            &inner[entries_start..trailer_start],
            iheader.num_blocks,
            index_offset,
        )?;
        if index.num_records() != trailer.num_records {
            return Err(ArchiveError::InvalidIndex(iheader.num_blocks).into());
        }

        Ok(Self {
            inner,
            header,
            index,
            trailer,
        })
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// The archive's settings, rebuilt for a session with `thread_count` workers
    pub fn settings(&self, thread_count: usize) -> Result<CompressionSettings> {
        self.header.settings.to_settings(thread_count)
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.index.num_blocks()
    }

    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.trailer.num_records
    }

    /// Total size of the archive in bytes
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.num_blocks() == 0
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn entry(&self, id: u64) -> Result<&BlockEntry> {
        self.index.get(id)
    }

    /// The four encoded segments of a block, in stream order
    pub fn block_segments(&self, id: u64) -> Result<[&[u8]; 4]> {
        let entry = self.index.get(id)?;
        Ok(StreamKind::ALL.map(|kind| {
            let start = entry.offset(kind) as usize;
            &self.inner[start..start + entry.len(kind) as usize]
        }))
    }

    /// Decodes every record of one block
    pub fn decode_block(&self, id: u64, codec: &mut BlockCodec) -> Result<Vec<Record>> {
        let entry = self.index.get(id)?;
        let checksum = self
            .header
            .settings
            .has_checksums()
            .then_some(entry.checksum());
        codec.decode(id, self.block_segments(id)?, entry.record_count(), checksum)
    }
}
