use bytemuck::{Pod, Zeroable};

use super::{HEADER_SIZE, INDEX_MAGIC, TRAILER_MAGIC};
use crate::{
    Result,
    codec::{EncodedBlock, StreamKind},
    error::ArchiveError,
};

/// The header preceding the block index
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct IndexHeader {
    /// Magic number identifying the index
    magic: [u8; 8],

    /// Number of entries in the index
    pub(crate) num_blocks: u64,
}
impl IndexHeader {
    #[must_use]
    pub fn new(num_blocks: u64) -> Self {
        Self {
            magic: *INDEX_MAGIC,
            num_blocks,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *INDEX_MAGIC {
            return Err(ArchiveError::Truncated {
                reason: "missing index header",
            }
            .into());
        }
        Ok(header)
    }
}

/// Location and metadata of one block in the archive
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod, Default)]
#[repr(C)]
pub struct BlockEntry {
    /// Sequence number of the block
    pub(crate) id: u64,

    /// Absolute byte offset of each segment, in stream order
    pub(crate) offsets: [u64; 4],

    /// Byte length of each segment, in stream order
    pub(crate) lengths: [u64; 4],

    pub(crate) record_count: u64,

    /// CRC32 of the decoded block content (0 when checksums are disabled)
    pub(crate) checksum: u32,

    reserved: u32,
}
impl BlockEntry {
    /// Builds the entry for a block whose first segment starts at `offset`
    #[must_use]
    pub fn new(block: &EncodedBlock, offset: u64) -> Self {
        let mut entry = Self {
            id: block.id,
            record_count: block.record_count,
            checksum: block.checksum,
            ..Default::default()
        };
        let mut offset = offset;
        for kind in StreamKind::ALL {
            let len = block.segment(kind).len() as u64;
            entry.offsets[kind.index()] = offset;
            entry.lengths[kind.index()] = len;
            offset += len;
        }
        entry
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    #[must_use]
    pub fn offset(&self, kind: StreamKind) -> u64 {
        self.offsets[kind.index()]
    }

    #[must_use]
    pub fn len(&self, kind: StreamKind) -> u64 {
        self.lengths[kind.index()]
    }

    /// Byte offset one past the last segment of the block
    #[must_use]
    pub fn end(&self) -> u64 {
        let last = StreamKind::Structure;
        self.offset(last) + self.len(last)
    }

    /// Total encoded size of the block
    #[must_use]
    pub fn block_len(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

/// The fixed-size trailer closing a finished archive
///
/// An archive without a valid trailer was never finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Trailer {
    /// Byte offset of the [`IndexHeader`]
    pub(crate) index_offset: u64,

    /// Total number of records in the archive
    pub(crate) num_records: u64,

    /// CRC32 of every byte preceding the trailer
    pub(crate) file_checksum: u32,

    magic: [u8; 6],
    reserved: [u8; 6],
}
impl Trailer {
    #[must_use]
    pub fn new(index_offset: u64, num_records: u64, file_checksum: u32) -> Self {
        Self {
            index_offset,
            num_records,
            file_checksum,
            magic: *TRAILER_MAGIC,
            reserved: [0; 6],
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let trailer: Self = bytemuck::pod_read_unaligned(bytes);
        if trailer.magic != *TRAILER_MAGIC {
            return Err(ArchiveError::Truncated {
                reason: "missing trailer",
            }
            .into());
        }
        Ok(trailer)
    }
}

/// The parsed block index of an archive
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<BlockEntry>,
}
impl Index {
    /// Parses and validates the entries stored between the index header and
    /// the trailer
    ///
    /// Entries must be numbered consecutively and their segments must tile the
    /// file from the end of the file header up to `index_offset`.
    pub fn from_bytes(bytes: &[u8], num_blocks: u64, index_offset: u64) -> Result<Self> {
        let entry_size = size_of::<BlockEntry>();
        if (bytes.len() as u64) != num_blocks.saturating_mul(entry_size as u64) {
            return Err(ArchiveError::Truncated {
                reason: "index size disagrees with its block count",
            }
            .into());
        }
        let entries: Vec<BlockEntry> = bytes
            .chunks_exact(entry_size)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let mut expected_offset = HEADER_SIZE;
        let mut num_records = 0u64;
        for (idx, entry) in entries.iter().enumerate() {
            if entry.id != idx as u64 {
                return Err(ArchiveError::InvalidIndex(idx as u64).into());
            }
            num_records = num_records
                .checked_add(entry.record_count)
                .ok_or(ArchiveError::InvalidIndex(entry.id))?;
            for kind in StreamKind::ALL {
                if entry.offset(kind) != expected_offset {
                    return Err(ArchiveError::InvalidIndex(entry.id).into());
                }
                expected_offset = expected_offset
                    .checked_add(entry.len(kind))
                    .filter(|&end| end <= index_offset)
                    .ok_or(ArchiveError::Truncated {
                        reason: "segment extends past the index",
                    })?;
            }
        }
        if expected_offset != index_offset {
            return Err(ArchiveError::Truncated {
                reason: "unindexed bytes before the index",
            }
            .into());
        }
        Ok(Self { entries })
    }

    /// Returns the byte representation of the entries
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }

    pub fn push(&mut self, entry: BlockEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Result<&BlockEntry> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.entries.get(idx))
            .ok_or_else(|| {
                ArchiveError::BlockOutOfRange {
                    requested: id,
                    num_blocks: self.num_blocks() as u64,
                }
                .into()
            })
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.entries.len()
    }

    /// Total records over all blocks, saturating at `u64::MAX`
    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.record_count))
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    fn block(id: u64, lens: [usize; 4]) -> EncodedBlock {
        EncodedBlock {
            id,
            record_count: 10,
            segments: lens.map(|len| vec![0; len]),
            ..Default::default()
        }
    }

    fn index(blocks: &[EncodedBlock]) -> (Index, u64) {
        let mut index = Index::default();
        let mut offset = HEADER_SIZE;
        for block in blocks {
            let entry = BlockEntry::new(block, offset);
            offset = entry.end();
            index.push(entry);
        }
        (index, offset)
    }

    #[test]
    fn test_sizes() {
        assert_eq!(size_of::<IndexHeader>(), 16);
        assert_eq!(size_of::<BlockEntry>(), 88);
        assert_eq!(size_of::<Trailer>(), 32);
    }

    #[test]
    fn test_entry_offsets() {
        let entry = BlockEntry::new(&block(0, [5, 7, 11, 13]), 64);
        assert_eq!(entry.offset(StreamKind::Header), 64);
        assert_eq!(entry.offset(StreamKind::Sequence), 69);
        assert_eq!(entry.offset(StreamKind::Quality), 76);
        assert_eq!(entry.offset(StreamKind::Structure), 87);
        assert_eq!(entry.end(), 100);
        assert_eq!(entry.block_len(), 36);
    }

    #[test]
    fn test_index_roundtrip() -> Result<()> {
        let (index, end) = index(&[block(0, [1, 2, 3, 4]), block(1, [4, 3, 2, 1])]);
        let parsed = Index::from_bytes(index.as_bytes(), 2, end)?;
        assert_eq!(parsed.entries(), index.entries());
        assert_eq!(parsed.num_records(), 20);
        assert_eq!(parsed.get(1)?.id(), 1);
        assert!(matches!(
            parsed.get(2),
            Err(Error::ArchiveError(ArchiveError::BlockOutOfRange { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_index_out_of_order() -> Result<()> {
        let (index, end) = index(&[block(0, [1, 2, 3, 4]), block(5, [4, 3, 2, 1])]);
        assert!(matches!(
            Index::from_bytes(index.as_bytes(), 2, end),
            Err(Error::ArchiveError(ArchiveError::InvalidIndex(1)))
        ));
        Ok(())
    }

    #[test]
    fn test_index_record_count_overflow() {
        let mut blocks = [block(0, [1, 2, 3, 4]), block(1, [4, 3, 2, 1])];
        for block in &mut blocks {
            block.record_count = u64::MAX / 2 + 1;
        }
        let (index, end) = index(&blocks);
        assert_eq!(index.num_records(), u64::MAX);
        assert!(matches!(
            Index::from_bytes(index.as_bytes(), 2, end),
            Err(Error::ArchiveError(ArchiveError::InvalidIndex(1)))
        ));
    }

    #[test]
    fn test_index_segment_past_end() {
        let (index, end) = index(&[block(0, [1, 2, 3, 4])]);
        let err = Index::from_bytes(index.as_bytes(), 1, end - 1).unwrap_err();
        assert!(err.is_truncated());
        let err = Index::from_bytes(index.as_bytes(), 2, end).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_trailer_magic() -> Result<()> {
        let trailer = Trailer::new(100, 5, 0xDEAD_BEEF);
        assert_eq!(Trailer::from_bytes(trailer.as_bytes())?, trailer);
        let mut bytes = trailer.as_bytes().to_vec();
        bytes[20] ^= 0xFF;
        assert!(Trailer::from_bytes(&bytes).unwrap_err().is_truncated());
        Ok(())
    }
}
