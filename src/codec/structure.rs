//! Structure stream codec
//!
//! Stores the record count, read lengths and plus-line kinds of a block.
//! Uniform read lengths collapse to a single value and a block whose
//! plus-lines are all bare or all repeat the tag stores no per-record kinds.

use super::{
    SegmentCodec,
    utils::{ColumnCompressor, SegmentReader, write_declared_len, write_varint},
};
use crate::{
    Result,
    block::MAX_BLOCK_RECORDS,
    error::StreamKind,
    split::{PlusKind, StreamFragments},
};

/// All reads of the block share one length
pub const UNIFORM_LENGTH: u8 = 1 << 0;
/// Every plus-line of the block is bare
pub const PLUS_ALL_EMPTY: u8 = 1 << 1;
/// Every plus-line of the block repeats its tag
pub const PLUS_ALL_REPEAT: u8 = 1 << 2;

pub struct StructureCodec {
    columns: ColumnCompressor,
}
impl Default for StructureCodec {
    fn default() -> Self {
        Self {
            columns: ColumnCompressor::new(),
        }
    }
}
impl StructureCodec {
    fn flags(fragments: &StreamFragments) -> u8 {
        let mut flags = 0;
        let Some(&first_len) = fragments.lengths.first() else {
            return flags;
        };
        if fragments.lengths.iter().all(|&l| l == first_len) {
            flags |= UNIFORM_LENGTH;
        }
        if fragments.plus_kinds.iter().all(|&k| k == PlusKind::Empty) {
            flags |= PLUS_ALL_EMPTY;
        } else if fragments.plus_kinds.iter().all(|&k| k == PlusKind::Repeat) {
            flags |= PLUS_ALL_REPEAT;
        }
        flags
    }
}

impl SegmentCodec for StructureCodec {
    fn kind(&self) -> StreamKind {
        StreamKind::Structure
    }

    fn encode(&mut self, fragments: &StreamFragments, out: &mut Vec<u8>) -> Result<()> {
        write_declared_len(out, fragments.num_records() as u64)?;
        let flags = Self::flags(fragments);
        out.push(flags);

        let mut raw = Vec::with_capacity(fragments.num_records() * 2 + fragments.plus_data.len());
        if flags & UNIFORM_LENGTH != 0 {
            write_varint(&mut raw, u64::from(fragments.lengths[0]));
        } else {
            for &len in &fragments.lengths {
                write_varint(&mut raw, u64::from(len));
            }
        }
        if flags & (PLUS_ALL_EMPTY | PLUS_ALL_REPEAT) == 0 {
            raw.extend(fragments.plus_kinds.iter().map(|&k| k as u8));
            for &len in &fragments.plus_lens {
                write_varint(&mut raw, u64::from(len));
            }
            raw.extend_from_slice(&fragments.plus_data);
        }
        self.columns.write_column(&raw, out)
    }

    fn decode(
        &mut self,
        block: u64,
        segment: &[u8],
        fragments: &mut StreamFragments,
    ) -> Result<()> {
        let mut reader = SegmentReader::new(block, StreamKind::Structure, segment);
        let num_records = reader.read_declared_len()? as usize;
        if num_records > MAX_BLOCK_RECORDS {
            return Err(reader.invalid("record count exceeds block limit"));
        }
        let flags = reader.read_u8()?;
        let raw = reader.read_column()?;
        let mut raw = SegmentReader::new(block, StreamKind::Structure, &raw);

        fragments.lengths.clear();
        fragments.plus_kinds.clear();
        fragments.plus_lens.clear();
        fragments.plus_data.clear();
        if num_records == 0 {
            return Ok(());
        }

        if flags & UNIFORM_LENGTH != 0 {
            let len = raw.read_varint()? as u32;
            fragments.lengths.resize(num_records, len);
        } else {
            for _ in 0..num_records {
                fragments.lengths.push(raw.read_varint()? as u32);
            }
        }

        if flags & PLUS_ALL_EMPTY != 0 {
            fragments.plus_kinds.resize(num_records, PlusKind::Empty);
        } else if flags & PLUS_ALL_REPEAT != 0 {
            fragments.plus_kinds.resize(num_records, PlusKind::Repeat);
        } else {
            let mut num_literals = 0;
            for &byte in raw.read_bytes(num_records)? {
                let kind = PlusKind::from_u8(byte)
                    .ok_or_else(|| raw.invalid("unknown plus kind"))?;
                if kind == PlusKind::Literal {
                    num_literals += 1;
                }
                fragments.plus_kinds.push(kind);
            }
            let mut total = 0;
            for _ in 0..num_literals {
                let len = raw.read_varint()? as u32;
                total += len as usize;
                fragments.plus_lens.push(len);
            }
            fragments.plus_data.extend_from_slice(raw.read_bytes(total)?);
        }
        reader.check_len(num_records as u64, fragments.lengths.len() as u64)
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn fragments(lengths: &[u32], plus: &[Option<&[u8]>], repeat: bool) -> StreamFragments {
        let mut fragments = StreamFragments::default();
        fragments.lengths.extend_from_slice(lengths);
        for p in plus {
            let kind = match p {
                None => PlusKind::Empty,
                Some(_) if repeat => PlusKind::Repeat,
                Some(data) => {
                    fragments.plus_data.extend_from_slice(data);
                    fragments.plus_lens.push(data.len() as u32);
                    PlusKind::Literal
                }
            };
            fragments.plus_kinds.push(kind);
        }
        fragments
    }

    fn roundtrip(input: &StreamFragments) -> Result<usize> {
        let mut out = Vec::new();
        StructureCodec::default().encode(input, &mut out)?;
        let mut decoded = StreamFragments::default();
        StructureCodec::default().decode(0, &out, &mut decoded)?;
        assert_eq!(decoded.lengths, input.lengths);
        assert_eq!(decoded.plus_kinds, input.plus_kinds);
        assert_eq!(decoded.plus_lens, input.plus_lens);
        assert_eq!(decoded.plus_data, input.plus_data);
        Ok(out.len())
    }

    #[test]
    fn test_uniform_and_empty_plus() -> Result<()> {
        let input = fragments(&[100; 50], &[None; 50], false);
        assert_eq!(
            StructureCodec::flags(&input),
            UNIFORM_LENGTH | PLUS_ALL_EMPTY
        );
        roundtrip(&input)?;
        Ok(())
    }

    #[test]
    fn test_mixed() -> Result<()> {
        let input = fragments(
            &[3, 0, 150, 151],
            &[None, Some(&b"r2"[..]), Some(&b""[..]), Some(&b"xyz"[..])],
            false,
        );
        assert_eq!(StructureCodec::flags(&input), 0);
        roundtrip(&input)?;
        Ok(())
    }

    #[test]
    fn test_repeat_elision_is_smaller() -> Result<()> {
        let tags: Vec<Vec<u8>> = (0..1000)
            .map(|i| format!("read.{i} length=150").into_bytes())
            .collect();
        let plus: Vec<Option<&[u8]>> = tags.iter().map(|t| Some(t.as_slice())).collect();
        let literal = roundtrip(&fragments(&[150; 1000], &plus, false))?;
        let repeated = fragments(&[150; 1000], &plus, true);
        assert_eq!(
            StructureCodec::flags(&repeated),
            UNIFORM_LENGTH | PLUS_ALL_REPEAT
        );
        let repeated = roundtrip(&repeated)?;
        assert!(repeated < literal);
        Ok(())
    }

    #[test]
    fn test_empty_block() -> Result<()> {
        roundtrip(&StreamFragments::default())?;
        Ok(())
    }
}
