//! Conversion between records and the four per-block streams
//!
//! [`StreamFragments`] holds the columns of a block: tags for the header
//! stream, nucleotides for the sequence stream, qualities for the quality
//! stream, and the read lengths and plus-line kinds for the structure stream.

use crate::{
    Record, Result,
    binning::QualityBinner,
    error::{StreamError, StreamKind},
    filter::TagFilter,
    settings::CompressionSettings,
};

/// How a record's plus-line is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlusKind {
    /// A bare `+` line
    Empty = 0,
    /// The plus-line repeats the tag
    Repeat = 1,
    /// The plus-line is stored verbatim
    Literal = 2,
}
impl PlusKind {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Empty),
            1 => Some(Self::Repeat),
            2 => Some(Self::Literal),
            _ => None,
        }
    }
}

/// The columns of one block of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFragments {
    pub(crate) tags: Vec<u8>,
    pub(crate) tag_lens: Vec<u32>,
    pub(crate) sequences: Vec<u8>,
    pub(crate) qualities: Vec<u8>,
    pub(crate) lengths: Vec<u32>,
    pub(crate) plus_kinds: Vec<PlusKind>,
    pub(crate) plus_lens: Vec<u32>,
    pub(crate) plus_data: Vec<u8>,
}
impl StreamFragments {
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.lengths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Total number of payload bytes held by the block
    #[must_use]
    pub fn raw_size(&self) -> usize {
        self.tags.len() + self.sequences.len() + self.qualities.len() + self.plus_data.len()
    }

    /// Number of nucleotides in the block
    #[must_use]
    pub fn nuclen(&self) -> usize {
        self.sequences.len()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.tag_lens.clear();
        self.sequences.clear();
        self.qualities.clear();
        self.lengths.clear();
        self.plus_kinds.clear();
        self.plus_lens.clear();
        self.plus_data.clear();
    }

    /// Checksum over the decoded content of the block
    #[must_use]
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.tags);
        hasher.update(&self.sequences);
        hasher.update(&self.qualities);
        hasher.update(&self.plus_data);
        hasher.finalize()
    }
}

/// Splits records into [`StreamFragments`]
///
/// Applies the tag filter and quality binner on the way in.
#[derive(Debug)]
pub struct Splitter {
    filter: TagFilter,
    binner: QualityBinner,
    plus_repetition: bool,
}
impl Splitter {
    #[must_use]
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            filter: TagFilter::new(settings.tag_mask),
            binner: QualityBinner::new(settings.quality_mode, settings.quality_offset),
            plus_repetition: settings.plus_repetition,
        }
    }

    /// Number of tags passed through unfiltered because they were malformed
    #[must_use]
    pub fn filter_fallbacks(&self) -> u64 {
        self.filter.fallbacks()
    }

    /// Appends a record to the fragments
    ///
    /// The record must already be validated.
    pub fn push(&self, record: &Record, fragments: &mut StreamFragments) {
        let tag_start = fragments.tags.len();
        self.filter.filter_into(record.tag(), &mut fragments.tags);
        fragments
            .tag_lens
            .push((fragments.tags.len() - tag_start) as u32);

        fragments.sequences.extend_from_slice(record.sequence());
        self.binner
            .apply_into(record.quality(), &mut fragments.qualities);
        fragments.lengths.push(record.len() as u32);

        let kind = match record.plus_line() {
            None => PlusKind::Empty,
            Some(plus) if self.plus_repetition && plus == record.tag() => PlusKind::Repeat,
            Some(plus) => {
                fragments.plus_data.extend_from_slice(plus);
                fragments.plus_lens.push(plus.len() as u32);
                PlusKind::Literal
            }
        };
        fragments.plus_kinds.push(kind);
    }
}

/// Rebuilds records from decoded [`StreamFragments`]
pub struct Joiner;
impl Joiner {
    /// Reassembles the records of block `block` in their original order
    pub fn join(block: u64, fragments: &StreamFragments) -> Result<Vec<Record>> {
        let num_records = fragments.num_records();
        if fragments.tag_lens.len() != num_records || fragments.plus_kinds.len() != num_records {
            return Err(StreamError::Corrupt {
                block,
                kind: StreamKind::Header,
                expected: num_records as u64,
                actual: fragments.tag_lens.len() as u64,
            }
            .into());
        }

        let mut records = Vec::with_capacity(num_records);
        let mut tag_pos = 0;
        let mut seq_pos = 0;
        let mut plus_pos = 0;
        let mut literal_idx = 0;
        for idx in 0..num_records {
            let tag_len = fragments.tag_lens[idx] as usize;
            let seq_len = fragments.lengths[idx] as usize;
            let tag = take(&fragments.tags, tag_pos, tag_len, block, StreamKind::Header)?;
            let sequence = take(
                &fragments.sequences,
                seq_pos,
                seq_len,
                block,
                StreamKind::Sequence,
            )?;
            let quality = take(
                &fragments.qualities,
                seq_pos,
                seq_len,
                block,
                StreamKind::Quality,
            )?;
            tag_pos += tag_len;
            seq_pos += seq_len;

            let plus_line = match fragments.plus_kinds[idx] {
                PlusKind::Empty => None,
                PlusKind::Repeat => Some(tag.to_vec()),
                PlusKind::Literal => {
                    let len = fragments
                        .plus_lens
                        .get(literal_idx)
                        .copied()
                        .ok_or(StreamError::UnexpectedEnd {
                            block,
                            kind: StreamKind::Structure,
                        })? as usize;
                    literal_idx += 1;
                    let plus = take(
                        &fragments.plus_data,
                        plus_pos,
                        len,
                        block,
                        StreamKind::Structure,
                    )?;
                    plus_pos += len;
                    Some(plus.to_vec())
                }
            };

            records.push(Record::new(
                tag.to_vec(),
                sequence.to_vec(),
                quality.to_vec(),
                plus_line,
            ));
        }
        Ok(records)
    }
}

fn take(buf: &[u8], pos: usize, len: usize, block: u64, kind: StreamKind) -> Result<&[u8]> {
    buf.get(pos..pos + len)
        .ok_or_else(|| StreamError::UnexpectedEnd { block, kind }.into())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{QualityMode, SettingsBuilder};

    fn records() -> Vec<Record> {
        vec![
            Record::new(b"r1 a".to_vec(), b"ACGT".to_vec(), b"IIII".to_vec(), None),
            Record::new(
                b"r2 b".to_vec(),
                b"NN".to_vec(),
                b"##".to_vec(),
                Some(b"r2 b".to_vec()),
            ),
            Record::new(
                b"r3 c".to_vec(),
                b"".to_vec(),
                b"".to_vec(),
                Some(b"other".to_vec()),
            ),
        ]
    }

    #[test]
    fn test_split_join() -> Result<()> {
        let settings = SettingsBuilder::default().plus_repetition(true).build()?;
        let splitter = Splitter::new(&settings);
        let mut fragments = StreamFragments::default();
        for record in &records() {
            splitter.push(record, &mut fragments);
        }
        assert_eq!(fragments.num_records(), 3);
        assert_eq!(
            fragments.plus_kinds,
            vec![PlusKind::Empty, PlusKind::Repeat, PlusKind::Literal]
        );
        assert_eq!(fragments.plus_data, b"other");

        let joined = Joiner::join(0, &fragments)?;
        assert_eq!(joined, records());
        Ok(())
    }

    #[test]
    fn test_repeat_requires_flag() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        let splitter = Splitter::new(&settings);
        let mut fragments = StreamFragments::default();
        for record in &records() {
            splitter.push(record, &mut fragments);
        }
        assert_eq!(fragments.plus_kinds[1], PlusKind::Literal);
        assert_eq!(Joiner::join(0, &fragments)?, records());
        Ok(())
    }

    #[test]
    fn test_split_applies_filter_and_binner() -> Result<()> {
        let settings = SettingsBuilder::default()
            .tag_fields(&[1])
            .quality_mode(QualityMode::Binned)
            .build()?;
        let splitter = Splitter::new(&settings);
        let mut fragments = StreamFragments::default();
        splitter.push(&records()[0], &mut fragments);
        assert_eq!(fragments.tags, b"r1");
        assert_eq!(fragments.qualities, &[33 + 40; 4]);
        assert_eq!(fragments.sequences, b"ACGT");
        Ok(())
    }

    #[test]
    fn test_join_detects_short_stream() {
        let mut fragments = StreamFragments::default();
        fragments.lengths.push(4);
        fragments.tag_lens.push(0);
        fragments.plus_kinds.push(PlusKind::Empty);
        fragments.sequences.extend_from_slice(b"ACG");
        assert!(Joiner::join(7, &fragments).is_err());
    }
}
