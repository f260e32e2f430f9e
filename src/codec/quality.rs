//! Quality stream codec
//!
//! Quality bytes are remapped onto the dense alphabet of symbols present in
//! the block and range coded. The coding context depends on the level:
//!
//! - level 0: previous symbol
//! - level 1: two previous symbols
//! - level 2: two previous symbols and a position bin
//!
//! Contexts restart at every read boundary, so the read lengths from the
//! structure stream must be decoded first.

use super::{
    SegmentCodec,
    range::{AdaptiveModel, RangeDecoder, RangeEncoder, decode_symbol, encode_symbol},
    utils::{SegmentReader, write_declared_len, write_varint},
};
use crate::{
    Result,
    error::StreamKind,
    settings::MAX_QUALITY_LEVEL,
    split::StreamFragments,
};

/// Read positions per position bin
const POSITION_BIN_WIDTH: usize = 8;

/// Number of position bins (the last bin is open ended)
const NUM_POSITION_BINS: usize = 16;

const UNALLOCATED: u32 = u32::MAX;

/// Lazily allocated per-context models
struct ContextModels {
    level: u8,
    /// Alphabet size plus the read-start sentinel
    width: usize,
    n_symbols: usize,
    slots: Vec<u32>,
    models: Vec<AdaptiveModel>,
}
impl ContextModels {
    fn new(level: u8, n_symbols: usize) -> Self {
        let width = n_symbols + 1;
        let num_contexts = match level {
            0 => width,
            1 => width * width,
            _ => NUM_POSITION_BINS * width * width,
        };
        Self {
            level,
            width,
            n_symbols,
            slots: vec![UNALLOCATED; num_contexts],
            models: Vec::new(),
        }
    }

    /// The sentinel symbol used before the first base of a read
    fn sentinel(&self) -> usize {
        self.width - 1
    }

    fn context(&self, pos: usize, q1: usize, q2: usize) -> usize {
        match self.level {
            0 => q1,
            1 => q1 * self.width + q2,
            _ => {
                let bin = (pos / POSITION_BIN_WIDTH).min(NUM_POSITION_BINS - 1);
                (bin * self.width + q1) * self.width + q2
            }
        }
    }

    fn model(&mut self, ctx: usize) -> &mut AdaptiveModel {
        let slot = self.slots[ctx];
        let idx = if slot == UNALLOCATED {
            self.slots[ctx] = self.models.len() as u32;
            self.models.push(AdaptiveModel::new(self.n_symbols));
            self.models.len() - 1
        } else {
            slot as usize
        };
        &mut self.models[idx]
    }
}

pub struct QualityCodec {
    level: u8,
}
impl QualityCodec {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self { level }
    }
}

impl SegmentCodec for QualityCodec {
    fn kind(&self) -> StreamKind {
        StreamKind::Quality
    }

    fn encode(&mut self, fragments: &StreamFragments, out: &mut Vec<u8>) -> Result<()> {
        let qualities = &fragments.qualities;
        write_declared_len(out, qualities.len() as u64)?;
        out.push(self.level);

        // dense alphabet of the symbols used by this block
        let mut present = [false; 256];
        for &q in qualities {
            present[q as usize] = true;
        }
        let alphabet: Vec<u8> = (0..=255u8).filter(|&q| present[q as usize]).collect();
        write_varint(out, alphabet.len() as u64);
        out.extend_from_slice(&alphabet);
        if alphabet.is_empty() {
            return Ok(());
        }
        let mut dense = [0usize; 256];
        for (idx, &q) in alphabet.iter().enumerate() {
            dense[q as usize] = idx;
        }

        let mut contexts = ContextModels::new(self.level, alphabet.len());
        let mut enc = RangeEncoder::new();
        let mut offset = 0;
        for &len in &fragments.lengths {
            let read = &qualities[offset..offset + len as usize];
            offset += len as usize;
            let mut q1 = contexts.sentinel();
            let mut q2 = contexts.sentinel();
            for (pos, &q) in read.iter().enumerate() {
                let sym = dense[q as usize];
                let ctx = contexts.context(pos, q1, q2);
                encode_symbol(&mut enc, contexts.model(ctx), sym);
                q2 = q1;
                q1 = sym;
            }
        }
        out.extend_from_slice(&enc.finish());
        Ok(())
    }

    fn decode(
        &mut self,
        block: u64,
        segment: &[u8],
        fragments: &mut StreamFragments,
    ) -> Result<()> {
        let mut reader = SegmentReader::new(block, StreamKind::Quality, segment);
        let declared = reader.read_declared_len()?;
        let level = reader.read_u8()?;
        if level > MAX_QUALITY_LEVEL {
            return Err(reader.invalid("unknown compression level"));
        }
        self.level = level;

        let expected: u64 = fragments.lengths.iter().map(|&l| u64::from(l)).sum();
        reader.check_len(expected, declared)?;

        let n_symbols = reader.read_usize()?;
        if n_symbols > 256 {
            return Err(reader.invalid("alphabet larger than a byte"));
        }
        let alphabet = reader.read_bytes(n_symbols)?;

        let qualities = &mut fragments.qualities;
        qualities.clear();
        if alphabet.is_empty() {
            return reader.check_len(declared, 0);
        }
        qualities.reserve(declared as usize);

        let mut contexts = ContextModels::new(level, alphabet.len());
        let mut dec = RangeDecoder::new(reader.remaining());
        for &len in &fragments.lengths {
            let mut q1 = contexts.sentinel();
            let mut q2 = contexts.sentinel();
            for pos in 0..len as usize {
                let ctx = contexts.context(pos, q1, q2);
                let sym = decode_symbol(&mut dec, contexts.model(ctx));
                qualities.push(alphabet[sym]);
                q2 = q1;
                q1 = sym;
            }
        }
        if dec.overran() {
            return Err(reader.unexpected_end());
        }
        reader.check_len(declared, qualities.len() as u64)
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn fragments(reads: &[&[u8]]) -> StreamFragments {
        let mut fragments = StreamFragments::default();
        for read in reads {
            fragments.qualities.extend_from_slice(read);
            fragments.lengths.push(read.len() as u32);
        }
        fragments
    }

    fn roundtrip(level: u8, reads: &[&[u8]]) -> Result<Vec<u8>> {
        let input = fragments(reads);
        let mut out = Vec::new();
        QualityCodec::new(level).encode(&input, &mut out)?;

        let mut decoded = StreamFragments::default();
        decoded.lengths = input.lengths.clone();
        QualityCodec::new(0).decode(0, &out, &mut decoded)?;
        Ok(decoded.qualities)
    }

    #[test]
    fn test_all_levels() -> Result<()> {
        let reads: Vec<Vec<u8>> = (0..200)
            .map(|r| (0..100).map(|p| 33 + ((r * 7 + p * 3) % 41) as u8).collect())
            .collect();
        let refs: Vec<&[u8]> = reads.iter().map(Vec::as_slice).collect();
        let expected = reads.concat();
        for level in 0..=MAX_QUALITY_LEVEL {
            assert_eq!(roundtrip(level, &refs)?, expected);
        }
        Ok(())
    }

    #[test]
    fn test_variable_lengths_and_empty_reads() -> Result<()> {
        let reads: [&[u8]; 4] = [b"IIII#", b"", b"!", b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"];
        let expected = reads.concat();
        for level in 0..=MAX_QUALITY_LEVEL {
            assert_eq!(roundtrip(level, &reads)?, expected);
        }
        Ok(())
    }

    #[test]
    fn test_empty_block() -> Result<()> {
        assert!(roundtrip(2, &[])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_length_mismatch_is_corrupt() -> Result<()> {
        let input = fragments(&[b"IIII", b"####"]);
        let mut out = Vec::new();
        QualityCodec::new(1).encode(&input, &mut out)?;

        let mut decoded = StreamFragments::default();
        decoded.lengths = vec![4, 3];
        let err = QualityCodec::new(1)
            .decode(0, &out, &mut decoded)
            .unwrap_err();
        assert!(err.is_corrupt_stream());
        Ok(())
    }
}
