//! Sequence stream codec
//!
//! Bytes are mapped to four symbol classes (`ACGT`, or `0123` in color space).
//! Anything else (`N`, lowercase, primer bases) is an exception stored as a
//! `(delta position, byte)` pair and removed from the symbol stream.
//!
//! Level 0 packs the symbols two bits each and compresses the words with
//! zstd. Levels 1 to 3 drive a range coder with an order-k nucleotide context
//! (k = 6, 8, 10). The context table is owned by the codec and reset at the
//! start of every block, so a codec reused across blocks allocates it once.

use byteorder::{ByteOrder, LittleEndian};

use super::{
    SegmentCodec,
    range::{NucleotideModel, RangeDecoder, RangeEncoder, decode_symbol, encode_symbol},
    utils::{ColumnCompressor, SegmentReader, write_declared_len, write_varint},
};
use crate::{
    Result,
    error::StreamKind,
    settings::{Alphabet, MAX_DNA_LEVEL},
    split::StreamFragments,
};

/// Context order used by each range-coded level
const CONTEXT_ORDER: [u32; 3] = [6, 8, 10];

/// Marks a byte that has no symbol class
const EXCEPTION: u8 = 4;

/// Canonical letters handed to the 2-bit packer
const PACKED_LETTERS: &[u8; 4] = b"ACGT";

fn class_table(alphabet: Alphabet) -> ([u8; 256], &'static [u8; 4]) {
    let letters: &'static [u8; 4] = match alphabet {
        Alphabet::Nucleotide => b"ACGT",
        Alphabet::ColorSpace => b"0123",
    };
    let mut table = [EXCEPTION; 256];
    for (class, &letter) in letters.iter().enumerate() {
        table[letter as usize] = class as u8;
    }
    (table, letters)
}

#[derive(Debug, Clone)]
pub struct DnaCodec {
    level: u8,
    classes: [u8; 256],
    letters: &'static [u8; 4],
    columns: ColumnCompressor,
    models: Vec<NucleotideModel>,
}
impl DnaCodec {
    #[must_use]
    pub fn new(level: u8, alphabet: Alphabet) -> Self {
        let (classes, letters) = class_table(alphabet);
        Self {
            level,
            classes,
            letters,
            columns: ColumnCompressor::new(),
            models: Vec::new(),
        }
    }

    /// Resets the context table for `level`, returning the context mask
    fn reset_models(&mut self, level: u8) -> usize {
        let order = CONTEXT_ORDER[level as usize - 1];
        let mask = (1usize << (2 * order)) - 1;
        self.models.clear();
        self.models.resize(mask + 1, NucleotideModel::default());
        mask
    }

    /// Splits the sequence column into symbol classes and exceptions
    fn classify(&self, sequences: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut symbols = Vec::with_capacity(sequences.len());
        let mut exceptions = Vec::new();
        let mut last_pos = 0;
        let mut count = 0u64;
        let mut pairs = Vec::new();
        for (pos, &byte) in sequences.iter().enumerate() {
            let class = self.classes[byte as usize];
            if class == EXCEPTION {
                write_varint(&mut pairs, (pos - last_pos) as u64);
                pairs.push(byte);
                last_pos = pos;
                count += 1;
            } else {
                symbols.push(class);
            }
        }
        write_varint(&mut exceptions, count);
        exceptions.extend_from_slice(&pairs);
        (symbols, exceptions)
    }

    fn encode_packed(&mut self, symbols: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if symbols.is_empty() {
            return self.columns.write_column(&[], out);
        }
        let letters: Vec<u8> = symbols.iter().map(|&c| PACKED_LETTERS[c as usize]).collect();
        let mut words = Vec::with_capacity(letters.len().div_ceil(32));
        bitnuc::encode(&letters, &mut words)?;
        let words = &words[words.len() - letters.len().div_ceil(32)..];

        let mut bytes = vec![0u8; words.len() * 8];
        LittleEndian::write_u64_into(words, &mut bytes);
        self.columns.write_column(&bytes, out)
    }

    fn encode_context(&mut self, symbols: &[u8], out: &mut Vec<u8>) {
        let mask = self.reset_models(self.level);
        let mut enc = RangeEncoder::new();
        let mut ctx = 0usize;
        for &sym in symbols {
            let sym = sym as usize;
            encode_symbol(&mut enc, &mut self.models[ctx], sym);
            ctx = ((ctx << 2) | sym) & mask;
        }
        out.extend_from_slice(&enc.finish());
    }

    fn decode_packed(reader: &mut SegmentReader, num_symbols: usize) -> Result<Vec<u8>> {
        let bytes = reader.read_column()?;
        reader.check_len((num_symbols.div_ceil(32) * 8) as u64, bytes.len() as u64)?;
        if num_symbols == 0 {
            return Ok(Vec::new());
        }
        let mut words = vec![0u64; bytes.len() / 8];
        LittleEndian::read_u64_into(&bytes, &mut words);

        let mut letters = Vec::with_capacity(num_symbols);
        bitnuc::decode(&words, num_symbols, &mut letters)?;
        let letters = &letters[letters.len() - num_symbols..];
        Ok(letters
            .iter()
            .map(|&l| match l {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                _ => 3,
            })
            .collect())
    }

    fn decode_context(
        &mut self,
        level: u8,
        reader: &SegmentReader,
        num_symbols: usize,
    ) -> Result<Vec<u8>> {
        let mask = self.reset_models(level);
        let mut dec = RangeDecoder::new(reader.remaining());
        let mut ctx = 0usize;
        let mut symbols = Vec::with_capacity(num_symbols);
        for _ in 0..num_symbols {
            let sym = decode_symbol(&mut dec, &mut self.models[ctx]);
            symbols.push(sym as u8);
            ctx = ((ctx << 2) | sym) & mask;
        }
        if dec.overran() {
            return Err(reader.unexpected_end());
        }
        Ok(symbols)
    }
}

impl SegmentCodec for DnaCodec {
    fn kind(&self) -> StreamKind {
        StreamKind::Sequence
    }

    fn encode(&mut self, fragments: &StreamFragments, out: &mut Vec<u8>) -> Result<()> {
        write_declared_len(out, fragments.sequences.len() as u64)?;
        out.push(self.level);

        let (symbols, exceptions) = self.classify(&fragments.sequences);
        self.columns.write_column(&exceptions, out)?;
        write_varint(out, symbols.len() as u64);
        if self.level == 0 {
            self.encode_packed(&symbols, out)
        } else {
            self.encode_context(&symbols, out);
            Ok(())
        }
    }

    fn decode(
        &mut self,
        block: u64,
        segment: &[u8],
        fragments: &mut StreamFragments,
    ) -> Result<()> {
        let mut reader = SegmentReader::new(block, StreamKind::Sequence, segment);
        let declared = reader.read_declared_len()?;
        let level = reader.read_u8()?;
        if level > MAX_DNA_LEVEL {
            return Err(reader.invalid("unknown compression level"));
        }

        let exceptions = reader.read_column()?;
        let num_symbols = reader.read_usize()?;
        if num_symbols as u64 > declared {
            return Err(reader.invalid("more symbols than declared bases"));
        }
        let symbols = if level == 0 {
            Self::decode_packed(&mut reader, num_symbols)?
        } else {
            self.decode_context(level, &reader, num_symbols)?
        };

        // merge symbols and exceptions back into the sequence column
        let mut exc = SegmentReader::new(block, StreamKind::Sequence, &exceptions);
        let num_exceptions = exc.read_varint()?;
        let sequences = &mut fragments.sequences;
        sequences.clear();
        sequences.reserve(num_symbols);
        let mut symbols = symbols.into_iter();
        let mut pos = 0usize;
        for idx in 0..num_exceptions {
            let delta = exc.read_usize()?;
            let byte = exc.read_u8()?;
            pos = if idx == 0 { delta } else { pos + delta };
            if pos < sequences.len() {
                return Err(reader.invalid("exception positions out of order"));
            }
            while sequences.len() < pos {
                let Some(class) = symbols.next() else {
                    return Err(reader.unexpected_end());
                };
                sequences.push(self.letters[class as usize]);
            }
            sequences.push(byte);
        }
        sequences.extend(symbols.map(|class| self.letters[class as usize]));

        reader.check_len(declared, sequences.len() as u64)
    }
}
