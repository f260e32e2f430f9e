//! Header stream codec
//!
//! Each tag is tokenized like the field filter and coded against the previous
//! tag of the same block. When both have the same number of tokens the tag is
//! coded field by field; otherwise it is stored raw. The resulting op stream
//! is compressed with zstd.

use super::{
    SegmentCodec,
    utils::{
        ColumnCompressor, SegmentReader, unzigzag, write_declared_len, write_varint, zigzag,
    },
};
use crate::{
    Result,
    error::StreamKind,
    filter::{Token, tokenize},
    split::StreamFragments,
};

/// The tag is stored verbatim
const TAG_RAW: u8 = 0;
/// The tag is stored field by field against the previous tag
const TAG_FIELDS: u8 = 1;

/// Field and separator equal the previous tag
const FIELD_SAME: u8 = 0;
/// Numeric field stored as a delta against the previous tag
const FIELD_DELTA: u8 = 1;
/// Field stored verbatim
const FIELD_LITERAL: u8 = 2;

/// Longest digit run treated as a number
const MAX_NUMERIC_DIGITS: usize = 18;

/// Parses a canonical decimal field (no sign, no leading zeros)
fn parse_numeric(field: &[u8]) -> Option<u64> {
    if field.is_empty()
        || field.len() > MAX_NUMERIC_DIGITS
        || (field.len() > 1 && field[0] == b'0')
        || !field.iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    Some(
        field
            .iter()
            .fold(0u64, |acc, &d| acc * 10 + u64::from(d - b'0')),
    )
}

#[inline]
fn separator_byte(separator: Option<u8>) -> u8 {
    separator.unwrap_or(0)
}

pub struct HeaderCodec {
    columns: ColumnCompressor,
}
impl Default for HeaderCodec {
    fn default() -> Self {
        Self {
            columns: ColumnCompressor::new(),
        }
    }
}
impl HeaderCodec {
    fn encode_fields(ops: &mut Vec<u8>, prev: &[Token], tokens: &[Token]) {
        ops.push(TAG_FIELDS);
        for (prev, token) in prev.iter().zip(tokens) {
            if prev == token {
                ops.push(FIELD_SAME);
                continue;
            }
            if prev.separator == token.separator {
                if let (Some(a), Some(b)) = (parse_numeric(prev.field), parse_numeric(token.field))
                {
                    ops.push(FIELD_DELTA);
                    write_varint(ops, zigzag(b as i64 - a as i64));
                    continue;
                }
            }
            ops.push(FIELD_LITERAL);
            write_varint(ops, token.field.len() as u64);
            ops.extend_from_slice(token.field);
            ops.push(separator_byte(token.separator));
        }
    }

    fn decode_fields(
        reader: &mut SegmentReader,
        prev: &[u8],
        tags: &mut Vec<u8>,
        itoa_buf: &mut itoa::Buffer,
    ) -> Result<()> {
        for token in tokenize(prev) {
            match reader.read_u8()? {
                FIELD_SAME => {
                    tags.extend_from_slice(token.field);
                    if let Some(sep) = token.separator {
                        tags.push(sep);
                    }
                }
                FIELD_DELTA => {
                    let base = parse_numeric(token.field)
                        .ok_or_else(|| reader.invalid("delta against a non-numeric field"))?;
                    let delta = unzigzag(reader.read_varint()?);
                    let value = (base as i64)
                        .checked_add(delta)
                        .filter(|v| *v >= 0)
                        .ok_or_else(|| reader.invalid("numeric field out of range"))?;
                    tags.extend_from_slice(itoa_buf.format(value).as_bytes());
                    if let Some(sep) = token.separator {
                        tags.push(sep);
                    }
                }
                FIELD_LITERAL => {
                    let len = reader.read_usize()?;
                    tags.extend_from_slice(reader.read_bytes(len)?);
                    match reader.read_u8()? {
                        0 => {}
                        sep => tags.push(sep),
                    }
                }
                _ => return Err(reader.invalid("unknown field op")),
            }
        }
        Ok(())
    }
}

impl SegmentCodec for HeaderCodec {
    fn kind(&self) -> StreamKind {
        StreamKind::Header
    }

    fn encode(&mut self, fragments: &StreamFragments, out: &mut Vec<u8>) -> Result<()> {
        write_declared_len(out, fragments.tags.len() as u64)?;
        write_varint(out, fragments.tag_lens.len() as u64);

        let mut ops = Vec::with_capacity(fragments.tags.len() / 2);
        let mut prev_tokens: Vec<Token> = Vec::new();
        let mut tokens: Vec<Token> = Vec::new();
        let mut offset = 0;
        for &len in &fragments.tag_lens {
            let tag = &fragments.tags[offset..offset + len as usize];
            offset += len as usize;

            tokens.clear();
            tokens.extend(tokenize(tag));
            if !prev_tokens.is_empty() && prev_tokens.len() == tokens.len() {
                Self::encode_fields(&mut ops, &prev_tokens, &tokens);
            } else {
                ops.push(TAG_RAW);
                write_varint(&mut ops, tag.len() as u64);
                ops.extend_from_slice(tag);
            }
            std::mem::swap(&mut prev_tokens, &mut tokens);
        }
        self.columns.write_column(&ops, out)
    }

    fn decode(
        &mut self,
        block: u64,
        segment: &[u8],
        fragments: &mut StreamFragments,
    ) -> Result<()> {
        let mut reader = SegmentReader::new(block, StreamKind::Header, segment);
        let declared = reader.read_declared_len()?;
        let num_tags = reader.read_varint()?;
        reader.check_len(fragments.num_records() as u64, num_tags)?;

        let ops = reader.read_column()?;
        let mut ops = SegmentReader::new(block, StreamKind::Header, &ops);
        let mut itoa_buf = itoa::Buffer::new();

        let tags = &mut fragments.tags;
        let tag_lens = &mut fragments.tag_lens;
        tags.clear();
        tag_lens.clear();
        let mut prev_start = 0;
        for _ in 0..num_tags {
            let start = tags.len();
            match ops.read_u8()? {
                TAG_RAW => {
                    let len = ops.read_usize()?;
                    tags.extend_from_slice(ops.read_bytes(len)?);
                }
                TAG_FIELDS if !tag_lens.is_empty() => {
                    // the previous tag is copied out of `tags` before it grows
                    let prev = tags[prev_start..start].to_vec();
                    Self::decode_fields(&mut ops, &prev, tags, &mut itoa_buf)?;
                }
                _ => return Err(ops.invalid("unknown tag op")),
            }
            tag_lens.push((tags.len() - start) as u32);
            prev_start = start;
        }
        reader.check_len(declared, tags.len() as u64)
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn fragments(tags: &[&[u8]]) -> StreamFragments {
        let mut fragments = StreamFragments::default();
        for tag in tags {
            fragments.tags.extend_from_slice(tag);
            fragments.tag_lens.push(tag.len() as u32);
            fragments.lengths.push(0);
        }
        fragments
    }

    fn roundtrip(tags: &[&[u8]]) -> Result<(StreamFragments, usize)> {
        let input = fragments(tags);
        let mut out = Vec::new();
        HeaderCodec::default().encode(&input, &mut out)?;

        let mut decoded = StreamFragments::default();
        decoded.lengths = input.lengths.clone();
        HeaderCodec::default().decode(0, &out, &mut decoded)?;
        assert_eq!(decoded.tags, input.tags);
        assert_eq!(decoded.tag_lens, input.tag_lens);
        Ok((decoded, out.len()))
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(b"0"), Some(0));
        assert_eq!(parse_numeric(b"12345"), Some(12345));
        assert_eq!(parse_numeric(b"007"), None);
        assert_eq!(parse_numeric(b"12a"), None);
        assert_eq!(parse_numeric(b""), None);
        assert_eq!(parse_numeric(b"1234567890123456789"), None);
    }

    #[test]
    fn test_illumina_tags() -> Result<()> {
        let tags: Vec<Vec<u8>> = (0..500)
            .map(|i| {
                let (x, y) = (1000 + i * 3, 20_000 - i);
                format!("SRR062634.{} HWI-ST:7:1101:{x}:{y}/1", i + 1).into_bytes()
            })
            .collect();
        let refs: Vec<&[u8]> = tags.iter().map(Vec::as_slice).collect();
        let (_, size) = roundtrip(&refs)?;
        assert!(size < tags.concat().len() / 4);
        Ok(())
    }

    #[test]
    fn test_mixed_shapes() -> Result<()> {
        roundtrip(&[
            b"read1",
            b"read2 extra",
            b"",
            b"x.007",
            b"x.008",
            b"x.9",
            b"x.10",
            b"trailing:",
            b"trailing:",
            b"a-1",
            b"a-0",
        ])?;
        Ok(())
    }

    #[test]
    fn test_empty() -> Result<()> {
        let (decoded, _) = roundtrip(&[])?;
        assert!(decoded.tags.is_empty());
        Ok(())
    }

    #[test]
    fn test_record_count_mismatch() -> Result<()> {
        let input = fragments(&[b"r1", b"r2"]);
        let mut out = Vec::new();
        HeaderCodec::default().encode(&input, &mut out)?;
        let mut decoded = StreamFragments::default();
        decoded.lengths = vec![0; 3];
        let err = HeaderCodec::default()
            .decode(0, &out, &mut decoded)
            .unwrap_err();
        assert!(err.is_corrupt_stream());
        Ok(())
    }
}
