use std::{fmt, io};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use zstd::zstd_safe;

use crate::{
    Error, Result,
    error::{StreamError, StreamKind},
    settings::MAX_BUFFER_SIZE,
};

/// Compression level used for the zstd residual columns
pub(crate) const ZSTD_LEVEL: i32 = 3;

/// Upper bound on the decoded size of a single column
pub(crate) const MAX_COLUMN_LEN: u64 = 4 * MAX_BUFFER_SIZE;

/// Appends `value` as an LEB128 varint
#[inline]
pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

#[inline]
pub(crate) fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub(crate) fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Compresses `src` into `dst`, replacing its content
pub(crate) fn sized_compress(
    dst: &mut Vec<u8>,
    src: &[u8],
    cctx: &mut zstd_safe::CCtx,
) -> Result<()> {
    dst.clear();
    dst.reserve(zstd_safe::compress_bound(src.len()));
    cctx.compress(dst, src, ZSTD_LEVEL)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
    Ok(())
}

/// Writes self-describing zstd columns into a segment
pub(crate) struct ColumnCompressor {
    cctx: zstd_safe::CCtx<'static>,
    zbuf: Vec<u8>,
}
impl ColumnCompressor {
    pub(crate) fn new() -> Self {
        Self {
            cctx: zstd_safe::CCtx::create(),
            zbuf: Vec::default(),
        }
    }

    /// Appends `[raw len][compressed len][compressed bytes]` to `out`
    pub(crate) fn write_column(&mut self, src: &[u8], out: &mut Vec<u8>) -> Result<()> {
        sized_compress(&mut self.zbuf, src, &mut self.cctx)?;
        write_varint(out, src.len() as u64);
        write_varint(out, self.zbuf.len() as u64);
        out.extend_from_slice(&self.zbuf);
        Ok(())
    }
}
impl Clone for ColumnCompressor {
    /// A clone gets its own compression context
    fn clone(&self) -> Self {
        Self::new()
    }
}
impl fmt::Debug for ColumnCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnCompressor").finish_non_exhaustive()
    }
}

/// Writes the declared decoded length that opens every segment
pub(crate) fn write_declared_len(out: &mut Vec<u8>, len: u64) -> Result<()> {
    out.write_u64::<LittleEndian>(len)?;
    Ok(())
}

/// Cursor over the bytes of one stream segment
pub(crate) struct SegmentReader<'a> {
    block: u64,
    kind: StreamKind,
    buf: &'a [u8],
    pos: usize,
}
impl<'a> SegmentReader<'a> {
    pub(crate) fn new(block: u64, kind: StreamKind, buf: &'a [u8]) -> Self {
        Self {
            block,
            kind,
            buf,
            pos: 0,
        }
    }

    pub(crate) fn unexpected_end(&self) -> Error {
        StreamError::UnexpectedEnd {
            block: self.block,
            kind: self.kind,
        }
        .into()
    }

    pub(crate) fn invalid(&self, reason: &'static str) -> Error {
        StreamError::Invalid {
            block: self.block,
            kind: self.kind,
            reason,
        }
        .into()
    }

    /// Fails with a corrupt stream error unless `actual == expected`
    pub(crate) fn check_len(&self, expected: u64, actual: u64) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(StreamError::Corrupt {
                block: self.block,
                kind: self.kind,
                expected,
                actual,
            }
            .into())
        }
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| self.unexpected_end())?;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| self.unexpected_end())?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads the declared decoded length of the segment
    pub(crate) fn read_declared_len(&mut self) -> Result<u64> {
        let declared = LittleEndian::read_u64(self.read_bytes(8)?);
        if declared > MAX_COLUMN_LEN {
            return Err(self.invalid("declared length exceeds block limit"));
        }
        Ok(declared)
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            // the tenth byte may only carry the top bit of a u64
            if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
                return Err(self.invalid("varint overflow"));
            }
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize> {
        usize::try_from(self.read_varint()?).map_err(|_| self.invalid("length overflow"))
    }

    /// Reads and decompresses a column written by [`ColumnCompressor::write_column`]
    pub(crate) fn read_column(&mut self) -> Result<Vec<u8>> {
        let raw_len = self.read_usize()?;
        if raw_len as u64 > MAX_COLUMN_LEN {
            return Err(self.invalid("column length exceeds block limit"));
        }
        let z_len = self.read_usize()?;
        let zbytes = self.read_bytes(z_len)?;
        let column = zstd::bulk::decompress(zbytes, raw_len)
            .map_err(|_| self.invalid("zstd column failed to decompress"))?;
        self.check_len(raw_len as u64, column.len() as u64)?;
        Ok(column)
    }

    /// The unread remainder of the segment
    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
