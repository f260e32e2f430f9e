//! Plain-text FASTQ parsing and serialization
//!
//! Input may be compressed: [`FastqReader::from_path`] detects gzip, bzip2,
//! xz and zstd transparently.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Write},
    path::Path,
};

use crate::{Record, Result, error::FastqError};

type BoxedRead = Box<dyn Read + Send>;

/// A streaming four-line FASTQ parser
///
/// Carriage returns before the line feed are dropped. Blank lines between
/// records are skipped.
pub struct FastqReader<R: BufRead> {
    inner: R,
    line: Vec<u8>,
    /// Number of records parsed so far
    record_count: u64,
}

impl FastqReader<BufReader<BoxedRead>> {
    /// Opens a (possibly compressed) FASTQ file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(Box::new(file))
    }

    /// Wraps a (possibly compressed) reader
    pub fn from_reader(reader: BoxedRead) -> Result<Self> {
        let (inner, _format) = niffler::send::get_reader(reader)?;
        Ok(Self::new(BufReader::new(inner)))
    }
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(256),
            record_count: 0,
        }
    }

    /// Number of records returned so far
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Reads the next line into the internal buffer, returning false at EOF
    fn next_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(false);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        Ok(true)
    }

    fn required_line(&mut self) -> Result<()> {
        if self.next_line()? {
            Ok(())
        } else {
            Err(FastqError::Incomplete {
                record: self.record_count,
            }
            .into())
        }
    }

    /// Parses the next record or returns `None` at end of input
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        // skip blank separator lines
        loop {
            if !self.next_line()? {
                return Ok(None);
            }
            if !self.line.is_empty() {
                break;
            }
        }

        let record = self.record_count;
        if self.line[0] != b'@' {
            return Err(FastqError::MissingMarker {
                record,
                expected: '@',
            }
            .into());
        }
        let tag = self.line[1..].to_vec();

        self.required_line()?;
        let sequence = self.line.clone();

        self.required_line()?;
        if self.line.first() != Some(&b'+') {
            return Err(FastqError::MissingMarker {
                record,
                expected: '+',
            }
            .into());
        }
        let plus_line = (self.line.len() > 1).then(|| self.line[1..].to_vec());

        self.required_line()?;
        let quality = self.line.clone();

        self.record_count += 1;
        Ok(Some(Record::new(tag, sequence, quality, plus_line)))
    }
}

impl<R: BufRead> Iterator for FastqReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Writes a record as four FASTQ lines
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(record.tag())?;
    writer.write_all(b"\n")?;
    writer.write_all(record.sequence())?;
    writer.write_all(b"\n+")?;
    if let Some(plus) = record.plus_line() {
        writer.write_all(plus)?;
    }
    writer.write_all(b"\n")?;
    writer.write_all(record.quality())?;
    writer.write_all(b"\n")
}
