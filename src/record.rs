use crate::{Result, error::FastqError};

/// A single sequencing read as it moves through the archive.
///
/// The tag is stored without its leading `@` and the plus-line without its
/// leading `+`. A plus-line of `None` is the bare `+` separator.
///
/// # Example
///
/// ```
/// use fqarc::RecordBuilder;
///
/// let record = RecordBuilder::default()
///     .tag(b"read_001 length=8")
///     .sequence(b"ACGTACGT")
///     .quality(b"IIIIFFFF")
///     .build()
///     .unwrap();
/// assert!(record.plus_line().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub(crate) tag: Vec<u8>,
    pub(crate) sequence: Vec<u8>,
    pub(crate) quality: Vec<u8>,
    pub(crate) plus_line: Option<Vec<u8>>,
}

impl Record {
    #[must_use]
    pub fn new(
        tag: Vec<u8>,
        sequence: Vec<u8>,
        quality: Vec<u8>,
        plus_line: Option<Vec<u8>>,
    ) -> Self {
        Self {
            tag,
            sequence,
            quality,
            plus_line,
        }
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    #[inline]
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    #[inline]
    #[must_use]
    pub fn quality(&self) -> &[u8] {
        &self.quality
    }

    /// Returns the plus-line content (without the `+`) if present
    #[inline]
    #[must_use]
    pub fn plus_line(&self) -> Option<&[u8]> {
        self.plus_line.as_deref()
    }

    /// Number of bases in the read
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of payload bytes this record contributes to a block
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.tag.len()
            + self.sequence.len()
            + self.quality.len()
            + self.plus_line.as_ref().map_or(0, Vec::len)
    }

    /// A record is well-formed when its sequence and quality have equal length
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.sequence.len() == self.quality.len()
    }

    /// Validates the record, reporting the record number on failure
    pub fn validate(&self, record: u64) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(FastqError::LengthMismatch {
                record,
                sequence: self.sequence.len(),
                quality: self.quality.len(),
            }
            .into())
        }
    }
}

/// Builder for [`Record`] from borrowed slices
#[derive(Default)]
pub struct RecordBuilder<'a> {
    tag: Option<&'a [u8]>,
    sequence: Option<&'a [u8]>,
    quality: Option<&'a [u8]>,
    plus_line: Option<&'a [u8]>,
}

impl<'a> RecordBuilder<'a> {
    #[must_use]
    pub fn tag(mut self, tag: &'a [u8]) -> Self {
        self.tag = Some(tag);
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: &'a [u8]) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: &'a [u8]) -> Self {
        self.quality = Some(quality);
        self
    }

    #[must_use]
    pub fn plus_line(mut self, plus_line: &'a [u8]) -> Self {
        self.plus_line = Some(plus_line);
        self
    }

    /// Builds the record, rejecting sequence/quality length mismatches
    pub fn build(self) -> Result<Record> {
        let record = Record {
            tag: self.tag.unwrap_or_default().to_vec(),
            sequence: self.sequence.unwrap_or_default().to_vec(),
            quality: self.quality.unwrap_or_default().to_vec(),
            plus_line: self.plus_line.map(<[u8]>::to_vec),
        };
        record.validate(0)?;
        Ok(record)
    }
}
