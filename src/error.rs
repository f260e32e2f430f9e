use std::error::Error as StdError;
use std::fmt;

/// Custom Result type for fqarc operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the fqarc library, encompassing all possible error cases
/// that can occur while compressing or decompressing archives.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid compression settings
    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    /// Errors raised while filtering a record tag
    #[error("Error processing tag: {0}")]
    TagError(#[from] TagError),

    /// A stream segment failed to decode
    #[error("Error decoding stream: {0}")]
    StreamError(#[from] StreamError),

    /// Errors related to the archive container
    #[error("Error processing archive: {0}")]
    ArchiveError(#[from] ArchiveError),

    /// Errors raised while parsing FASTQ input
    #[error("Error parsing FASTQ: {0}")]
    FastqError(#[from] FastqError),

    /// Errors raised by the block pipeline
    #[error("Error in block pipeline: {0}")]
    PipelineError(#[from] PipelineError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// Errors from compressed input detection
    #[error("Error detecting input compression: {0}")]
    NifflerError(#[from] niffler::Error),

    /// Errors from the bitnuc dependency for nucleotide packing
    #[error("Bitnuc error: {0}")]
    BitnucError(#[from] bitnuc::NucleotideError),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error is a truncated archive
    ///
    /// This is the error reported for archives whose index was never written,
    /// e.g. after an aborted compression.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::ArchiveError(ArchiveError::Truncated { .. }))
    }

    /// Checks if the error is a corrupt stream segment
    #[must_use]
    pub fn is_corrupt_stream(&self) -> bool {
        matches!(self, Self::StreamError(StreamError::Corrupt { .. }))
    }
}

/// Rejected compression settings
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DNA compression level must be in [0, 3], found {0}")]
    InvalidDnaLevel(u8),

    #[error("Quality compression level must be in [0, 2], found {0}")]
    InvalidQualityLevel(u8),

    #[error("Buffer size must be in [1, {max}] bytes, found {found}")]
    InvalidBufferSize { found: u64, max: u64 },

    #[error("Thread count must be greater than zero")]
    InvalidThreadCount,

    #[error("Quality offset must be 33 or 64, found {0}")]
    InvalidQualityOffset(u8),

    #[error("Tag field positions must be in [1, 64], found {0}")]
    InvalidFieldPosition(usize),
}

/// Problems with a single record tag
///
/// These never abort an archive: the field filter falls back to the
/// unfiltered tag for the affected record.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TagError {
    #[error("Tag has {found} fields but the field mask requires at least {required}")]
    Malformed { found: usize, required: usize },
}

/// Identifies one of the four streams of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Header,
    Sequence,
    Quality,
    Structure,
}
impl StreamKind {
    /// All stream kinds in their on-disk order
    pub const ALL: [Self; 4] = [Self::Header, Self::Sequence, Self::Quality, Self::Structure];

    /// Position of the stream within a block
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}
impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::Sequence => "sequence",
            Self::Quality => "quality",
            Self::Structure => "structure",
        };
        f.write_str(name)
    }
}

/// A stream segment could not be decoded
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The decoded length disagrees with the length declared by the segment
    #[error(
        "Corrupt {kind} stream in block {block}: expected {expected} decoded bytes, found {actual}"
    )]
    Corrupt {
        block: u64,
        kind: StreamKind,
        expected: u64,
        actual: u64,
    },

    /// The segment ended before its declared content
    #[error("Unexpected end of {kind} stream in block {block}")]
    UnexpectedEnd { block: u64, kind: StreamKind },

    /// The segment content is not a valid encoding
    #[error("Invalid {kind} stream in block {block}: {reason}")]
    Invalid {
        block: u64,
        kind: StreamKind,
        reason: &'static str,
    },

    /// The decoded block content does not match its recorded checksum
    #[error("Block {block} checksum mismatch: expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch {
        block: u64,
        expected: u32,
        actual: u32,
    },
}

/// Errors related to the archive container
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    /// The file does not start with the archive magic
    #[error("Not an fqarc archive: invalid magic {0:?}")]
    InvalidMagic([u8; 7]),

    /// The archive was written by an incompatible format version
    #[error("Unsupported archive format version: {found} (expected {expected})")]
    FormatVersion { found: u8, expected: u8 },

    /// The archive ends before its index or segments are complete
    #[error("Archive is truncated or was never finalized: {reason}")]
    Truncated { reason: &'static str },

    /// The file checksum in the trailer does not match the archive content
    #[error("Archive checksum mismatch: expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The index entries are out of order or overlap
    #[error("Invalid block index entry for block {0}")]
    InvalidIndex(u64),

    /// The settings snapshot in the file header holds an unknown value
    #[error("Invalid settings snapshot in file header: {0}")]
    InvalidSettings(&'static str),

    /// Requested a block beyond the end of the index
    #[error("Requested block ({requested}) is out of range ({num_blocks} blocks)")]
    BlockOutOfRange { requested: u64, num_blocks: u64 },

    /// Blocks reached the writer out of sequence
    #[error("Block {found} written out of order (expected {expected})")]
    OutOfOrderBlock { found: u64, expected: u64 },
}

/// Errors that can occur while parsing FASTQ text
#[derive(thiserror::Error, Debug)]
pub enum FastqError {
    #[error("Record {record}: expected '{expected}' at start of line")]
    MissingMarker { record: u64, expected: char },

    #[error("Record {record}: unexpected end of input")]
    Incomplete { record: u64 },

    #[error("Record {record}: sequence length ({sequence}) does not match quality length ({quality})")]
    LengthMismatch {
        record: u64,
        sequence: usize,
        quality: usize,
    },
}

/// Errors raised by the block pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline was aborted")]
    Aborted,

    #[error("Worker panicked while processing block {0}")]
    WorkerPanic(u64),
}

/// Conversion trait for third-party errors that have no dedicated variant
pub trait IntoFqarcError {
    fn into_fqarc_error(self) -> Error;
}

impl<E> IntoFqarcError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_fqarc_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("custom codec failure")]
    struct CustomError;

    #[test]
    fn test_bitnuc_error() {
        let mut words = Vec::new();
        let err: Error = bitnuc::encode(b"ACGX", &mut words)
            .map_err(Error::from)
            .unwrap_err();
        assert!(matches!(err, Error::BitnucError(_)));
        assert!(err.to_string().starts_with("Bitnuc error: "));
    }

    #[test]
    fn test_into_fqarc_error() {
        let error = CustomError.into_fqarc_error();
        assert!(matches!(error, Error::GenericError(_)));
        assert_eq!(error.to_string(), "Generic error: custom codec failure");
    }

    #[test]
    fn test_is_truncated() {
        let error: Error = ArchiveError::Truncated {
            reason: "missing trailer",
        }
        .into();
        assert!(error.is_truncated());
        assert!(!error.is_corrupt_stream());

        let error: Error = ArchiveError::FormatVersion {
            found: 9,
            expected: 1,
        }
        .into();
        assert!(!error.is_truncated());
    }

    #[test]
    fn test_corrupt_stream_message() {
        let error: Error = StreamError::Corrupt {
            block: 3,
            kind: StreamKind::Quality,
            expected: 100,
            actual: 90,
        }
        .into();
        assert!(error.is_corrupt_stream());
        let message = error.to_string();
        assert!(message.contains("quality stream in block 3"));
        assert!(message.contains("expected 100"));
    }

    #[test]
    fn test_stream_kind_order() {
        for (idx, kind) in StreamKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), idx);
        }
    }
}
