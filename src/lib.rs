//! # fqarc
//!
//! A block-parallel compressor for FASTQ sequencing reads.
//!
//! Records are split into four streams (tags, nucleotides, qualities and
//! read structure) which are modeled and coded independently per block. Blocks
//! are encoded on a worker pool and written in their original order to a
//! single archive file with a trailing index for random block access.
//!
//! ## Features
//!
//! - Context-model range coding of nucleotides and quality values with
//!   selectable levels
//! - Field-wise delta coding of read tags
//! - Optional lossy quality binning and tag field filtering
//! - Memory-mapped archive reading with per-block random access
//! - Transparent gzip, bzip2, xz and zstd FASTQ input, from files or streams
//! - Detection of the quality offset and color-space reads from the input
//!
//! ## Example
//!
//! ```no_run
//! use fqarc::{CompressSession, DecompressSession, Record, SettingsBuilder};
//!
//! # fn main() -> fqarc::Result<()> {
//! let settings = SettingsBuilder::default()
//!     .dna_level(2)
//!     .quality_level(1)
//!     .threads(4)
//!     .build()?;
//!
//! let mut session = CompressSession::start("reads.fqa", settings)?;
//! let record = Record::new(b"read1".to_vec(), b"ACGT".to_vec(), b"IIII".to_vec(), None);
//! session.write_next_record(&record)?;
//! let summary = session.finish()?;
//! assert_eq!(summary.records, 1);
//!
//! let mut session = DecompressSession::start("reads.fqa", 4)?;
//! while let Some(record) = session.read_next_record()? {
//!     println!("{}", String::from_utf8_lossy(record.tag()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyze;
pub mod archive;
pub mod binning;
pub mod block;
pub mod codec;
pub mod error;
pub mod fastq;
pub mod filter;
pub mod pipeline;
mod record;
pub mod session;
pub mod settings;
pub mod split;

pub use error::{Error, IntoFqarcError, Result};
pub use fastq::FastqReader;
pub use filter::FieldMask;
pub use record::{Record, RecordBuilder};
pub use session::{
    ArchiveSummary, CompressSession, DecompressSession, compress, compress_reader, decompress,
    decompress_writer,
};
pub use settings::{Alphabet, CompressionSettings, QualityMode, SettingsBuilder};
