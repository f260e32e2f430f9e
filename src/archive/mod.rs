//! # Archive container
//!
//! An archive is a [`FileHeader`] followed by the encoded blocks, a block
//! index and a fixed-size [`Trailer`]. All integers are little endian.
//!
//! ```text
//! ┌───────────────────┐
//! │    File Header    │ 64 bytes
//! ├───────────────────┤
//! │  Header Segment   │
//! │ Sequence Segment  │ Block 0
//! │  Quality Segment  │
//! │ Structure Segment │
//! ├───────────────────┤
//! │       ...         │ More blocks
//! ├───────────────────┤
//! │   Index Header    │ 16 bytes
//! ├───────────────────┤
//! │   Block Entries   │ 88 bytes each
//! ├───────────────────┤
//! │      Trailer      │ 32 bytes
//! └───────────────────┘
//! ```
//!
//! The file header carries a snapshot of the compression settings. Each
//! [`BlockEntry`] records the offsets and lengths of the block's four
//! segments, its record count and (optionally) the CRC32 of its decoded
//! content. The trailer points at the index and holds a CRC32 of every byte
//! before it.
//!
//! The index and trailer are written only when compression finishes, so an
//! interrupted archive is reported as truncated when reopened.

mod core;
mod read;
mod write;

pub use self::core::{
    BlockEntry, FILE_MAGIC, FORMAT_VERSION, FileHeader, HEADER_SIZE, INDEX_MAGIC, Index,
    IndexHeader, SettingsSnapshot, TRAILER_MAGIC, Trailer,
};
pub use read::ArchiveReader;
pub use write::ArchiveWriter;
