mod header;
mod index;

pub use header::{FileHeader, SettingsSnapshot};
pub use index::{BlockEntry, Index, IndexHeader, Trailer};

pub const FILE_MAGIC: &[u8; 7] = b"FQARCHV";
pub const INDEX_MAGIC: &[u8; 8] = b"FQAINDEX";
pub const TRAILER_MAGIC: &[u8; 6] = b"FQAEND";

pub const FORMAT_VERSION: u8 = 1;

/// Byte offset of the first block
pub const HEADER_SIZE: u64 = size_of::<FileHeader>() as u64;
