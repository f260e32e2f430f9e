//! # Stream codecs
//!
//! Every block is stored as four independently coded segments, one per
//! [`StreamKind`]. Each segment opens with the little-endian `u64` length of
//! its decoded content; decoders reject a segment whose content disagrees with
//! that declaration.
//!
//! ```text
//! [header segment][sequence segment][quality segment][structure segment]
//! ```
//!
//! The structure segment carries the record count and read lengths that the
//! other decoders depend on, so it is always decoded first.

mod dna;
mod header;
mod quality;
mod range;
mod structure;
pub(crate) mod utils;

use auto_impl::auto_impl;
use tracing::trace;

pub use dna::DnaCodec;
pub use header::HeaderCodec;
pub use quality::QualityCodec;
pub use structure::StructureCodec;

pub use crate::error::StreamKind;
use crate::{
    Record, Result,
    block::RawBlock,
    error::StreamError,
    settings::CompressionSettings,
    split::{Joiner, StreamFragments},
};

/// A codec for one stream of a block
#[auto_impl(&mut, Box)]
pub trait SegmentCodec {
    /// The stream this codec handles
    fn kind(&self) -> StreamKind;

    /// Appends the encoded segment for `fragments` to `out`
    fn encode(&mut self, fragments: &StreamFragments, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes `segment` into the matching columns of `fragments`
    fn decode(&mut self, block: u64, segment: &[u8], fragments: &mut StreamFragments)
    -> Result<()>;
}

impl StreamFragments {
    /// Uncompressed size of the content carried by one stream
    #[must_use]
    pub fn stream_size(&self, kind: StreamKind) -> u64 {
        let size = match kind {
            StreamKind::Header => self.tags.len(),
            StreamKind::Sequence => self.sequences.len(),
            StreamKind::Quality => self.qualities.len(),
            StreamKind::Structure => {
                4 * self.lengths.len() + self.plus_kinds.len() + self.plus_data.len()
            }
        };
        size as u64
    }
}

/// A block after encoding, ready to be appended to an archive
#[derive(Debug, Clone, Default)]
pub struct EncodedBlock {
    pub id: u64,
    pub record_count: u64,
    /// Segments in [`StreamKind::ALL`] order
    pub segments: [Vec<u8>; 4],
    /// CRC32 of the decoded block content (0 when disabled)
    pub checksum: u32,
    /// Uncompressed size of each stream
    pub raw_sizes: [u64; 4],
}
impl EncodedBlock {
    #[must_use]
    pub fn segment(&self, kind: StreamKind) -> &[u8] {
        &self.segments[kind.index()]
    }

    /// Total encoded size of the block in bytes
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        self.segments.iter().map(|s| s.len() as u64).sum()
    }
}

/// Raw and compressed byte counts per stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    raw: [u64; 4],
    compressed: [u64; 4],
}
impl StreamStats {
    pub fn add(&mut self, block: &EncodedBlock) {
        for kind in StreamKind::ALL {
            self.raw[kind.index()] += block.raw_sizes[kind.index()];
            self.compressed[kind.index()] += block.segment(kind).len() as u64;
        }
    }

    #[must_use]
    pub fn raw_bytes(&self, kind: StreamKind) -> u64 {
        self.raw[kind.index()]
    }

    #[must_use]
    pub fn compressed_bytes(&self, kind: StreamKind) -> u64 {
        self.compressed[kind.index()]
    }

    #[must_use]
    pub fn total_raw_bytes(&self) -> u64 {
        self.raw.iter().sum()
    }

    #[must_use]
    pub fn total_compressed_bytes(&self) -> u64 {
        self.compressed.iter().sum()
    }
}

/// Encodes and decodes whole blocks
///
/// Models are rebuilt for every block. The sequence context table is kept
/// between blocks to avoid reallocating it, so every worker clones its own
/// codec.
#[derive(Debug, Clone)]
pub struct BlockCodec {
    dna: DnaCodec,
    quality_level: u8,
    checksum: bool,
}
impl BlockCodec {
    #[must_use]
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            dna: DnaCodec::new(settings.dna_level, settings.alphabet),
            quality_level: settings.quality_level,
            checksum: settings.checksum,
        }
    }

    /// Codecs in decoding order
    fn codecs(&mut self) -> [Box<dyn SegmentCodec + '_>; 4] {
        [
            Box::new(StructureCodec::default()),
            Box::new(HeaderCodec::default()),
            Box::new(&mut self.dna),
            Box::new(QualityCodec::new(self.quality_level)),
        ]
    }

    pub fn encode(&mut self, block: RawBlock) -> Result<EncodedBlock> {
        let fragments = &block.fragments;
        let mut encoded = EncodedBlock {
            id: block.id,
            record_count: fragments.num_records() as u64,
            checksum: if self.checksum {
                fragments.checksum()
            } else {
                0
            },
            ..Default::default()
        };
        for mut codec in self.codecs() {
            let kind = codec.kind();
            encode_segment(&mut codec, fragments, &mut encoded.segments[kind.index()])?;
            encoded.raw_sizes[kind.index()] = fragments.stream_size(kind);
        }
        trace!(
            block = block.id,
            records = encoded.record_count,
            bytes = encoded.encoded_len(),
            "encoded block"
        );
        Ok(encoded)
    }

    /// Decodes a block from its four segments (in [`StreamKind::ALL`] order)
    ///
    /// `checksum` is verified against the decoded content when present.
    pub fn decode(
        &mut self,
        block: u64,
        segments: [&[u8]; 4],
        record_count: u64,
        checksum: Option<u32>,
    ) -> Result<Vec<Record>> {
        let mut fragments = StreamFragments::default();
        for mut codec in self.codecs() {
            let kind = codec.kind();
            codec.decode(block, segments[kind.index()], &mut fragments)?;
            if kind == StreamKind::Structure && fragments.num_records() as u64 != record_count {
                return Err(StreamError::Corrupt {
                    block,
                    kind,
                    expected: record_count,
                    actual: fragments.num_records() as u64,
                }
                .into());
            }
        }
        if let Some(expected) = checksum {
            let actual = fragments.checksum();
            if actual != expected {
                return Err(StreamError::ChecksumMismatch {
                    block,
                    expected,
                    actual,
                }
                .into());
            }
        }
        Joiner::join(block, &fragments)
    }
}

fn encode_segment<C: SegmentCodec>(
    mut codec: C,
    fragments: &StreamFragments,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.clear();
    codec.encode(fragments, out)
}
