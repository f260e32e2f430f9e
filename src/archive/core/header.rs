use bytemuck::{Pod, Zeroable};

use super::{FILE_MAGIC, FORMAT_VERSION};
use crate::{
    Result,
    error::ArchiveError,
    filter::FieldMask,
    settings::{Alphabet, CompressionSettings, Detection, QualityMode},
};

/// Compression settings as persisted in the file header
///
/// The thread count is a property of the session and is not stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct SettingsSnapshot {
    pub buffer_size: u64,
    pub tag_mask: u64,
    pub dna_level: u8,
    pub quality_level: u8,
    /// 0 lossless, 1 binned
    pub quality_mode: u8,
    /// 0 nucleotide, 1 color space
    pub alphabet: u8,
    pub plus_repetition: u8,
    pub quality_offset: u8,
    pub checksum: u8,
    reserved: u8,
}
impl SettingsSnapshot {
    #[must_use]
    pub fn from_settings(settings: &CompressionSettings) -> Self {
        Self {
            buffer_size: settings.buffer_size,
            tag_mask: settings.tag_mask.bits(),
            dna_level: settings.dna_level,
            quality_level: settings.quality_level,
            quality_mode: match settings.quality_mode {
                QualityMode::Lossless => 0,
                QualityMode::Binned => 1,
            },
            alphabet: match settings.alphabet {
                Alphabet::Nucleotide => 0,
                Alphabet::ColorSpace => 1,
            },
            plus_repetition: u8::from(settings.plus_repetition),
            quality_offset: settings.quality_offset,
            checksum: u8::from(settings.checksum),
            reserved: 0,
        }
    }

    /// Rebuilds validated settings for a session running `thread_count` workers
    pub fn to_settings(&self, thread_count: usize) -> Result<CompressionSettings> {
        let quality_mode = match self.quality_mode {
            0 => QualityMode::Lossless,
            1 => QualityMode::Binned,
            _ => return Err(ArchiveError::InvalidSettings("unknown quality mode").into()),
        };
        let alphabet = match self.alphabet {
            0 => Alphabet::Nucleotide,
            1 => Alphabet::ColorSpace,
            _ => return Err(ArchiveError::InvalidSettings("unknown alphabet").into()),
        };
        let settings = CompressionSettings {
            dna_level: self.dna_level,
            quality_level: self.quality_level,
            buffer_size: self.buffer_size,
            quality_mode,
            tag_mask: FieldMask::from_bits(self.tag_mask),
            alphabet,
            plus_repetition: self.plus_repetition != 0,
            thread_count,
            quality_offset: self.quality_offset,
            checksum: self.checksum != 0,
            detect: Detection::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    #[must_use]
    pub fn is_lossy(&self) -> bool {
        self.quality_mode != 0 || self.tag_mask != 0
    }

    #[must_use]
    pub fn has_checksums(&self) -> bool {
        self.checksum != 0
    }
}

/// The 64-byte header opening every archive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct FileHeader {
    /// File magic number
    magic: [u8; 7],
    /// Format version number
    pub version: u8,

    /// Settings the archive was written with
    pub settings: SettingsSnapshot,

    /// Reserved for future use
    reserved: [u8; 32],
}
impl FileHeader {
    #[must_use]
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: FORMAT_VERSION,
            settings: SettingsSnapshot::from_settings(settings),
            reserved: [0; 32],
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Parses a header, checking the magic before the version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(bytes) = bytes.get(..size_of::<Self>()) else {
            return Err(ArchiveError::Truncated {
                reason: "file is shorter than the archive header",
            }
            .into());
        };
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *FILE_MAGIC {
            return Err(ArchiveError::InvalidMagic(header.magic).into());
        }
        if header.version != FORMAT_VERSION {
            return Err(ArchiveError::FormatVersion {
                found: header.version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        Ok(header)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{Error, SettingsBuilder};

    #[test]
    fn test_header_size() {
        assert_eq!(size_of::<SettingsSnapshot>(), 24);
        assert_eq!(size_of::<FileHeader>(), 64);
    }

    #[test]
    fn test_settings_snapshot() -> Result<()> {
        let settings = SettingsBuilder::default()
            .dna_level(3)
            .quality_level(2)
            .quality_mode(QualityMode::Binned)
            .alphabet(Alphabet::ColorSpace)
            .tag_fields(&[1, 4])
            .plus_repetition(true)
            .quality_offset(64)
            .checksum(true)
            .threads(3)
            .build()?;
        let header = FileHeader::new(&settings);
        let parsed = FileHeader::from_bytes(header.as_bytes())?;
        assert_eq!(parsed, header);
        assert!(parsed.settings.is_lossy());
        assert!(parsed.settings.has_checksums());
        assert_eq!(parsed.settings.to_settings(3)?, settings);
        Ok(())
    }

    #[test]
    fn test_invalid_magic() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        let mut bytes = FileHeader::new(&settings).as_bytes().to_vec();
        bytes[0] = b'X';
        let err = FileHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::ArchiveError(ArchiveError::InvalidMagic(_))
        ));
        Ok(())
    }

    #[test]
    fn test_format_version() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        let mut bytes = FileHeader::new(&settings).as_bytes().to_vec();
        bytes[7] = FORMAT_VERSION + 1;
        let err = FileHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::ArchiveError(ArchiveError::FormatVersion { found, .. }) if found == FORMAT_VERSION + 1
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_snapshot_value() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        let mut snapshot = SettingsSnapshot::from_settings(&settings);
        snapshot.alphabet = 7;
        assert!(snapshot.to_settings(1).is_err());
        snapshot.alphabet = 0;
        snapshot.dna_level = 9;
        assert!(matches!(
            snapshot.to_settings(1),
            Err(Error::ConfigError(_))
        ));
        Ok(())
    }
}
