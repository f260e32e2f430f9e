use crate::{Result, error::ConfigError, filter::FieldMask};

/// The default block buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: u64 = 8 * 1024 * 1024;

/// The largest accepted block buffer size in bytes
pub const MAX_BUFFER_SIZE: u64 = 1023 * 1024 * 1024;

/// The highest supported DNA compression level
pub const MAX_DNA_LEVEL: u8 = 3;

/// The highest supported quality compression level
pub const MAX_QUALITY_LEVEL: u8 = 2;

/// Sanger / Illumina 1.8+ quality offset
pub const PHRED33: u8 = 33;

/// Illumina 1.3 - 1.7 quality offset
pub const PHRED64: u8 = 64;

/// How quality values are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QualityMode {
    /// Quality strings are stored exactly
    #[default]
    Lossless,
    /// Quality values are mapped onto eight representative levels
    Binned,
}
impl QualityMode {
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Binned)
    }
}

/// Symbol alphabet of the sequence stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alphabet {
    /// `A`, `C`, `G`, `T`
    #[default]
    Nucleotide,
    /// Dinucleotide transition calls `0`, `1`, `2`, `3`
    ColorSpace,
}

/// Settings left for whole-file compression to detect from the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Detection {
    pub(crate) quality_offset: bool,
    pub(crate) alphabet: bool,
    pub(crate) plus_repetition: bool,
}
impl Detection {
    pub(crate) const ALL: Self = Self {
        quality_offset: true,
        alphabet: true,
        plus_repetition: true,
    };
}

/// Validated, immutable settings for a compression session
///
/// Build with [`SettingsBuilder`]; the settings are shared read-only by all
/// workers of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionSettings {
    pub(crate) dna_level: u8,
    pub(crate) quality_level: u8,
    pub(crate) buffer_size: u64,
    pub(crate) quality_mode: QualityMode,
    pub(crate) tag_mask: FieldMask,
    pub(crate) alphabet: Alphabet,
    pub(crate) plus_repetition: bool,
    pub(crate) thread_count: usize,
    pub(crate) quality_offset: u8,
    pub(crate) checksum: bool,
    pub(crate) detect: Detection,
}
impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            dna_level: 0,
            quality_level: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
            quality_mode: QualityMode::default(),
            tag_mask: FieldMask::default(),
            alphabet: Alphabet::default(),
            plus_repetition: false,
            thread_count: num_cpus::get(),
            quality_offset: PHRED33,
            checksum: false,
            detect: Detection::ALL,
        }
    }
}
impl CompressionSettings {
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    #[must_use]
    pub fn dna_level(&self) -> u8 {
        self.dna_level
    }

    #[must_use]
    pub fn quality_level(&self) -> u8 {
        self.quality_level
    }

    #[must_use]
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    #[must_use]
    pub fn quality_mode(&self) -> QualityMode {
        self.quality_mode
    }

    #[must_use]
    pub fn tag_mask(&self) -> &FieldMask {
        &self.tag_mask
    }

    #[must_use]
    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    #[must_use]
    pub fn plus_repetition(&self) -> bool {
        self.plus_repetition
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    #[must_use]
    pub fn quality_offset(&self) -> u8 {
        self.quality_offset
    }

    #[must_use]
    pub fn checksum(&self) -> bool {
        self.checksum
    }

    /// True when [`crate::compress`] picks the quality offset from the input
    #[must_use]
    pub fn detects_quality_offset(&self) -> bool {
        self.detect.quality_offset
    }

    /// Validates every field against its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.dna_level > MAX_DNA_LEVEL {
            return Err(ConfigError::InvalidDnaLevel(self.dna_level).into());
        }
        if self.quality_level > MAX_QUALITY_LEVEL {
            return Err(ConfigError::InvalidQualityLevel(self.quality_level).into());
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize {
                found: self.buffer_size,
                max: MAX_BUFFER_SIZE,
            }
            .into());
        }
        if self.thread_count == 0 {
            return Err(ConfigError::InvalidThreadCount.into());
        }
        if self.quality_offset != PHRED33 && self.quality_offset != PHRED64 {
            return Err(ConfigError::InvalidQualityOffset(self.quality_offset).into());
        }
        Ok(())
    }
}

/// Builder for [`CompressionSettings`]
///
/// The quality offset, alphabet and plus-line repetition are detected from
/// the input by [`crate::compress`] and [`crate::compress_reader`] unless set
/// explicitly. Streaming sessions use the builder's defaults for them.
///
/// # Example
///
/// ```
/// use fqarc::{QualityMode, SettingsBuilder};
///
/// let settings = SettingsBuilder::default()
///     .dna_level(2)
///     .quality_level(1)
///     .quality_mode(QualityMode::Binned)
///     .tag_fields(&[1, 3])
///     .threads(4)
///     .build()
///     .unwrap();
/// assert_eq!(settings.thread_count(), 4);
/// ```
#[derive(Debug, Default, Clone)]
pub struct SettingsBuilder {
    dna_level: Option<u8>,
    quality_level: Option<u8>,
    buffer_size: Option<u64>,
    quality_mode: Option<QualityMode>,
    tag_fields: Option<Vec<usize>>,
    alphabet: Option<Alphabet>,
    plus_repetition: Option<bool>,
    thread_count: Option<usize>,
    quality_offset: Option<u8>,
    checksum: Option<bool>,
}
impl SettingsBuilder {
    #[must_use]
    pub fn dna_level(mut self, level: u8) -> Self {
        self.dna_level = Some(level);
        self
    }

    #[must_use]
    pub fn quality_level(mut self, level: u8) -> Self {
        self.quality_level = Some(level);
        self
    }

    /// Sets the block buffer size in bytes
    #[must_use]
    pub fn buffer_size(mut self, bytes: u64) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn quality_mode(mut self, mode: QualityMode) -> Self {
        self.quality_mode = Some(mode);
        self
    }

    /// Sets the 1-indexed tag fields to keep
    ///
    /// An empty list keeps the whole tag.
    #[must_use]
    pub fn tag_fields(mut self, positions: &[usize]) -> Self {
        self.tag_fields = Some(positions.to_vec());
        self
    }

    #[must_use]
    pub fn alphabet(mut self, alphabet: Alphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    #[must_use]
    pub fn plus_repetition(mut self, enabled: bool) -> Self {
        self.plus_repetition = Some(enabled);
        self
    }

    #[must_use]
    pub fn threads(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    /// Sets the quality offset (33 or 64), disabling its detection
    #[must_use]
    pub fn quality_offset(mut self, offset: u8) -> Self {
        self.quality_offset = Some(offset);
        self
    }

    #[must_use]
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = Some(enabled);
        self
    }

    pub fn build(self) -> Result<CompressionSettings> {
        let defaults = CompressionSettings::default();
        let tag_mask = match self.tag_fields {
            Some(positions) => FieldMask::from_positions(&positions)?,
            None => defaults.tag_mask,
        };
        let settings = CompressionSettings {
            dna_level: self.dna_level.unwrap_or(defaults.dna_level),
            quality_level: self.quality_level.unwrap_or(defaults.quality_level),
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            quality_mode: self.quality_mode.unwrap_or(defaults.quality_mode),
            tag_mask,
            alphabet: self.alphabet.unwrap_or(defaults.alphabet),
            plus_repetition: self.plus_repetition.unwrap_or(defaults.plus_repetition),
            thread_count: self.thread_count.unwrap_or(defaults.thread_count),
            quality_offset: self.quality_offset.unwrap_or(defaults.quality_offset),
            checksum: self.checksum.unwrap_or(defaults.checksum),
            detect: Detection {
                quality_offset: self.quality_offset.is_none(),
                alphabet: self.alphabet.is_none(),
                plus_repetition: self.plus_repetition.is_none(),
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    fn config_error(result: Result<CompressionSettings>) -> ConfigError {
        match result {
            Err(Error::ConfigError(err)) => err,
            other => panic!("expected a configuration error, found {other:?}"),
        }
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        assert_eq!(settings.dna_level(), 0);
        assert_eq!(settings.quality_level(), 0);
        assert_eq!(settings.buffer_size(), DEFAULT_BUFFER_SIZE);
        assert_eq!(settings.quality_mode(), QualityMode::Lossless);
        assert_eq!(settings.alphabet(), Alphabet::Nucleotide);
        assert_eq!(settings.quality_offset(), PHRED33);
        assert!(settings.tag_mask().is_empty());
        assert!(settings.thread_count() > 0);
        Ok(())
    }

    #[test]
    fn test_detection_follows_unset_fields() -> Result<()> {
        let settings = SettingsBuilder::default().build()?;
        assert_eq!(settings.detect, Detection::ALL);
        assert!(settings.detects_quality_offset());

        let settings = SettingsBuilder::default()
            .quality_offset(PHRED64)
            .alphabet(Alphabet::Nucleotide)
            .build()?;
        assert!(!settings.detects_quality_offset());
        assert!(!settings.detect.alphabet);
        assert!(settings.detect.plus_repetition);
        Ok(())
    }

    #[test]
    fn test_invalid_levels() {
        assert_eq!(
            config_error(SettingsBuilder::default().dna_level(4).build()),
            ConfigError::InvalidDnaLevel(4)
        );
        assert_eq!(
            config_error(SettingsBuilder::default().quality_level(3).build()),
            ConfigError::InvalidQualityLevel(3)
        );
    }

    #[test]
    fn test_invalid_threads_and_buffer() {
        assert_eq!(
            config_error(SettingsBuilder::default().threads(0).build()),
            ConfigError::InvalidThreadCount
        );
        assert!(matches!(
            config_error(SettingsBuilder::default().buffer_size(0).build()),
            ConfigError::InvalidBufferSize { found: 0, .. }
        ));
        assert!(matches!(
            config_error(
                SettingsBuilder::default()
                    .buffer_size(MAX_BUFFER_SIZE + 1)
                    .build()
            ),
            ConfigError::InvalidBufferSize { .. }
        ));
    }

    #[test]
    fn test_invalid_offset() {
        assert_eq!(
            config_error(SettingsBuilder::default().quality_offset(40).build()),
            ConfigError::InvalidQualityOffset(40)
        );
        assert!(SettingsBuilder::default().quality_offset(PHRED64).build().is_ok());
    }

    #[test]
    fn test_invalid_tag_field() {
        assert_eq!(
            config_error(SettingsBuilder::default().tag_fields(&[0]).build()),
            ConfigError::InvalidFieldPosition(0)
        );
        assert_eq!(
            config_error(SettingsBuilder::default().tag_fields(&[2, 65]).build()),
            ConfigError::InvalidFieldPosition(65)
        );
    }
}
