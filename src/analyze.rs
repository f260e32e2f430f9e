//! # Input profiling
//!
//! Whole-file compression reads a prefix of the input before the archive is
//! created and derives the settings the caller left unset from it: the
//! quality offset, the sequence alphabet and whether plus-lines repeat the
//! tag.

use tracing::{debug, warn};

use crate::{
    Record,
    settings::{Alphabet, CompressionSettings, PHRED33, PHRED64},
};

/// Number of input bytes (by record size) inspected before compression starts
pub const ANALYZE_BYTES: usize = 1 << 20;

/// Highest quality byte of a Phred+33 dataset
const PHRED33_MAX: u8 = 74;

/// Highest quality byte of a Phred+64 dataset
const PHRED64_MAX: u8 = 105;

/// Lowest quality byte of a Solexa dataset
const SOLEXA_MIN: u8 = 59;

/// Picks the quality offset matching the observed quality byte range
///
/// Solexa-scaled input is treated as Phred+64. Returns `None` when the range
/// fits no known encoding.
#[must_use]
pub fn detect_quality_offset(min: u8, max: u8) -> Option<u8> {
    if max <= PHRED33_MAX && min >= PHRED33 {
        Some(PHRED33)
    } else if max <= PHRED64_MAX && min >= SOLEXA_MIN {
        Some(PHRED64)
    } else if min >= PHRED33 {
        Some(PHRED33)
    } else {
        None
    }
}

/// Color-space reads carry a primer base followed by transition calls
fn is_color_space(sequence: &[u8]) -> Option<bool> {
    let (&first, &second) = (sequence.first()?, sequence.get(1)?);
    let calls = matches!(second, b'0'..=b'3' | b'.');
    Some(calls && !first.is_ascii_digit())
}

/// Properties of a dataset derived from its first records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputProfile {
    /// Records inspected
    pub records: usize,
    /// Detected quality offset, if the quality range was conclusive
    pub quality_offset: Option<u8>,
    /// Every inspected read is in color space
    pub color_space: bool,
    /// Every inspected plus-line repeats its tag
    pub plus_repetition: bool,
}
impl InputProfile {
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut range: Option<(u8, u8)> = None;
        let mut color_space = None;
        let mut mixed_alphabet = false;
        let mut plus_repetition = !records.is_empty();

        for record in records {
            for &q in record.quality() {
                range = Some(match range {
                    Some((min, max)) => (min.min(q), max.max(q)),
                    None => (q, q),
                });
            }
            if let Some(color) = is_color_space(record.sequence()) {
                match color_space {
                    None => color_space = Some(color),
                    Some(seen) => mixed_alphabet |= seen != color,
                }
            }
            plus_repetition &= record.plus_line() == Some(record.tag());
        }

        Self {
            records: records.len(),
            quality_offset: range.and_then(|(min, max)| detect_quality_offset(min, max)),
            color_space: color_space.unwrap_or(false) && !mixed_alphabet,
            plus_repetition,
        }
    }

    /// Fills in the settings left for detection
    #[must_use]
    pub fn apply(&self, mut settings: CompressionSettings) -> CompressionSettings {
        let detect = settings.detect;
        if detect.quality_offset && self.records > 0 {
            match self.quality_offset {
                Some(offset) => settings.quality_offset = offset,
                None => warn!(
                    offset = settings.quality_offset,
                    "quality range matches no known offset, keeping default"
                ),
            }
        }
        if detect.alphabet && self.color_space {
            settings.alphabet = Alphabet::ColorSpace;
        }
        if detect.plus_repetition && self.plus_repetition {
            settings.plus_repetition = true;
        }
        debug!(
            records = self.records,
            quality_offset = settings.quality_offset,
            alphabet = ?settings.alphabet,
            plus_repetition = settings.plus_repetition,
            "profiled input"
        );
        settings
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{Result, SettingsBuilder};

    fn record(sequence: &[u8], quality: &[u8], plus: bool) -> Record {
        Record::new(
            b"r1".to_vec(),
            sequence.to_vec(),
            quality.to_vec(),
            plus.then(|| b"r1".to_vec()),
        )
    }

    #[test]
    fn test_detect_quality_offset() {
        assert_eq!(detect_quality_offset(b'!', b'J'), Some(PHRED33));
        assert_eq!(detect_quality_offset(b'#', b'I'), Some(PHRED33));
        assert_eq!(detect_quality_offset(b'@', b'h'), Some(PHRED64));
        assert_eq!(detect_quality_offset(b'B', b'h'), Some(PHRED64));
        // Solexa
        assert_eq!(detect_quality_offset(b';', b'h'), Some(PHRED64));
        // non-standard but above '!'
        assert_eq!(detect_quality_offset(b'#', b'~'), Some(PHRED33));
        assert_eq!(detect_quality_offset(b' ', b'I'), None);
    }

    #[test]
    fn test_profile_phred64() -> Result<()> {
        let records = [
            record(b"ACGT", b"hhBh", false),
            record(b"NNGT", b"BBhB", false),
        ];
        let profile = InputProfile::from_records(&records);
        assert_eq!(profile.records, 2);
        assert_eq!(profile.quality_offset, Some(PHRED64));
        assert!(!profile.color_space);
        assert!(!profile.plus_repetition);

        let settings = profile.apply(SettingsBuilder::default().build()?);
        assert_eq!(settings.quality_offset(), PHRED64);

        // an explicit offset is kept
        let settings = profile.apply(SettingsBuilder::default().quality_offset(PHRED33).build()?);
        assert_eq!(settings.quality_offset(), PHRED33);
        Ok(())
    }

    #[test]
    fn test_profile_color_space_and_plus() -> Result<()> {
        let records = [
            record(b"T0123.", b"555555", true),
            record(b"G3210", b"55555", true),
        ];
        let profile = InputProfile::from_records(&records);
        assert!(profile.color_space);
        assert!(profile.plus_repetition);

        let settings = profile.apply(SettingsBuilder::default().build()?);
        assert_eq!(settings.alphabet(), Alphabet::ColorSpace);
        assert!(settings.plus_repetition());

        let settings = profile.apply(
            SettingsBuilder::default()
                .alphabet(Alphabet::Nucleotide)
                .plus_repetition(false)
                .build()?,
        );
        assert_eq!(settings.alphabet(), Alphabet::Nucleotide);
        assert!(!settings.plus_repetition());
        Ok(())
    }

    #[test]
    fn test_profile_mixed_alphabet() {
        let records = [record(b"T0123", b"55555", false), record(b"ACGT", b"5555", true)];
        let profile = InputProfile::from_records(&records);
        assert!(!profile.color_space);
        assert!(!profile.plus_repetition);
    }

    #[test]
    fn test_profile_empty() -> Result<()> {
        let profile = InputProfile::from_records(&[]);
        assert_eq!(profile, InputProfile::default());
        let settings = profile.apply(SettingsBuilder::default().build()?);
        assert_eq!(settings.quality_offset(), PHRED33);
        assert_eq!(settings.alphabet(), Alphabet::Nucleotide);
        Ok(())
    }
}
