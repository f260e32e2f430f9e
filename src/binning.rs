use crate::settings::QualityMode;

/// Phred bins as `(exclusive upper bound, representative)` pairs
///
/// The final bin is open ended.
const PHRED_BINS: [(u8, u8); 8] = [
    (2, 0),
    (10, 6),
    (20, 15),
    (25, 22),
    (30, 27),
    (35, 33),
    (40, 37),
    (u8::MAX, 40),
];

/// Maps a Phred score to the representative of its bin
#[inline]
#[must_use]
pub fn bin_phred(phred: u8) -> u8 {
    for (upper, repr) in PHRED_BINS {
        if phred < upper {
            return repr;
        }
    }
    PHRED_BINS[PHRED_BINS.len() - 1].1
}

/// Per-symbol quality transform applied before splitting
///
/// In lossless mode this is the identity.
#[derive(Debug, Clone)]
pub struct QualityBinner {
    table: Option<[u8; 256]>,
}
impl QualityBinner {
    #[must_use]
    pub fn new(mode: QualityMode, offset: u8) -> Self {
        let table = mode.is_lossy().then(|| {
            let mut table = [0u8; 256];
            for (sym, entry) in table.iter_mut().enumerate() {
                let sym = sym as u8;
                *entry = if sym < offset {
                    sym
                } else {
                    let binned = bin_phred(sym - offset);
                    offset.saturating_add(binned)
                };
            }
            table
        });
        Self { table }
    }

    #[must_use]
    pub fn is_lossy(&self) -> bool {
        self.table.is_some()
    }

    /// Appends the transformed quality string to `out`
    pub fn apply_into(&self, quality: &[u8], out: &mut Vec<u8>) {
        match &self.table {
            Some(table) => out.extend(quality.iter().map(|&q| table[q as usize])),
            None => out.extend_from_slice(quality),
        }
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_representatives_in_their_bin() {
        let mut lower = 0;
        for (upper, repr) in PHRED_BINS {
            assert!(repr >= lower && repr < upper);
            assert_eq!(bin_phred(repr), repr);
            lower = upper;
        }
    }

    #[test]
    fn test_bins_are_monotonic() {
        let mut prev = 0;
        for phred in 0..=93 {
            let binned = bin_phred(phred);
            assert!(binned >= prev);
            prev = binned;
        }
        assert_eq!(bin_phred(41), 40);
        assert_eq!(bin_phred(93), 40);
    }

    #[test]
    fn test_lossless_is_identity() {
        let binner = QualityBinner::new(QualityMode::Lossless, 33);
        let mut out = Vec::new();
        binner.apply_into(b"!#5?IJ", &mut out);
        assert_eq!(out, b"!#5?IJ");
        assert!(!binner.is_lossy());
    }

    #[test]
    fn test_binned_offset33() {
        let binner = QualityBinner::new(QualityMode::Binned, 33);
        let mut out = Vec::new();
        // phred: 0, 3, 12, 38, 41
        binner.apply_into(b"!$-GJ", &mut out);
        assert_eq!(out, &[33, 33 + 6, 33 + 15, 33 + 37, 33 + 40]);
    }

    #[test]
    fn test_binned_below_offset_passthrough() {
        let binner = QualityBinner::new(QualityMode::Binned, 64);
        let mut out = Vec::new();
        binner.apply_into(b"5@h", &mut out);
        assert_eq!(out, &[b'5', 64, 64 + 40]);
    }
}
