//! Adaptive range coding
//!
//! A byte-oriented range coder with carry propagation through a 64-bit low
//! register, and the frequency models that drive it.

const RC_TOP: u32 = 1 << 24;

/// Totals are halved once they reach this bound
const RESCALE_LIMIT: u32 = 1 << 16;

/// Rescale bound of the compact nucleotide model
const NUCLEOTIDE_RESCALE_LIMIT: u32 = 1 << 13;

/// Frequency increment per coded symbol
const INCREMENT: u32 = 24;

pub(crate) struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u32,
    output: Vec<u8>,
}
impl RangeEncoder {
    pub(crate) fn new() -> Self {
        Self {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0,
            cache_size: 1,
            output: Vec::new(),
        }
    }

    fn shift_low(&mut self) {
        let carry = (self.low >> 32) as u8;
        if carry != 0 || (self.low as u32) < 0xFF00_0000 {
            let mut byte = self.cache;
            loop {
                self.output.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = ((self.low >> 24) & 0xFF) as u8;
        }
        self.cache_size += 1;
        self.low = u64::from((self.low as u32) << 8);
    }

    #[inline]
    pub(crate) fn encode(&mut self, cum: u32, freq: u32, total: u32) {
        let r = self.range / total;
        self.low += u64::from(cum) * u64::from(r);
        if cum + freq < total {
            self.range = r * freq;
        } else {
            self.range -= r * cum;
        }
        while self.range < RC_TOP {
            self.range <<= 8;
            self.shift_low();
        }
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.output
    }
}

pub(crate) struct RangeDecoder<'a> {
    range: u32,
    code: u32,
    scale: u32,
    input: &'a [u8],
    pos: usize,
}
impl<'a> RangeDecoder<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        let mut dec = Self {
            range: 0xFFFF_FFFF,
            code: 0,
            scale: 1,
            input,
            // the first byte is always the encoder's initial cache
            pos: usize::from(!input.is_empty()),
        };
        for _ in 0..4 {
            dec.code = (dec.code << 8) | u32::from(dec.next_byte());
        }
        dec
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let byte = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    /// Returns the cumulative frequency the next symbol falls under
    #[inline]
    pub(crate) fn target(&mut self, total: u32) -> u32 {
        self.scale = self.range / total;
        (self.code / self.scale).min(total - 1)
    }

    /// Consumes the symbol located by [`Self::target`]
    #[inline]
    pub(crate) fn consume(&mut self, cum: u32, freq: u32, total: u32) {
        let r = self.scale;
        self.code -= cum * r;
        if cum + freq < total {
            self.range = r * freq;
        } else {
            self.range -= r * cum;
        }
        while self.range < RC_TOP {
            self.code = (self.code << 8) | u32::from(self.next_byte());
            self.range <<= 8;
        }
    }

    /// Whether the decoder read past the end of its input
    ///
    /// The encoder flushes five bytes, so a well-formed stream never needs
    /// more than its own length.
    pub(crate) fn overran(&self) -> bool {
        self.pos > self.input.len()
    }
}

/// A frequency model the range coder can drive
pub(crate) trait Model {
    /// Returns `(cum, freq, total)` for `sym`
    fn params(&self, sym: usize) -> (u32, u32, u32);

    /// Finds the symbol covering `target`, returning `(sym, cum, freq)`
    fn locate(&self, target: u32) -> (usize, u32, u32);

    fn total(&self) -> u32;

    fn update(&mut self, sym: usize);
}

/// Encodes `sym` under `model` and adapts the model
#[inline]
pub(crate) fn encode_symbol<M: Model>(enc: &mut RangeEncoder, model: &mut M, sym: usize) {
    let (cum, freq, total) = model.params(sym);
    enc.encode(cum, freq, total);
    model.update(sym);
}

/// Decodes a symbol under `model` and adapts the model
#[inline]
pub(crate) fn decode_symbol<M: Model>(dec: &mut RangeDecoder, model: &mut M) -> usize {
    let total = model.total();
    let target = dec.target(total);
    let (sym, cum, freq) = model.locate(target);
    dec.consume(cum, freq, total);
    model.update(sym);
    sym
}

/// Adaptive model over a dense alphabet of up to 256 symbols
#[derive(Clone)]
pub(crate) struct AdaptiveModel {
    freqs: Vec<u32>,
    total: u32,
}
impl AdaptiveModel {
    pub(crate) fn new(n_symbols: usize) -> Self {
        Self {
            freqs: vec![1; n_symbols],
            total: n_symbols as u32,
        }
    }

    fn rescale(&mut self) {
        self.total = 0;
        for freq in &mut self.freqs {
            *freq = (*freq >> 1).max(1);
            self.total += *freq;
        }
    }
}
impl Model for AdaptiveModel {
    #[inline]
    fn params(&self, sym: usize) -> (u32, u32, u32) {
        let cum = self.freqs[..sym].iter().sum();
        (cum, self.freqs[sym], self.total)
    }

    #[inline]
    fn locate(&self, target: u32) -> (usize, u32, u32) {
        let mut cum = 0;
        for (sym, &freq) in self.freqs.iter().enumerate() {
            if target < cum + freq {
                return (sym, cum, freq);
            }
            cum += freq;
        }
        // unreachable for target < total
        let last = self.freqs.len() - 1;
        (last, cum - self.freqs[last], self.freqs[last])
    }

    #[inline]
    fn total(&self) -> u32 {
        self.total
    }

    #[inline]
    fn update(&mut self, sym: usize) {
        self.freqs[sym] += INCREMENT;
        self.total += INCREMENT;
        if self.total >= RESCALE_LIMIT {
            self.rescale();
        }
    }
}

/// Compact adaptive model over the four nucleotide classes
#[derive(Debug, Clone, Copy)]
pub(crate) struct NucleotideModel {
    freqs: [u16; 4],
}
impl Default for NucleotideModel {
    fn default() -> Self {
        Self { freqs: [1; 4] }
    }
}
impl Model for NucleotideModel {
    #[inline]
    fn params(&self, sym: usize) -> (u32, u32, u32) {
        let cum = self.freqs[..sym].iter().map(|&f| u32::from(f)).sum();
        (cum, u32::from(self.freqs[sym]), self.total())
    }

    #[inline]
    fn locate(&self, target: u32) -> (usize, u32, u32) {
        let mut cum = 0;
        for (sym, &freq) in self.freqs.iter().enumerate() {
            let freq = u32::from(freq);
            if target < cum + freq {
                return (sym, cum, freq);
            }
            cum += freq;
        }
        let freq = u32::from(self.freqs[3]);
        (3, cum - freq, freq)
    }

    #[inline]
    fn total(&self) -> u32 {
        self.freqs.iter().map(|&f| u32::from(f)).sum()
    }

    #[inline]
    fn update(&mut self, sym: usize) {
        self.freqs[sym] += INCREMENT as u16;
        if self.total() >= NUCLEOTIDE_RESCALE_LIMIT {
            for freq in &mut self.freqs {
                *freq = (*freq >> 1).max(1);
            }
        }
    }
}
