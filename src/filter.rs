//! Tag field selection
//!
//! A tag is split into tokens on [`TAG_SEPARATORS`]. Each token owns the
//! separator that follows it (the final token owns none). A [`FieldMask`]
//! selects which 1-indexed tokens survive compression.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{
    Result,
    error::{ConfigError, TagError},
};

/// Bytes that split a tag into fields
pub const TAG_SEPARATORS: &[u8; 9] = b" ._,=:/-#";

/// The highest addressable field position
pub const MAX_FIELD_POSITION: usize = 64;

#[inline]
#[must_use]
pub fn is_separator(byte: u8) -> bool {
    TAG_SEPARATORS.contains(&byte)
}

/// A token of a tag together with its trailing separator (if any)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub(crate) field: &'a [u8],
    pub(crate) separator: Option<u8>,
}
impl Token<'_> {
    /// Length of the token including its separator
    #[must_use]
    pub fn len(&self) -> usize {
        self.field.len() + usize::from(self.separator.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over the tokens of a tag
pub struct Tokens<'a> {
    tag: &'a [u8],
    pos: usize,
    done: bool,
}
impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = &self.tag[self.pos..];
        if let Some(idx) = rest.iter().position(|&b| is_separator(b)) {
            self.pos += idx + 1;
            Some(Token {
                field: &rest[..idx],
                separator: Some(rest[idx]),
            })
        } else {
            self.done = true;
            Some(Token {
                field: rest,
                separator: None,
            })
        }
    }
}

/// Splits a tag into tokens
///
/// A tag always yields at least one token; a tag ending with a separator
/// yields a trailing empty token.
#[must_use]
pub fn tokenize(tag: &[u8]) -> Tokens<'_> {
    Tokens {
        tag,
        pos: 0,
        done: false,
    }
}

/// Set of 1-indexed tag fields to keep
///
/// An empty mask keeps the whole tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldMask(u64);
impl FieldMask {
    /// Builds a mask from 1-indexed positions
    pub fn from_positions(positions: &[usize]) -> Result<Self> {
        let mut bits = 0u64;
        for &pos in positions {
            if pos == 0 || pos > MAX_FIELD_POSITION {
                return Err(ConfigError::InvalidFieldPosition(pos).into());
            }
            bits |= 1 << (pos - 1);
        }
        Ok(Self(bits))
    }

    /// Reconstructs a mask from its stored bit representation
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether the 1-indexed field is kept
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        (1..=MAX_FIELD_POSITION).contains(&pos) && self.0 & (1 << (pos - 1)) != 0
    }

    /// The highest kept field position (0 for an empty mask)
    #[must_use]
    pub fn max_position(&self) -> usize {
        MAX_FIELD_POSITION - self.0.leading_zeros() as usize
    }

    /// Writes the kept fields of `tag` into `out`
    ///
    /// Fails with [`TagError::Malformed`] when the tag has fewer tokens than
    /// the highest kept position; `out` is left unchanged in that case.
    pub fn apply(&self, tag: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.is_empty() {
            out.extend_from_slice(tag);
            return Ok(());
        }
        let found = tokenize(tag).count();
        let required = self.max_position();
        if found < required {
            return Err(TagError::Malformed { found, required }.into());
        }

        let start = out.len();
        let mut last_separator = false;
        for (idx, token) in tokenize(tag).enumerate() {
            if !self.contains(idx + 1) {
                continue;
            }
            out.extend_from_slice(token.field);
            if let Some(sep) = token.separator {
                out.push(sep);
                last_separator = true;
            } else {
                last_separator = false;
            }
        }
        if last_separator && out.len() > start {
            out.pop();
        }
        Ok(())
    }
}

/// Applies a [`FieldMask`] to tags, falling back to the unfiltered tag when a
/// tag is malformed
#[derive(Debug, Default)]
pub struct TagFilter {
    mask: FieldMask,
    fallbacks: AtomicU64,
}
impl TagFilter {
    #[must_use]
    pub fn new(mask: FieldMask) -> Self {
        Self {
            mask,
            fallbacks: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn mask(&self) -> FieldMask {
        self.mask
    }

    /// Appends the filtered tag to `out`
    ///
    /// Returns `true` if the mask was applied and `false` if the tag was
    /// passed through unchanged.
    pub fn filter_into(&self, tag: &[u8], out: &mut Vec<u8>) -> bool {
        match self.mask.apply(tag, out) {
            Ok(()) => true,
            Err(err) => {
                debug!(tag = %String::from_utf8_lossy(tag), "{err}; keeping unfiltered tag");
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                out.extend_from_slice(tag);
                false
            }
        }
    }

    /// Number of tags that were passed through unfiltered
    #[must_use]
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
