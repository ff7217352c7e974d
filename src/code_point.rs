//! Decoding UTF-16 input into code points.
//!
//! `&str` input is already addressable by code point through [`str::chars`].
//! UTF-16 input (from JavaScript engines, Windows APIs, Java-style strings) has
//! to have its surrogate pairs merged first; that's what [`CodePoints`] does.
//!
//! Unpaired surrogates are reported as [`DecodeError`]s that carry the index of
//! the offending unit. Iteration resumes after the error, so a caller that
//! prefers substitution can map errors to U+FFFD (see [`DecodePolicy`]).

use core::iter::FusedIterator;

use crate::{DecodeError, DecodeErrorKind, LoneSurrogateError};

/// What to do with an unpaired surrogate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodePolicy {
    /// Stop and report a [`DecodeError`].
    #[default]
    Strict,
    /// Substitute U+FFFD REPLACEMENT CHARACTER and continue.
    Replace,
}

/// Creates a code point iterator over UTF-16 code units.
///
/// # Example
///
/// ```
/// use context_escape::code_point::decode_utf16;
///
/// // "a😀" with the emoji as a surrogate pair.
/// let units = [0x61, 0xD83D, 0xDE00];
/// let chars: Result<Vec<char>, _> = decode_utf16(&units).collect();
/// assert_eq!(chars.unwrap(), ['a', '😀']);
/// ```
#[inline]
pub fn decode_utf16(units: &[u16]) -> CodePoints<'_> {
    CodePoints::new(units)
}

/// A lazy, restartable iterator of the code points in a UTF-16 slice.
///
/// Yields `Ok(char)` for every scalar value and `Err(DecodeError)` for every
/// unpaired surrogate. Cloning it restarts from the current position.
#[derive(Clone, Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct CodePoints<'a> {
    units: &'a [u16],
    pos: usize,
}

impl<'a> CodePoints<'a> {
    /// Creates an iterator positioned at the first unit.
    #[inline]
    pub const fn new(units: &'a [u16]) -> Self {
        Self { units, pos: 0 }
    }

    /// Index of the next unit to be decoded.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The units not yet decoded.
    #[inline]
    pub fn remnant(&self) -> &'a [u16] {
        &self.units[self.pos..]
    }

    /// Applies `policy` to every error, yielding plain `char`s under
    /// [`DecodePolicy::Replace`].
    pub fn with_policy(self, policy: DecodePolicy) -> WithPolicy<'a> {
        WithPolicy {
            inner: self,
            policy,
        }
    }
}

#[inline(always)]
fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

#[inline(always)]
fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

#[inline(always)]
fn combine_surrogates(high: u16, low: u16) -> Option<char> {
    let code = 0x10000 + ((((high - 0xD800) as u32) << 10) | (low - 0xDC00) as u32);
    char::from_u32(code)
}

impl Iterator for CodePoints<'_> {
    type Item = Result<char, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = *self.units.get(self.pos)?;
        let offset = self.pos;
        self.pos += 1;

        if is_high_surrogate(unit) {
            if let Some(&low) = self.units.get(self.pos) {
                if is_low_surrogate(low) {
                    self.pos += 1;
                    if let Some(c) = combine_surrogates(unit, low) {
                        return Some(Ok(c));
                    }
                }
            }
        } else if let Some(c) = char::from_u32(unit as u32) {
            // Anything else outside the surrogate block is its own scalar value.
            return Some(Ok(c));
        }

        Some(Err(DecodeError {
            kind: DecodeErrorKind::LoneSurrogate(LoneSurrogateError { surrogate: unit }),
            offset,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.units.len() - self.pos;
        // A pair folds two units into one code point.
        (remaining.div_ceil(2), Some(remaining))
    }
}

impl FusedIterator for CodePoints<'_> {}

/// A [`CodePoints`] iterator with a fixed [`DecodePolicy`].
///
/// Under [`DecodePolicy::Strict`] this behaves exactly like the inner iterator;
/// under [`DecodePolicy::Replace`] it never yields an error.
#[derive(Clone, Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct WithPolicy<'a> {
    inner: CodePoints<'a>,
    policy: DecodePolicy,
}

impl Iterator for WithPolicy<'_> {
    type Item = Result<char, DecodeError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match (self.inner.next()?, self.policy) {
            (Err(_), DecodePolicy::Replace) => Some(Ok(char::REPLACEMENT_CHARACTER)),
            (item, _) => Some(item),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl FusedIterator for WithPolicy<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn decodes_bmp_and_pairs() {
        let units = utf16("a€😀z");
        let chars: Vec<char> = decode_utf16(&units).map(Result::unwrap).collect();
        assert_eq!(chars, ['a', '€', '😀', 'z']);
    }

    #[test]
    fn empty_input() {
        assert_eq!(decode_utf16(&[]).next(), None);
    }

    #[test]
    fn lone_high_surrogate_at_end() {
        let mut it = decode_utf16(&[0x61, 0xD83D]);
        assert_eq!(it.next(), Some(Ok('a')));
        let err = it.next().unwrap().unwrap_err();
        assert_eq!(err.offset(), 1);
        assert_eq!(
            err.kind(),
            DecodeErrorKind::LoneSurrogate(LoneSurrogateError { surrogate: 0xD83D })
        );
        assert_eq!(it.next(), None);
    }

    #[test]
    fn high_surrogate_followed_by_non_surrogate() {
        let mut it = decode_utf16(&[0xD800, 0x62]);
        assert!(it.next().unwrap().is_err());
        // The unit after the lone surrogate is not swallowed.
        assert_eq!(it.next(), Some(Ok('b')));
    }

    #[test]
    fn lone_low_surrogate() {
        let mut it = decode_utf16(&[0xDC00, 0x63]);
        let err = it.next().unwrap().unwrap_err();
        assert_eq!(err.offset(), 0);
        assert_eq!(it.next(), Some(Ok('c')));
    }

    #[test]
    fn restartable_by_clone() {
        let units = utf16("xy");
        let mut it = decode_utf16(&units);
        assert_eq!(it.next(), Some(Ok('x')));
        let again: Vec<_> = it.clone().collect();
        let rest: Vec<_> = it.collect();
        assert_eq!(again, rest);
    }

    #[test]
    fn replace_policy() {
        let units = [0x61, 0xDE00, 0x62];
        let chars: Result<Vec<char>, _> = decode_utf16(&units)
            .with_policy(DecodePolicy::Replace)
            .collect();
        assert_eq!(chars.unwrap(), ['a', '\u{FFFD}', 'b']);

        let strict: Result<Vec<char>, _> = decode_utf16(&units)
            .with_policy(DecodePolicy::Strict)
            .collect();
        assert!(strict.is_err());
    }

    #[test]
    fn agrees_with_core_decoder() {
        let units = [0xD83D, 0xDE00, 0xD800, 0x41, 0xDFFF, 0xDBFF, 0xDFFF];
        let ours: Vec<_> = decode_utf16(&units).map(|r| r.ok()).collect();
        let core: Vec<_> = char::decode_utf16(units).map(|r| r.ok()).collect();
        assert_eq!(ours, core);
    }

    #[test]
    fn position_and_remnant_follow_pairs() {
        let units = utf16("a😀b");
        let mut it = decode_utf16(&units);
        assert_eq!(it.position(), 0);
        assert_eq!(it.remnant(), &units[..]);

        it.next();
        it.next();
        assert_eq!(it.position(), 3);
        assert_eq!(it.remnant(), &[0x62_u16]);

        it.next();
        assert_eq!(it.position(), 4);
        assert!(it.remnant().is_empty());
    }

    #[test]
    fn position_moves_past_lone_surrogate() {
        let mut it = decode_utf16(&[0xD800, 0x62]);
        let err = it.next().unwrap().unwrap_err();
        assert_eq!(err.offset(), 0);
        assert_eq!(it.position(), 1);
        assert_eq!(it.remnant(), &[0x62_u16]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn policy_serde() {
        assert_eq!(serde_json::to_string(&DecodePolicy::Replace).unwrap(), "\"Replace\"");
        let policy: DecodePolicy = serde_json::from_str("\"Strict\"").unwrap();
        assert_eq!(policy, DecodePolicy::default());
    }
}
