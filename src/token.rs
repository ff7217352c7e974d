//! Provides low-level, token-based encoding.
//!
//! [`EncodeTokens`] walks a string slice and yields [`EncodedToken`]s: maximal
//! runs of safe characters borrowed straight from the input, and one rendered
//! escape per unsafe character. Nothing is allocated; collect or write the
//! tokens wherever they need to go.
//!
//! ```
//! use context_escape::{codec::HTML, token::{EncodedToken, encode_str}};
//!
//! let tokens: Vec<_> = encode_str(&HTML, "a<b").collect();
//! assert_eq!(tokens[0], EncodedToken::Literal("a"));
//! assert_eq!(tokens[1].as_str(), "&#60;");
//! assert_eq!(tokens[2], EncodedToken::Literal("b"));
//! ```

use core::{fmt, iter::FusedIterator};

use crate::{codec::Codec, format::Fragment};

/// Creates an iterator that yields tokens of `input` encoded with `codec`.
///
/// See the [module-level documentation](self) for more details.
#[inline]
pub fn encode_str<C: Codec>(codec: C, input: &str) -> EncodeTokens<'_, C> {
    EncodeTokens::new(codec, input)
}

/// A piece of encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedToken<'a> {
    /// A slice of the input that needed no escaping.
    Literal(&'a str),
    /// Output rendered by the encoder rather than borrowed from the input:
    /// the escape for one unsafe character, or a character that was split
    /// across two stream chunks.
    Escaped(Fragment),
}

impl EncodedToken<'_> {
    /// The text this token contributes to the output.
    #[inline(always)]
    pub fn as_str(&self) -> &str {
        match self {
            EncodedToken::Literal(s) => s,
            EncodedToken::Escaped(f) => f.as_str(),
        }
    }
}

impl AsRef<[u8]> for EncodedToken<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for EncodedToken<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An iterator over a string that yields [`EncodedToken`]s.
#[derive(Clone, Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EncodeTokens<'a, C> {
    codec: C,
    rest: &'a str,
}

impl<'a, C: Codec> EncodeTokens<'a, C> {
    /// Creates a new tokenizing encoder.
    #[inline]
    pub const fn new(codec: C, input: &'a str) -> Self {
        Self { codec, rest: input }
    }

    /// The codec driving this iterator.
    #[inline]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The part of the input that has not been consumed yet.
    #[inline]
    pub fn remnant(&self) -> &'a str {
        self.rest
    }

    /// Splits `s` at the first character `codec` does not accept.
    ///
    /// The first half is the safe literal prefix; the second is empty or
    /// starts with an unsafe character.
    #[inline]
    pub(crate) fn split_at_unsafe<'s>(codec: &C, s: &'s str) -> (&'s str, &'s str) {
        let pos = s
            .char_indices()
            .find(|&(_, c)| !codec.is_safe(c))
            .map_or(s.len(), |(i, _)| i);
        s.split_at(pos)
    }
}

impl<'a, C: Codec> Iterator for EncodeTokens<'a, C> {
    type Item = EncodedToken<'a>;

    fn next(&mut self) -> Option<EncodedToken<'a>> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            let (literal, rest) = Self::split_at_unsafe(&self.codec, self.rest);
            if !literal.is_empty() {
                self.rest = rest;
                return Some(EncodedToken::Literal(literal));
            }

            // The first character is unsafe.
            let mut chars = rest.chars();
            let c = chars.next()?;
            self.rest = chars.as_str();

            let escaped = self.codec.escape(c);
            // Omitted characters produce no token at all.
            if !escaped.is_empty() {
                return Some(EncodedToken::Escaped(escaped));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.rest.is_empty() {
            (0, Some(0))
        } else {
            // Omit can swallow everything; at worst every char is its own token.
            (0, Some(self.rest.len()))
        }
    }
}

impl<C: Codec> FusedIterator for EncodeTokens<'_, C> {}
