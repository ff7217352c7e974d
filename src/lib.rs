//! # Context-Sensitive String Escaping
//!
//! A small, `no_std` compatible library that makes untrusted text safe to splice
//! into one of four output contexts: HTML body text, an HTML attribute value, a
//! JavaScript string literal, or a CSS value. Each context has a codec that knows
//! which characters may pass through untouched and how to escape the rest so the
//! surrounding grammar reads them as text, never as syntax.
//!
//! The core is a lazy iterator, **[`Encode`]**, which walks the input once and
//! yields borrowed runs of safe text interleaved with rendered escapes.
//!
//! ## Key Features
//! - **Zero-Copy Literals**: runs of safe characters are borrowed from the input;
//!   escapes are rendered into a small stack buffer ([`format::Fragment`]).
//! - **Total Codecs**: every codec covers the whole code point range, so
//!   encoding a `&str` never fails.
//! - **UTF-16 Input**: [`encode_utf16`] decodes surrogate pairs first and reports
//!   unpaired surrogates as [`DecodeError`]s (or substitutes U+FFFD with
//!   [`encode_utf16_lossy`]).
//! - **Rule Sets** (with `alloc`): build your own codec from ordered
//!   guard/emitter rules, or load one from a JSON definition (with `serde`).
//! - **Streaming**: [`stream::EncodeStream`] encodes UTF-8 arriving in chunks,
//!   such as from a socket or file.
//!
//! ## Quick Start
//!
//! ```
//! use context_escape::{
//!     encode_for_css, encode_for_html, encode_for_html_attribute, encode_for_javascript_string,
//! };
//!
//! assert_eq!(encode_for_html("<a>"), "&#60;a&#62;");
//! assert_eq!(encode_for_html_attribute("a\"b"), "a&#34;b");
//! assert_eq!(encode_for_javascript_string("it's"), "it\\u0027s");
//! assert_eq!(encode_for_css("a b"), "a\\20 b");
//! ```
//!
//! ## Quick Start: Writing Through `Display`
//!
//! ```
//! use context_escape::{codec::HTML, encode};
//!
//! let name = "Tom & Jerry";
//! let html = format!("<p>Hello, {}!</p>", encode(&HTML, name));
//!
//! assert_eq!(html, "<p>Hello, Tom &#38; Jerry!</p>");
//! ```
#![no_std]
#![deny(missing_docs)]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::{borrow::Cow, string::String};

use core::{fmt, iter::FusedIterator};

// Debug events for codec construction. Never used per character.
#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! debug_event {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! debug_event {
    ($($arg:tt)*) => {};
}

pub mod code_point;
pub mod codec;
#[cfg(feature = "serde")]
pub mod definition;
pub mod format;
#[cfg(feature = "alloc")]
pub mod registry;
#[cfg(feature = "alloc")]
pub mod rules;
pub mod stream;
pub mod token;

use codec::Codec;
use token::{EncodeTokens, EncodedToken};

#[cfg(feature = "alloc")]
use code_point::{DecodePolicy, decode_utf16};

// =============================================================================
// Encode Implementation
// =============================================================================

/// Creates a lazy encoder for `input` under `codec`.
///
/// The returned [`Encode`] iterator processes the input on demand. `codec` is
/// taken by value; pass a reference (`&HTML`) to share a static codec.
///
/// # Examples
///
/// ```
/// use context_escape::{codec::CSS, encode};
///
/// let encoder = encode(&CSS, "a b");
/// let parts: Vec<String> = encoder.map(|t| t.to_string()).collect();
///
/// assert_eq!(parts, vec!["a", "\\20 ", "b"]);
/// ```
#[inline]
pub fn encode<C: Codec>(codec: C, input: &str) -> Encode<'_, C> {
    Encode {
        inner: EncodeTokens::new(codec, input),
    }
}

/// A streaming encoder that yields [`EncodedToken`]s.
///
/// This struct is created by the [`encode`] function. Safe stretches of input are
/// yielded as borrowed [`EncodedToken::Literal`]s; every unsafe character becomes
/// one [`EncodedToken::Escaped`].
///
/// ### Implemented Traits
/// - **`Iterator<Item = EncodedToken<'a>>`**: process the encoded parts one by one.
/// - **`Display`**: write the encoded content straight into any formatter.
/// - **`PartialEq<B: AsRef<[u8]>>`**: compare the full output with a string.
/// - **`From<Encode<'a, C>> for Cow<'a, str>`** (requires `alloc`): borrows when
///   nothing needed escaping.
#[derive(Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Encode<'a, C> {
    inner: EncodeTokens<'a, C>,
}

impl<'a, C: Codec> Encode<'a, C> {
    /// The part of the input not yet encoded.
    #[inline]
    pub fn remnant(&self) -> &'a str {
        self.inner.remnant()
    }

    /// A fresh token iterator over what is left, borrowing this encoder's codec.
    #[inline]
    fn restart(&self) -> EncodeTokens<'a, &C> {
        EncodeTokens::new(self.inner.codec(), self.inner.remnant())
    }

    /// Collects the encoded output into a `String`.
    ///
    /// **Requires the `alloc` feature.**
    #[cfg(feature = "alloc")]
    pub fn into_string(self) -> String {
        Cow::from(self).into_owned()
    }
}

impl<'a, C: Codec> Iterator for Encode<'a, C> {
    type Item = EncodedToken<'a>;

    #[inline]
    fn next(&mut self) -> Option<EncodedToken<'a>> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<C: Codec> FusedIterator for Encode<'_, C> {}

impl<C: Codec> fmt::Display for Encode<'_, C> {
    /// Writes the encoded output without intermediate allocation.
    ///
    /// # Example
    ///
    /// ```
    /// use context_escape::{codec::JAVASCRIPT_STRING, encode};
    ///
    /// let script = format!("var msg = '{}';", encode(&JAVASCRIPT_STRING, "it's\n"));
    /// assert_eq!(script, "var msg = 'it\\u0027s\\n';");
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in self.restart() {
            f.write_str(token.as_str())?
        }
        Ok(())
    }
}

impl<C: Codec> fmt::Debug for Encode<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encode")
            .field("codec", &self.inner.codec().name())
            .finish_non_exhaustive()
    }
}

impl<C: Codec, B: AsRef<[u8]> + ?Sized> PartialEq<B> for Encode<'_, C> {
    /// Compares the encoded output with any byte-slice-like object.
    ///
    /// # Example
    ///
    /// ```
    /// use context_escape::{codec::HTML, encode};
    ///
    /// assert_eq!(encode(&HTML, "1 < 2"), "1 &#60; 2");
    /// ```
    fn eq(&self, other: &B) -> bool {
        let mut other = other.as_ref();
        for token in self.restart() {
            let chunk = token.as_str().as_bytes();
            if !other.starts_with(chunk) {
                return false;
            }
            other = &other[chunk.len()..];
        }
        other.is_empty()
    }
}

impl<'a, 'b, C1: Codec, C2: Codec> PartialEq<Encode<'a, C2>> for Encode<'b, C1> {
    /// Two encoders are equal if they produce the same output, whatever their
    /// codecs or token boundaries.
    fn eq(&self, other: &Encode<'a, C2>) -> bool {
        chunks_eq(self.restart(), other.restart())
    }
}

#[cfg(feature = "alloc")]
impl<'a, C: Codec> From<Encode<'a, C>> for Cow<'a, str> {
    /// Collects the encoded output, borrowing the input when nothing needed
    /// escaping.
    ///
    /// ```
    /// use context_escape::{codec::HTML, encode};
    /// use std::borrow::Cow;
    ///
    /// let borrowed: Cow<str> = encode(&HTML, "plain text").into();
    /// assert!(matches!(borrowed, Cow::Borrowed(_)));
    ///
    /// let owned: Cow<str> = encode(&HTML, "a & b").into();
    /// assert!(matches!(owned, Cow::Owned(_)));
    /// assert_eq!(owned, "a &#38; b");
    /// ```
    fn from(mut iter: Encode<'a, C>) -> Self {
        let first = match iter.next() {
            None => return Cow::Borrowed(""),
            Some(first) => first,
        };
        let second = iter.next();
        if let (EncodedToken::Literal(s), None) = (first, second) {
            return Cow::Borrowed(s);
        }

        // Escapes only grow the output.
        let mut string = String::with_capacity(first.as_str().len() + iter.remnant().len() + 16);
        string.push_str(first.as_str());
        if let Some(second) = second {
            string.push_str(second.as_str());
        }
        for token in iter {
            string.push_str(token.as_str());
        }
        Cow::Owned(string)
    }
}

// =============================================================================
// Per-Context Entry Points
// =============================================================================

/// Encodes `input` for HTML body text.
///
/// ```
/// use context_escape::encode_for_html;
///
/// assert_eq!(encode_for_html("<b>Fish & Chips</b>"), "&#60;b&#62;Fish &#38; Chips&#60;/b&#62;");
/// ```
#[cfg(feature = "alloc")]
#[inline]
pub fn encode_for_html(input: &str) -> String {
    encode(&codec::HTML, input).into_string()
}

/// Encodes `input` for an HTML attribute value.
///
/// The output is safe in double-quoted, single-quoted and unquoted values. Use
/// [`codec::HtmlAttribute`] with [`codec::AttributeQuoting::Quoted`] to keep
/// spaces readable when the value is always quoted.
///
/// ```
/// use context_escape::encode_for_html_attribute;
///
/// assert_eq!(encode_for_html_attribute("x\" onload=\"y"), "x&#34;&#32;onload&#61;&#34;y");
/// ```
#[cfg(feature = "alloc")]
#[inline]
pub fn encode_for_html_attribute(input: &str) -> String {
    encode(&codec::HTML_ATTRIBUTE, input).into_string()
}

/// Encodes `input` for the inside of a JavaScript string literal.
///
/// ```
/// use context_escape::encode_for_javascript_string;
///
/// assert_eq!(
///     encode_for_javascript_string("</script>"),
///     "\\u003c/script\\u003e"
/// );
/// ```
#[cfg(feature = "alloc")]
#[inline]
pub fn encode_for_javascript_string(input: &str) -> String {
    encode(&codec::JAVASCRIPT_STRING, input).into_string()
}

/// Encodes `input` for a CSS value or identifier.
///
/// ```
/// use context_escape::encode_for_css;
///
/// assert_eq!(encode_for_css("red;}"), "red\\3b \\7d ");
/// ```
#[cfg(feature = "alloc")]
#[inline]
pub fn encode_for_css(input: &str) -> String {
    encode(&codec::CSS, input).into_string()
}

// =============================================================================
// UTF-16 Input
// =============================================================================

/// Encodes UTF-16 input, failing on the first unpaired surrogate.
///
/// No partial output is returned on error.
///
/// ```
/// use context_escape::{codec::HTML, encode_utf16};
///
/// let units: Vec<u16> = "<é>".encode_utf16().collect();
/// assert_eq!(encode_utf16(&HTML, &units).unwrap(), "&#60;&#233;&#62;");
///
/// let err = encode_utf16(&HTML, &[0x61, 0xD800]).unwrap_err();
/// assert_eq!(err.offset(), 1);
/// ```
#[cfg(feature = "alloc")]
pub fn encode_utf16<C: Codec>(codec: C, units: &[u16]) -> Result<String, DecodeError> {
    encode_utf16_with_policy(codec, units, DecodePolicy::Strict)
}

/// Encodes UTF-16 input, replacing unpaired surrogates with U+FFFD before
/// they reach the codec.
#[cfg(feature = "alloc")]
pub fn encode_utf16_lossy<C: Codec>(codec: C, units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len());
    for c in decode_utf16(units) {
        push_encoded(&codec, &mut out, c.unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}

/// Encodes UTF-16 input under an explicit [`DecodePolicy`].
#[cfg(feature = "alloc")]
pub fn encode_utf16_with_policy<C: Codec>(
    codec: C,
    units: &[u16],
    policy: DecodePolicy,
) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(units.len());
    for c in decode_utf16(units).with_policy(policy) {
        push_encoded(&codec, &mut out, c?);
    }
    Ok(out)
}

#[cfg(feature = "alloc")]
#[inline]
fn push_encoded<C: Codec>(codec: &C, out: &mut String, c: char) {
    if codec.is_safe(c) {
        out.push(c);
    } else {
        out.push_str(&codec.escape(c));
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Details of an unpaired UTF-16 surrogate.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct LoneSurrogateError {
    /// The 16-bit surrogate code unit.
    pub surrogate: u16,
}

/// Details of a malformed UTF-8 sequence.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct InvalidUtf8Error {
    /// Number of bytes that form the invalid sequence.
    pub len: u8,
}

/// The specific kind of error that can occur while decoding input into code
/// points.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// A high surrogate without a following low one, or a stray low surrogate.
    LoneSurrogate(LoneSurrogateError),
    /// Bytes that are not valid UTF-8.
    InvalidUtf8(InvalidUtf8Error),
    /// Input ended in the middle of a multi-byte sequence.
    UnexpectedEof,
}

/// An error that can occur while decoding input into code points.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
pub struct DecodeError {
    /// The specific kind of decoding error.
    pub(crate) kind: DecodeErrorKind,
    /// Position of the offending unit, counted in input units (bytes for UTF-8,
    /// 16-bit units for UTF-16) from the start of the input.
    pub(crate) offset: usize,
}

impl DecodeError {
    /// Returns the specific kind of error that occurred.
    ///
    /// ```
    /// # use context_escape::{codec::CSS, encode_utf16, DecodeErrorKind, LoneSurrogateError};
    /// let err = encode_utf16(&CSS, &[0xDC00]).unwrap_err();
    ///
    /// match err.kind() {
    ///     DecodeErrorKind::LoneSurrogate(LoneSurrogateError { surrogate, .. }) => {
    ///         assert_eq!(surrogate, 0xDC00);
    ///     }
    ///     _ => panic!("expected a lone surrogate"),
    /// }
    /// ```
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Position of the offending unit in the input.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::LoneSurrogate(e) => write!(
                f,
                "lone surrogate found: 0x{:04X} at offset {}",
                e.surrogate, self.offset
            ),
            DecodeErrorKind::InvalidUtf8(e) => write!(
                f,
                "invalid utf-8 sequence of {} bytes at offset {}",
                e.len, self.offset
            ),
            DecodeErrorKind::UnexpectedEof => write!(
                f,
                "unexpected end of input inside a multi-byte sequence at offset {}",
                self.offset
            ),
        }
    }
}

impl core::error::Error for DecodeError {}

// =============================================================================
// Utilities
// =============================================================================

/// Advances `iter` until `chunk[pos..]` is non-empty. Returns `false` once the
/// iterator is exhausted.
fn refill<T, I>(iter: &mut I, chunk: &mut Option<T>, pos: &mut usize) -> bool
where
    T: AsRef<[u8]>,
    I: Iterator<Item = T>,
{
    loop {
        if let Some(c) = chunk {
            if *pos < c.as_ref().len() {
                return true;
            }
        }
        match iter.next() {
            Some(next) => {
                *chunk = Some(next);
                *pos = 0;
            }
            None => {
                *chunk = None;
                return false;
            }
        }
    }
}

/// Compare two chunk-iterators by their concatenated byte stream, without
/// allocating.
///
/// Chunks are owned here (escapes live in stack fragments), so each side keeps
/// its current chunk plus a read position and carries the unread remainder
/// into the next round.
fn chunks_eq<A, B, I1, I2>(mut a: I1, mut b: I2) -> bool
where
    A: AsRef<[u8]>,
    B: AsRef<[u8]>,
    I1: Iterator<Item = A>,
    I2: Iterator<Item = B>,
{
    let (mut a_chunk, mut a_pos) = (None, 0);
    let (mut b_chunk, mut b_pos) = (None, 0);

    loop {
        let a_more = refill(&mut a, &mut a_chunk, &mut a_pos);
        let b_more = refill(&mut b, &mut b_chunk, &mut b_pos);

        let (a_rem, b_rem) = match (&a_chunk, &b_chunk) {
            (Some(a_c), Some(b_c)) if a_more && b_more => {
                (&a_c.as_ref()[a_pos..], &b_c.as_ref()[b_pos..])
            }
            // Equal only if both ran out together.
            _ => return a_more == b_more,
        };

        let n = a_rem.len().min(b_rem.len());
        if a_rem[..n] != b_rem[..n] {
            return false;
        }

        a_pos += n;
        b_pos += n;
    }
}
