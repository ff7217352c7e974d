//! Escape formatters and the inline buffer they write into.
//!
//! Every codec renders an unsafe code point through one of four numeric
//! strategies ([`EscapeFormatter`]) wrapped in whatever delimiters its grammar
//! needs. The result of a single escape is a [`Fragment`], a small stack buffer,
//! so escaping never allocates per character.

use core::{fmt, ops::Deref, str};

/// A reusable rendering strategy for a single code point.
///
/// Formatters never add delimiters; the codec that uses them supplies the
/// surrounding syntax (`&#...;`, `\u....`, `\... `).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EscapeFormatter {
    /// The code point as a base-10 numeral (`60` for `<`).
    #[cfg_attr(feature = "serde", serde(rename = "DEC"))]
    Decimal,
    /// The code point as a lowercase base-16 numeral, unpadded (`3c` for `<`).
    #[cfg_attr(feature = "serde", serde(rename = "HEX"))]
    Hexadecimal,
    /// Nothing at all.
    #[cfg_attr(feature = "serde", serde(rename = "NOP"))]
    Omit,
    /// The character itself.
    #[cfg_attr(feature = "serde", serde(rename = "IDENTITY"))]
    Identity,
}

impl EscapeFormatter {
    /// Appends the rendering of `c` to `out`.
    ///
    /// # Example
    ///
    /// ```
    /// use context_escape::format::{EscapeFormatter, Fragment};
    ///
    /// let mut out = Fragment::new();
    /// EscapeFormatter::Hexadecimal.write(&mut out, '\u{2028}');
    /// assert_eq!(out, "2028");
    /// ```
    #[inline]
    pub fn write(self, out: &mut Fragment, c: char) {
        match self {
            EscapeFormatter::Decimal => out.push_decimal(c as u32),
            EscapeFormatter::Hexadecimal => out.push_hex(c as u32, 0),
            EscapeFormatter::Omit => {}
            EscapeFormatter::Identity => out.push_char(c),
        }
    }

    /// The most bytes this formatter can produce for any code point.
    pub const fn max_len(self) -> usize {
        match self {
            // 1114111
            EscapeFormatter::Decimal => 7,
            // 10ffff
            EscapeFormatter::Hexadecimal => 6,
            EscapeFormatter::Omit => 0,
            EscapeFormatter::Identity => 4,
        }
    }

    /// The builtin name used in codec definitions (`DEC`, `HEX`, `NOP`, `IDENTITY`).
    pub const fn name(self) -> &'static str {
        match self {
            EscapeFormatter::Decimal => "DEC",
            EscapeFormatter::Hexadecimal => "HEX",
            EscapeFormatter::Omit => "NOP",
            EscapeFormatter::Identity => "IDENTITY",
        }
    }

    /// Looks up a formatter by its builtin name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DEC" => Some(EscapeFormatter::Decimal),
            "HEX" => Some(EscapeFormatter::Hexadecimal),
            "NOP" => Some(EscapeFormatter::Omit),
            "IDENTITY" => Some(EscapeFormatter::Identity),
            _ => None,
        }
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// The rendered escape of one code point.
///
/// A fixed-capacity UTF-8 buffer that lives on the stack. Codecs guarantee that
/// everything they write fits in [`Fragment::CAPACITY`] bytes: the built-in ones
/// by construction, rule sets by a check when they are built.
#[derive(Clone, Copy)]
pub struct Fragment {
    buf: [u8; Fragment::CAPACITY],
    len: u8,
}

impl Fragment {
    /// Maximum number of bytes a fragment holds.
    pub const CAPACITY: usize = 32;

    /// Creates an empty fragment.
    #[inline]
    pub const fn new() -> Self {
        Self {
            buf: [0; Self::CAPACITY],
            len: 0,
        }
    }

    /// Returns the fragment's contents.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: only whole `&str`s, whole encoded chars and ASCII digits are
        // ever copied into `buf`, so `buf[..len]` is always valid UTF-8.
        unsafe { str::from_utf8_unchecked(&self.buf[..self.len as usize]) }
    }

    /// The length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        Self::CAPACITY - self.len as usize
    }

    #[inline]
    fn push_bytes(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        // Codecs size their output up front; overflowing here is a codec bug.
        debug_assert!(
            bytes.len() <= self.remaining(),
            "escape fragment overflow: {} + {} bytes",
            start,
            bytes.len()
        );
        let n = bytes.len().min(self.remaining());
        self.buf[start..start + n].copy_from_slice(&bytes[..n]);
        self.len += n as u8;
    }

    /// Appends a string slice.
    #[inline]
    pub fn push_str(&mut self, s: &str) {
        if s.len() <= self.remaining() {
            self.push_bytes(s.as_bytes());
        } else {
            debug_assert!(false, "escape fragment overflow");
        }
    }

    /// Appends a character, UTF-8 encoded.
    #[inline]
    pub fn push_char(&mut self, c: char) {
        let mut tmp = [0u8; 4];
        self.push_str(c.encode_utf8(&mut tmp));
    }

    /// Appends `value` as a base-10 numeral.
    pub fn push_decimal(&mut self, mut value: u32) {
        // u32::MAX has 10 digits.
        let mut digits = [0u8; 10];
        let mut i = digits.len();
        loop {
            i -= 1;
            digits[i] = b'0' + (value % 10) as u8;
            value /= 10;
            if value == 0 {
                break;
            }
        }
        self.push_bytes(&digits[i..]);
    }

    /// Appends `value` as a lowercase base-16 numeral, left-padded with zeros
    /// to at least `min_width` digits.
    pub fn push_hex(&mut self, mut value: u32, min_width: usize) {
        let mut digits = [b'0'; 8];
        let mut i = digits.len();
        loop {
            i -= 1;
            digits[i] = HEX_DIGITS[(value & 0xF) as usize];
            value >>= 4;
            if value == 0 {
                break;
            }
        }
        let start = i.min(digits.len().saturating_sub(min_width));
        self.push_bytes(&digits[start..]);
    }
}

impl Default for Fragment {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Fragment {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Fragment {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<[u8]> for Fragment {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Fragment {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl PartialEq for Fragment {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Fragment {}

impl PartialEq<str> for Fragment {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Fragment {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(formatter: EscapeFormatter, c: char) -> Fragment {
        let mut out = Fragment::new();
        formatter.write(&mut out, c);
        out
    }

    #[test]
    fn decimal() {
        assert_eq!(render(EscapeFormatter::Decimal, '\0'), "0");
        assert_eq!(render(EscapeFormatter::Decimal, '<'), "60");
        assert_eq!(render(EscapeFormatter::Decimal, '\u{10FFFF}'), "1114111");
    }

    #[test]
    fn hexadecimal_is_lowercase_and_unpadded() {
        assert_eq!(render(EscapeFormatter::Hexadecimal, '\0'), "0");
        assert_eq!(render(EscapeFormatter::Hexadecimal, ' '), "20");
        assert_eq!(render(EscapeFormatter::Hexadecimal, '\u{FEFF}'), "feff");
        assert_eq!(render(EscapeFormatter::Hexadecimal, '\u{10FFFF}'), "10ffff");
    }

    #[test]
    fn omit_and_identity() {
        assert!(render(EscapeFormatter::Omit, 'x').is_empty());
        assert_eq!(render(EscapeFormatter::Identity, 'x'), "x");
        assert_eq!(render(EscapeFormatter::Identity, '😀'), "😀");
    }

    #[test]
    fn hex_padding() {
        let mut out = Fragment::new();
        out.push_hex(0x27, 4);
        assert_eq!(out, "0027");

        let mut out = Fragment::new();
        out.push_hex(0x1F600, 4);
        assert_eq!(out, "1f600");
    }

    #[test]
    fn max_len_bounds_every_scalar() {
        for formatter in [
            EscapeFormatter::Decimal,
            EscapeFormatter::Hexadecimal,
            EscapeFormatter::Omit,
            EscapeFormatter::Identity,
        ] {
            for c in ['\0', '\u{7F}', '\u{FFFF}', '\u{10000}', char::MAX] {
                assert!(render(formatter, c).len() <= formatter.max_len());
            }
        }
    }

    #[test]
    fn names_round_trip() {
        for name in ["DEC", "HEX", "NOP", "IDENTITY"] {
            assert_eq!(EscapeFormatter::from_name(name).map(|f| f.name()), Some(name));
        }
        assert_eq!(EscapeFormatter::from_name("OCT"), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_builtin_names() {
        for formatter in [
            EscapeFormatter::Decimal,
            EscapeFormatter::Hexadecimal,
            EscapeFormatter::Omit,
            EscapeFormatter::Identity,
        ] {
            let json = serde_json::to_string(&formatter).unwrap();
            assert_eq!(json.trim_matches('"'), formatter.name());
            assert_eq!(serde_json::from_str::<EscapeFormatter>(&json).unwrap(), formatter);
        }
        assert!(serde_json::from_str::<EscapeFormatter>("\"Decimal\"").is_err());
    }
}
