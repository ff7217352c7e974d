//! Per-context codecs.
//!
//! A [`Codec`] pairs a safety predicate with an escape formatter. The predicate
//! decides from the code point alone whether it may pass through unchanged.
//! The formatter renders everything else as an escape the target grammar reads
//! back as the original character, never as syntax.
//!
//! | Codec                | Safe                                   | Escape form           |
//! |----------------------|----------------------------------------|-----------------------|
//! | [`Html`]             | printable ASCII but `< > & " '`, TAB/LF/CR | `&#60;`           |
//! | [`HtmlAttribute`]    | depends on [`AttributeQuoting`]        | `&#34;`               |
//! | [`JavaScriptString`] | printable, minus quotes, `\`, `< > &`  | `\n`, `\u0027`        |
//! | [`Css`]              | ASCII letters and digits               | `\20 ` (trailing space) |

use crate::format::{EscapeFormatter, Fragment};

/// The capability shared by every escaping context.
///
/// Implementations must be total over all `char`s: `escape` has to produce a
/// fragment for any code point `is_safe` rejects, and that fragment must not
/// contain anything the target context would read as a delimiter.
pub trait Codec {
    /// The context name, e.g. `"HTML"`.
    fn name(&self) -> &str;

    /// Returns `true` if `c` can be copied to the output unchanged.
    fn is_safe(&self, c: char) -> bool;

    /// Renders an unsafe code point.
    fn escape(&self, c: char) -> Fragment;
}

impl<C: Codec + ?Sized> Codec for &C {
    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        (**self).is_safe(c)
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        (**self).escape(c)
    }
}

#[cfg(feature = "alloc")]
impl<C: Codec + ?Sized> Codec for alloc::boxed::Box<C> {
    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        (**self).is_safe(c)
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        (**self).escape(c)
    }
}

/// The HTML body text codec.
pub static HTML: Html = Html;

/// The HTML attribute codec, safe for quoted and unquoted values alike.
pub static HTML_ATTRIBUTE: HtmlAttribute = HtmlAttribute::new(AttributeQuoting::Unquoted);

/// The JavaScript string literal codec.
pub static JAVASCRIPT_STRING: JavaScriptString = JavaScriptString;

/// The CSS codec.
pub static CSS: Css = Css;

// Bit tables for the ASCII range, bit `c` set means `c` is safe.

const fn ascii_mask(lo: u8, hi: u8) -> u128 {
    let mut mask = 0u128;
    let mut c = lo;
    while c <= hi {
        mask |= 1 << c;
        c += 1;
    }
    mask
}

const fn without(mut mask: u128, chars: &[u8]) -> u128 {
    let mut i = 0;
    while i < chars.len() {
        mask &= !(1 << chars[i]);
        i += 1;
    }
    mask
}

const fn with(mut mask: u128, chars: &[u8]) -> u128 {
    let mut i = 0;
    while i < chars.len() {
        mask |= 1 << chars[i];
        i += 1;
    }
    mask
}

const PRINTABLE: u128 = ascii_mask(b' ', b'~');

const HTML_SAFE: u128 = with(without(PRINTABLE, b"<>&\"'"), b"\t\n\r");

const ATTRIBUTE_QUOTED_SAFE: u128 = without(PRINTABLE, b"<>&\"'");

const ATTRIBUTE_UNQUOTED_SAFE: u128 = without(ATTRIBUTE_QUOTED_SAFE, b" =`");

const JAVASCRIPT_SAFE: u128 = without(PRINTABLE, b"\"'`\\<>&");

const CSS_SAFE: u128 =
    ascii_mask(b'0', b'9') | ascii_mask(b'A', b'Z') | ascii_mask(b'a', b'z');

#[inline(always)]
fn in_mask(mask: u128, c: char) -> bool {
    let c = c as u32;
    c < 128 && mask & (1 << c) != 0
}

/// `&#<decimal>;`
#[inline]
fn numeric_reference(c: char) -> Fragment {
    let mut out = Fragment::new();
    out.push_str("&#");
    EscapeFormatter::Decimal.write(&mut out, c);
    out.push_str(";");
    out
}

/// Escapes for HTML body text.
///
/// Markup characters, quotes, control characters and everything outside ASCII
/// become decimal numeric character references.
///
/// ```
/// use context_escape::codec::{Codec, HTML};
///
/// assert!(HTML.is_safe('a'));
/// assert_eq!(HTML.escape('<'), "&#60;");
/// assert_eq!(HTML.escape('é'), "&#233;");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Html;

impl Codec for Html {
    #[inline]
    fn name(&self) -> &str {
        "HTML"
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        in_mask(HTML_SAFE, c)
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        numeric_reference(c)
    }
}

/// How the caller delimits the attribute value an escaped string is spliced into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeQuoting {
    /// `name="..."` or `name='...'`.
    Quoted,
    /// `name=...`. Output for this style is also safe inside either quote.
    #[default]
    Unquoted,
}

/// Escapes for HTML attribute values.
///
/// Whitespace is always escaped since attribute value normalization would
/// otherwise rewrite it. For [`AttributeQuoting::Unquoted`] values, space,
/// `=` and `` ` `` are escaped as well.
///
/// ```
/// use context_escape::codec::{AttributeQuoting, Codec, HtmlAttribute};
///
/// let quoted = HtmlAttribute::new(AttributeQuoting::Quoted);
/// let unquoted = HtmlAttribute::new(AttributeQuoting::Unquoted);
///
/// assert!(quoted.is_safe(' '));
/// assert!(!unquoted.is_safe(' '));
/// assert_eq!(unquoted.escape('"'), "&#34;");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HtmlAttribute {
    quoting: AttributeQuoting,
}

impl HtmlAttribute {
    /// Creates an attribute codec for the given quoting style.
    #[inline]
    pub const fn new(quoting: AttributeQuoting) -> Self {
        Self { quoting }
    }

    /// The quoting style this codec assumes.
    #[inline]
    pub const fn quoting(&self) -> AttributeQuoting {
        self.quoting
    }
}

impl Codec for HtmlAttribute {
    #[inline]
    fn name(&self) -> &str {
        "HTMLAttribute"
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        match self.quoting {
            AttributeQuoting::Quoted => in_mask(ATTRIBUTE_QUOTED_SAFE, c),
            AttributeQuoting::Unquoted => in_mask(ATTRIBUTE_UNQUOTED_SAFE, c),
        }
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        numeric_reference(c)
    }
}

/// Escapes for the body of a JavaScript string literal, quoted with `"`, `'`
/// or `` ` ``.
///
/// Quotes are written as `\u0022`/`\u0027`/`\u0060` rather than `\"` so the
/// output stays safe when the script itself sits inside an HTML attribute.
/// `<`, `>` and `&` are escaped for the same reason in inline `<script>` blocks.
/// U+2028 and U+2029 terminate lines in older engines and are always escaped.
///
/// ```
/// use context_escape::codec::{Codec, JAVASCRIPT_STRING};
///
/// assert_eq!(JAVASCRIPT_STRING.escape('\n'), "\\n");
/// assert_eq!(JAVASCRIPT_STRING.escape('\''), "\\u0027");
/// assert_eq!(JAVASCRIPT_STRING.escape('\u{2028}'), "\\u2028");
/// assert!(JAVASCRIPT_STRING.is_safe('é'));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JavaScriptString;

const LINE_SEPARATOR: char = '\u{2028}';
const PARAGRAPH_SEPARATOR: char = '\u{2029}';

impl JavaScriptString {
    fn push_unicode_escape(out: &mut Fragment, unit: u32) {
        out.push_str("\\u");
        out.push_hex(unit, 4);
    }
}

impl Codec for JavaScriptString {
    #[inline]
    fn name(&self) -> &str {
        "JavaScriptString"
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        if c.is_ascii() {
            return in_mask(JAVASCRIPT_SAFE, c);
        }
        // C1 controls, and the two characters that end a line in JavaScript.
        c >= '\u{A0}' && c != LINE_SEPARATOR && c != PARAGRAPH_SEPARATOR
    }

    fn escape(&self, c: char) -> Fragment {
        let mut out = Fragment::new();
        match c {
            '\u{08}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{0C}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    Self::push_unicode_escape(&mut out, *unit as u32);
                }
            }
        }
        out
    }
}

/// Escapes for CSS string values and identifiers.
///
/// Only ASCII letters and digits pass through. Everything else is written as a
/// hex escape followed by a space. The space ends the escape so that a
/// following hex digit is not absorbed into it, and the CSS tokenizer
/// discards it.
///
/// ```
/// use context_escape::codec::{Codec, CSS};
///
/// assert_eq!(CSS.escape(' '), "\\20 ");
/// assert_eq!(CSS.escape('"'), "\\22 ");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Css;

impl Codec for Css {
    #[inline]
    fn name(&self) -> &str {
        "CSS"
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        in_mask(CSS_SAFE, c)
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        let mut out = Fragment::new();
        out.push_str("\\");
        EscapeFormatter::Hexadecimal.write(&mut out, c);
        out.push_str(" ");
        out
    }
}

/// The closed set of built-in contexts.
///
/// Dispatches to the matching codec, so a driver written against [`Codec`]
/// works the same for every variant.
///
/// ```
/// use context_escape::{codec::Context, encode};
///
/// let context: Context = "CSS".parse().unwrap();
/// assert_eq!(encode(&context, "a b"), "a\\20 b");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Context {
    /// HTML body text.
    Html,
    /// An HTML attribute value.
    HtmlAttribute(AttributeQuoting),
    /// The body of a JavaScript string literal.
    JavaScriptString,
    /// A CSS value or identifier.
    Css,
}

impl Context {
    /// Every built-in context with its default configuration.
    pub const ALL: [Context; 4] = [
        Context::Html,
        Context::HtmlAttribute(AttributeQuoting::Unquoted),
        Context::JavaScriptString,
        Context::Css,
    ];

    /// Looks up a context by its codec name (`HTML`, `HTMLAttribute`,
    /// `JavaScriptString`, `CSS`), ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|context| context.name().eq_ignore_ascii_case(name))
    }
}

impl Codec for Context {
    #[inline]
    fn name(&self) -> &str {
        match self {
            Context::Html => Html.name(),
            Context::HtmlAttribute(_) => "HTMLAttribute",
            Context::JavaScriptString => JavaScriptString.name(),
            Context::Css => Css.name(),
        }
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        match *self {
            Context::Html => Html.is_safe(c),
            Context::HtmlAttribute(quoting) => HtmlAttribute::new(quoting).is_safe(c),
            Context::JavaScriptString => JavaScriptString.is_safe(c),
            Context::Css => Css.is_safe(c),
        }
    }

    #[inline]
    fn escape(&self, c: char) -> Fragment {
        match *self {
            Context::Html => Html.escape(c),
            Context::HtmlAttribute(quoting) => HtmlAttribute::new(quoting).escape(c),
            Context::JavaScriptString => JavaScriptString.escape(c),
            Context::Css => Css.escape(c),
        }
    }
}

/// Error returned when parsing an unknown context name.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct UnknownContextError;

impl core::fmt::Display for UnknownContextError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("unknown escaping context")
    }
}

impl core::error::Error for UnknownContextError {}

impl core::str::FromStr for Context {
    type Err = UnknownContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or(UnknownContextError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escapes(codec: &impl Codec) -> impl Iterator<Item = (char, Fragment)> + '_ {
        (0..=char::MAX as u32)
            .filter_map(char::from_u32)
            .filter(|&c| !codec.is_safe(c))
            .map(|c| (c, codec.escape(c)))
    }

    #[test]
    fn html_safe_set() {
        for c in "abcXYZ019 !#$%()*+,-./:;=?@[]^_`{|}~\t\n\r".chars() {
            assert!(HTML.is_safe(c), "{c:?} should be safe");
        }
        for c in "<>&\"'\0\u{7F}\u{80}é😀".chars() {
            assert!(!HTML.is_safe(c), "{c:?} should be unsafe");
        }
    }

    #[test]
    fn html_escapes() {
        assert_eq!(HTML.escape('<'), "&#60;");
        assert_eq!(HTML.escape('>'), "&#62;");
        assert_eq!(HTML.escape('&'), "&#38;");
        assert_eq!(HTML.escape('"'), "&#34;");
        assert_eq!(HTML.escape('\''), "&#39;");
        assert_eq!(HTML.escape('\0'), "&#0;");
        assert_eq!(HTML.escape('😀'), "&#128512;");
    }

    #[test]
    fn attribute_quoting_styles() {
        let quoted = HtmlAttribute::new(AttributeQuoting::Quoted);
        for c in " =`".chars() {
            assert!(quoted.is_safe(c));
            assert!(!HTML_ATTRIBUTE.is_safe(c));
        }
        for codec in [quoted, HTML_ATTRIBUTE] {
            for c in "\"'<>&\t\n\r".chars() {
                assert!(!codec.is_safe(c), "{c:?}");
            }
        }
        assert_eq!(HTML_ATTRIBUTE.quoting(), AttributeQuoting::Unquoted);
        assert_eq!(HtmlAttribute::default(), HTML_ATTRIBUTE);
    }

    #[test]
    fn javascript_named_escapes() {
        assert_eq!(JAVASCRIPT_STRING.escape('\u{08}'), "\\b");
        assert_eq!(JAVASCRIPT_STRING.escape('\t'), "\\t");
        assert_eq!(JAVASCRIPT_STRING.escape('\n'), "\\n");
        assert_eq!(JAVASCRIPT_STRING.escape('\u{0C}'), "\\f");
        assert_eq!(JAVASCRIPT_STRING.escape('\r'), "\\r");
        assert_eq!(JAVASCRIPT_STRING.escape('\\'), "\\\\");
    }

    #[test]
    fn javascript_unicode_escapes() {
        assert_eq!(JAVASCRIPT_STRING.escape('\0'), "\\u0000");
        assert_eq!(JAVASCRIPT_STRING.escape('"'), "\\u0022");
        assert_eq!(JAVASCRIPT_STRING.escape('<'), "\\u003c");
        assert_eq!(JAVASCRIPT_STRING.escape('\u{85}'), "\\u0085");
        assert_eq!(JAVASCRIPT_STRING.escape('\u{2029}'), "\\u2029");
        // Not reachable from the predicate, but still total.
        assert_eq!(JAVASCRIPT_STRING.escape('😀'), "\\ud83d\\ude00");
    }

    #[test]
    fn javascript_is_permissive_above_latin1_controls() {
        for c in "é€中😀\u{A0}".chars() {
            assert!(JAVASCRIPT_STRING.is_safe(c), "{c:?}");
        }
        for c in "\u{7F}\u{80}\u{9F}\u{2028}\u{2029}`".chars() {
            assert!(!JAVASCRIPT_STRING.is_safe(c), "{c:?}");
        }
    }

    #[test]
    fn css_only_alphanumerics() {
        let safe = (0u8..128)
            .map(char::from)
            .filter(|&c| CSS.is_safe(c))
            .count();
        assert_eq!(safe, 62);
        assert_eq!(CSS.escape('\0'), "\\0 ");
        assert_eq!(CSS.escape('é'), "\\e9 ");
        assert_eq!(CSS.escape(char::MAX), "\\10ffff ");
    }

    #[test]
    fn no_escape_contains_a_delimiter() {
        for (c, escaped) in escapes(&HTML).chain(escapes(&HTML_ATTRIBUTE)) {
            assert!(!escaped.is_empty(), "{c:?}");
            assert!(
                !escaped.contains(['<', '>', '"', '\'', ' ', '`', '=']),
                "{c:?} -> {escaped:?}"
            );
        }
        for (c, escaped) in escapes(&JAVASCRIPT_STRING) {
            assert!(
                !escaped.contains(['"', '\'', '`', '<', '>', '\n', '\r']),
                "{c:?} -> {escaped:?}"
            );
        }
        for (c, escaped) in escapes(&CSS) {
            assert!(escaped.starts_with('\\') && escaped.ends_with(' '), "{c:?}");
            assert!(
                escaped[1..escaped.len() - 1].bytes().all(|b| b.is_ascii_hexdigit()),
                "{c:?} -> {escaped:?}"
            );
        }
    }

    #[test]
    fn context_dispatch_matches_codecs() {
        for c in ['a', ' ', '<', '\'', '\u{2028}', 'é', '😀'] {
            assert_eq!(Context::Html.is_safe(c), HTML.is_safe(c));
            assert_eq!(Context::Css.escape(c), CSS.escape(c));
            assert_eq!(
                Context::JavaScriptString.escape(c),
                JAVASCRIPT_STRING.escape(c)
            );
            assert_eq!(
                Context::HtmlAttribute(AttributeQuoting::Quoted).is_safe(c),
                HtmlAttribute::new(AttributeQuoting::Quoted).is_safe(c)
            );
        }
    }

    #[test]
    fn context_names() {
        for context in Context::ALL {
            assert_eq!(Context::from_name(context.name()), Some(context));
        }
        assert_eq!("html".parse::<Context>(), Ok(Context::Html));
        assert_eq!("url".parse::<Context>(), Err(UnknownContextError));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn attribute_quoting_serde() {
        let json = serde_json::to_string(&AttributeQuoting::Quoted).unwrap();
        assert_eq!(json, "\"Quoted\"");
        let quoting: AttributeQuoting = serde_json::from_str("\"Unquoted\"").unwrap();
        assert_eq!(HtmlAttribute::new(quoting), HTML_ATTRIBUTE);
    }
}
