//! Data-driven codecs built from ordered guard/emitter rules.
//!
//! A [`RuleSet`] is a codec described as data instead of code. Each [`Rule`]
//! pairs a [`Guard`] (one code point or an inclusive range) with an
//! [`Emitter`] (what to write for a matching code point). Rules are tried in
//! order and the first match wins; code points no rule matches go to the
//! default emitter, which omits them unless told otherwise.
//!
//! A code point is *safe* for a rule set exactly when its emitter is the
//! [`Identity`](EscapeFormatter::Identity) builtin.
//!
//! ```
//! use context_escape::{
//!     encode,
//!     format::EscapeFormatter,
//!     rules::{Emitter, Guard, RuleSet},
//! };
//!
//! // A tiny XML text codec: named entities for the markup characters, numeric
//! // references for controls, everything else verbatim.
//! let xml = RuleSet::builder("XML")
//!     .rule(Guard::Single('<'), Emitter::constant("&lt;"))
//!     .rule(Guard::Single('&'), Emitter::constant("&amp;"))
//!     .rule(
//!         Guard::Range('\0', '\u{1F}'),
//!         Emitter::list([
//!             Emitter::constant("&#x"),
//!             Emitter::Builtin(EscapeFormatter::Hexadecimal),
//!             Emitter::constant(";"),
//!         ]),
//!     )
//!     .default_emitter(Emitter::Builtin(EscapeFormatter::Identity))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(encode(&xml, "a<b & c\u{7}"), "a&lt;b &amp; c&#x7;");
//! ```

use alloc::{string::String, vec::Vec};
use core::fmt;

use crate::{
    codec::Codec,
    format::{EscapeFormatter, Fragment},
};

/// Selects the code points a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// Exactly this code point.
    Single(char),
    /// Every code point from the first to the second, inclusive.
    Range(char, char),
}

impl Guard {
    /// Returns `true` if `c` is selected by this guard.
    #[inline]
    pub fn matches(&self, c: char) -> bool {
        match *self {
            Guard::Single(g) => c == g,
            Guard::Range(lo, hi) => lo <= c && c <= hi,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Guard::Single(c) => write!(f, "U+{:04X}", c as u32),
            Guard::Range(lo, hi) => write!(f, "(U+{:04X}-U+{:04X})", lo as u32, hi as u32),
        }
    }
}

/// Produces the output for a matched code point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emitter {
    /// A fixed string, whatever the code point.
    Constant(String),
    /// One of the built-in formatters.
    Builtin(EscapeFormatter),
    /// Several emitters whose outputs are concatenated.
    List(Vec<Emitter>),
}

impl Emitter {
    /// Shorthand for [`Emitter::Constant`].
    pub fn constant(s: impl Into<String>) -> Self {
        Emitter::Constant(s.into())
    }

    /// Shorthand for [`Emitter::List`].
    pub fn list(emitters: impl IntoIterator<Item = Emitter>) -> Self {
        Emitter::List(emitters.into_iter().collect())
    }

    /// The most bytes this emitter can write for any code point.
    pub fn max_len(&self) -> usize {
        match self {
            Emitter::Constant(s) => s.len(),
            Emitter::Builtin(formatter) => formatter.max_len(),
            Emitter::List(emitters) => emitters.iter().map(Emitter::max_len).sum(),
        }
    }

    /// Appends the output for `c` to `out`.
    pub fn write(&self, out: &mut Fragment, c: char) {
        match self {
            Emitter::Constant(s) => out.push_str(s),
            Emitter::Builtin(formatter) => formatter.write(out, c),
            Emitter::List(emitters) => {
                for emitter in emitters {
                    emitter.write(out, c);
                }
            }
        }
    }

    #[inline]
    fn is_identity(&self) -> bool {
        matches!(self, Emitter::Builtin(EscapeFormatter::Identity))
    }
}

impl From<EscapeFormatter> for Emitter {
    #[inline]
    fn from(formatter: EscapeFormatter) -> Self {
        Emitter::Builtin(formatter)
    }
}

impl From<&str> for Emitter {
    #[inline]
    fn from(s: &str) -> Self {
        Emitter::Constant(s.into())
    }
}

/// A guard and the emitter used when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    /// Which code points this rule covers.
    pub guard: Guard,
    /// What to write for them.
    pub emitter: Emitter,
}

/// A codec defined by an ordered list of rules.
///
/// Construct one with [`RuleSet::builder`], or load one from JSON with
/// [`definition::parse`](crate::definition::parse) (requires the `serde` feature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    target: String,
    rules: Vec<Rule>,
    default_emitter: Emitter,
}

impl RuleSet {
    /// Starts building a rule set for the given target name.
    pub fn builder(target: impl Into<String>) -> RuleSetBuilder {
        RuleSetBuilder {
            target: target.into(),
            rules: Vec::new(),
            default_emitter: Emitter::Builtin(EscapeFormatter::Omit),
        }
    }

    /// The target name this rule set encodes for.
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The rules in the order they are tried.
    #[inline]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The emitter for code points no rule matches.
    #[inline]
    pub fn default_emitter(&self) -> &Emitter {
        &self.default_emitter
    }

    /// Returns the emitter selected for `c`.
    pub fn emitter_for(&self, c: char) -> &Emitter {
        self.rules
            .iter()
            .find(|rule| rule.guard.matches(c))
            .map_or(&self.default_emitter, |rule| &rule.emitter)
    }
}

impl Codec for RuleSet {
    #[inline]
    fn name(&self) -> &str {
        &self.target
    }

    #[inline]
    fn is_safe(&self, c: char) -> bool {
        self.emitter_for(c).is_identity()
    }

    fn escape(&self, c: char) -> Fragment {
        let mut out = Fragment::new();
        self.emitter_for(c).write(&mut out, c);
        out
    }
}

/// Builder for [`RuleSet`].
#[derive(Debug, Clone)]
#[must_use]
pub struct RuleSetBuilder {
    target: String,
    rules: Vec<Rule>,
    default_emitter: Emitter,
}

impl RuleSetBuilder {
    /// Appends a rule. Earlier rules take precedence.
    pub fn rule(mut self, guard: Guard, emitter: impl Into<Emitter>) -> Self {
        self.rules.push(Rule {
            guard,
            emitter: emitter.into(),
        });
        self
    }

    /// Sets the emitter for code points no rule matches.
    pub fn default_emitter(mut self, emitter: impl Into<Emitter>) -> Self {
        self.default_emitter = emitter.into();
        self
    }

    /// Validates the rules and builds the rule set.
    ///
    /// # Errors
    ///
    /// Fails if a range guard is inverted, or if an emitter could write more
    /// than [`Fragment::CAPACITY`] bytes.
    pub fn build(self) -> Result<RuleSet, RuleError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Guard::Range(lo, hi) = rule.guard {
                if lo > hi {
                    return Err(RuleError {
                        kind: RuleErrorKind::InvertedRange { lo, hi },
                        rule: Some(index),
                    });
                }
            }
            check_len(&rule.emitter, Some(index))?;
        }
        check_len(&self.default_emitter, None)?;

        debug_event!(
            codec = %self.target,
            rules = self.rules.len(),
            "built rule set"
        );

        Ok(RuleSet {
            target: self.target,
            rules: self.rules,
            default_emitter: self.default_emitter,
        })
    }
}

fn check_len(emitter: &Emitter, rule: Option<usize>) -> Result<(), RuleError> {
    let max_len = emitter.max_len();
    if max_len > Fragment::CAPACITY {
        return Err(RuleError::emitter_too_long(max_len, rule));
    }
    Ok(())
}

/// The specific kind of error found while building a [`RuleSet`].
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub enum RuleErrorKind {
    /// A range whose lower end is above its upper end.
    InvertedRange {
        /// The left end as written.
        lo: char,
        /// The right end as written.
        hi: char,
    },
    /// An emitter that could write more than [`Fragment::CAPACITY`] bytes.
    EmitterTooLong {
        /// Worst-case output length in bytes. Definitions stop counting
        /// once the limit is passed.
        max_len: usize,
    },
}

/// An error returned by [`RuleSetBuilder::build`].
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
pub struct RuleError {
    kind: RuleErrorKind,
    rule: Option<usize>,
}

impl RuleError {
    pub(crate) fn emitter_too_long(max_len: usize, rule: Option<usize>) -> Self {
        Self {
            kind: RuleErrorKind::EmitterTooLong { max_len },
            rule,
        }
    }

    /// Returns the specific kind of error that occurred.
    pub fn kind(&self) -> RuleErrorKind {
        self.kind
    }

    /// Index of the offending rule, or `None` for the default emitter.
    pub fn rule(&self) -> Option<usize> {
        self.rule
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RuleErrorKind::InvertedRange { lo, hi } => write!(
                f,
                "range U+{:04X}-U+{:04X} has its lower end above its upper end",
                lo as u32, hi as u32
            )?,
            RuleErrorKind::EmitterTooLong { max_len } => write!(
                f,
                "emitter can write {} bytes, more than the {} an escape may hold",
                max_len,
                Fragment::CAPACITY
            )?,
        }
        match self.rule {
            Some(index) => write!(f, " (rule {index})"),
            None => f.write_str(" (default emitter)"),
        }
    }
}

impl core::error::Error for RuleError {}
