//! Loading rule sets from JSON codec definitions.
//!
//! **Requires the `serde` feature.**
//!
//! A definition is a JSON object:
//!
//! - `TARGET`: the name of the codec.
//! - `RULES`: an array of single-entry objects, `{ guard: emitter }`, tried in
//!   order.
//! - `DEFAULT-EMITTER` (optional): the emitter for code points no rule
//!   matches. Without it they are omitted.
//! - Any other key names a user-defined emitter: an array of emitters whose
//!   outputs are concatenated.
//!
//! A guard is a single character (`"<"`), a code point in `U+HHHH` or
//! `U+HHHHHH` form, or an inclusive range of either, `"(a-z)"` or
//! `"(U+0000-U+001F)"`. An emitter is a string (written as is) or
//! `{"emitter": NAME}`, where `NAME` is a user-defined emitter or one of the
//! builtins `DEC`, `HEX`, `NOP` and `IDENTITY`. User-defined emitters may
//! nest at most [`MAX_EMITTER_DEPTH`] levels deep, and each must fit in a
//! [`Fragment`].
//!
//! ```
//! use context_escape::{definition, encode};
//!
//! let markdown = definition::parse(r#"{
//!     "TARGET": "Markdown",
//!     "RULES": [
//!         { "(U+0000-U+001F)": { "emitter": "NOP" } },
//!         { "*": { "emitter": "backslash" } },
//!         { "_": { "emitter": "backslash" } }
//!     ],
//!     "DEFAULT-EMITTER": { "emitter": "IDENTITY" },
//!     "backslash": ["\\", { "emitter": "IDENTITY" }]
//! }"#).unwrap();
//!
//! assert_eq!(encode(&markdown, "*bold*_x_"), "\\*bold\\*\\_x\\_");
//! ```

use alloc::{borrow::ToOwned, collections::BTreeMap, string::String, vec, vec::Vec};
use core::fmt;

use serde_json::{Map, Value};

use crate::{
    format::{EscapeFormatter, Fragment},
    rules::{Emitter, Guard, RuleError, RuleSet},
};

const TARGET: &str = "TARGET";
const RULES: &str = "RULES";
const DEFAULT_EMITTER: &str = "DEFAULT-EMITTER";

/// Parses a JSON codec definition into a [`RuleSet`].
///
/// # Errors
///
/// Returns a [`DefinitionError`] if the text is not valid JSON, does not have
/// the expected shape, or describes rules that fail to build.
pub fn parse(json: &str) -> Result<RuleSet, DefinitionError> {
    let value: Value = serde_json::from_str(json).map_err(|e| DefinitionError {
        kind: DefinitionErrorKind::Json(e),
        rule: None,
    })?;
    from_value(&value)
}

/// Builds a [`RuleSet`] from an already-parsed JSON definition.
///
/// # Errors
///
/// See [`parse`].
pub fn from_value(value: &Value) -> Result<RuleSet, DefinitionError> {
    let object = value
        .as_object()
        .ok_or_else(|| DefinitionError::new(DefinitionErrorKind::NotAnObject))?;

    let target = object
        .get(TARGET)
        .ok_or_else(|| DefinitionError::new(DefinitionErrorKind::MissingKey(TARGET)))?
        .as_str()
        .ok_or_else(|| DefinitionError::new(DefinitionErrorKind::InvalidKey(TARGET)))?;

    let rules = object
        .get(RULES)
        .ok_or_else(|| DefinitionError::new(DefinitionErrorKind::MissingKey(RULES)))?
        .as_array()
        .ok_or_else(|| DefinitionError::new(DefinitionErrorKind::InvalidKey(RULES)))?;

    let mut resolver = Resolver::new(object);
    let mut builder = RuleSet::builder(target);

    for (index, rule) in rules.iter().enumerate() {
        resolver.rule = Some(index);
        let (guard, emitter) = parse_rule(&mut resolver, rule).map_err(|kind| DefinitionError {
            kind,
            rule: Some(index),
        })?;
        builder = builder.rule(guard, emitter);
    }

    if let Some(default) = object.get(DEFAULT_EMITTER) {
        resolver.rule = None;
        let emitter = resolver.emitter(default).map_err(DefinitionError::new)?;
        builder = builder.default_emitter(emitter);
    }

    let set = builder.build().map_err(|e| DefinitionError {
        kind: DefinitionErrorKind::Rule(e),
        rule: e.rule(),
    })?;

    debug_event!(
        codec = %set.target(),
        rules = set.rules().len(),
        "loaded codec definition"
    );

    Ok(set)
}

fn parse_rule<'a>(
    resolver: &mut Resolver<'a>,
    rule: &'a Value,
) -> Result<(Guard, Emitter), DefinitionErrorKind> {
    let entries = rule.as_object().ok_or(DefinitionErrorKind::RuleEntries(0))?;
    let mut iter = entries.iter();
    match (iter.next(), iter.next()) {
        (Some((guard, emitter)), None) => {
            let guard = parse_guard(guard)?;
            let emitter = resolver.emitter(emitter)?;
            Ok((guard, emitter))
        }
        _ => Err(DefinitionErrorKind::RuleEntries(entries.len())),
    }
}

/// Parses a guard: `c`, `U+HHHH`, `U+HHHHHH`, or `(lo-hi)` of either.
///
/// ```
/// use context_escape::{definition::parse_guard, rules::Guard};
///
/// assert_eq!(parse_guard("<").unwrap(), Guard::Single('<'));
/// assert_eq!(parse_guard("U+00A0").unwrap(), Guard::Single('\u{A0}'));
/// assert_eq!(parse_guard("(a-U+007A)").unwrap(), Guard::Range('a', 'z'));
/// ```
pub fn parse_guard(s: &str) -> Result<Guard, DefinitionErrorKind> {
    let bad = || DefinitionErrorKind::BadGuard(s.to_owned());

    if let Some(c) = single_char(s) {
        return Ok(Guard::Single(c));
    }
    if let Some(c) = unicode_form(s) {
        return c.map(Guard::Single).ok_or_else(bad);
    }

    let inner = s
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(bad)?;
    let (lo, rest) = split_endpoint(inner).ok_or_else(bad)?;
    let hi = rest.strip_prefix('-').and_then(endpoint).ok_or_else(bad)?;
    Ok(Guard::Range(lo.ok_or_else(bad)?, hi.ok_or_else(bad)?))
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// `Some(None)` for a well-formed `U+` code that is not a scalar value.
fn unicode_form(s: &str) -> Option<Option<char>> {
    let digits = s.strip_prefix("U+").or_else(|| s.strip_prefix("u+"))?;
    if !matches!(digits.len(), 4 | 6) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    Some(char::from_u32(value))
}

/// A whole range endpoint.
fn endpoint(s: &str) -> Option<Option<char>> {
    match split_endpoint(s)? {
        (c, "") => Some(c),
        _ => None,
    }
}

/// Splits a leading range endpoint off `s`, preferring the `U+` forms.
fn split_endpoint(s: &str) -> Option<(Option<char>, &str)> {
    for len in [8, 6] {
        if let Some(head) = s.get(..len) {
            if let Some(c) = unicode_form(head) {
                return Some((c, &s[len..]));
            }
        }
    }
    let c = s.chars().next()?;
    Some((Some(c), &s[c.len_utf8()..]))
}

/// How many user-defined emitters may be expanded inside one another.
pub const MAX_EMITTER_DEPTH: usize = 64;

/// An emitter value, with names looked up.
enum Reference<'a> {
    Leaf(Emitter),
    UserDefined(&'a str, &'a Value),
}

/// Expands user-defined emitters into the constants and builtins they write.
///
/// Each name is expanded once. Expansions are flat lists without empty parts,
/// so their length is bounded by [`Fragment::CAPACITY`].
struct Resolver<'a> {
    definition: &'a Map<String, Value>,
    expanded: BTreeMap<&'a str, Vec<Emitter>>,
    /// The user-defined emitters currently being expanded, outermost first.
    expanding: Vec<&'a str>,
    /// The rule being resolved, for error reports.
    rule: Option<usize>,
}

impl<'a> Resolver<'a> {
    fn new(definition: &'a Map<String, Value>) -> Self {
        Self {
            definition,
            expanded: BTreeMap::new(),
            expanding: Vec::new(),
            rule: None,
        }
    }

    fn is_user_defined(name: &str) -> bool {
        !matches!(name, TARGET | RULES | DEFAULT_EMITTER)
    }

    fn emitter(&mut self, value: &'a Value) -> Result<Emitter, DefinitionErrorKind> {
        match self.reference(value)? {
            Reference::Leaf(emitter) => Ok(emitter),
            Reference::UserDefined(name, body) => Ok(Emitter::List(self.expand(name, body)?)),
        }
    }

    fn reference(&self, value: &'a Value) -> Result<Reference<'a>, DefinitionErrorKind> {
        let name = match value {
            Value::String(s) => return Ok(Reference::Leaf(Emitter::Constant(s.clone()))),
            Value::Object(map) => map
                .get("emitter")
                .and_then(Value::as_str)
                .ok_or(DefinitionErrorKind::MalformedEmitter)?,
            _ => return Err(DefinitionErrorKind::MalformedEmitter),
        };

        if Self::is_user_defined(name) {
            if let Some(body) = self.definition.get(name) {
                return Ok(Reference::UserDefined(name, body));
            }
        }

        EscapeFormatter::from_name(name)
            .map(|formatter| Reference::Leaf(Emitter::Builtin(formatter)))
            .ok_or_else(|| DefinitionErrorKind::UnknownEmitter(name.to_owned()))
    }

    fn expand(
        &mut self,
        name: &'a str,
        body: &'a Value,
    ) -> Result<Vec<Emitter>, DefinitionErrorKind> {
        if let Some(parts) = self.expanded.get(name) {
            return Ok(parts.clone());
        }
        if self.expanding.contains(&name) {
            return Err(DefinitionErrorKind::RecursiveEmitter(name.to_owned()));
        }
        if self.expanding.len() == MAX_EMITTER_DEPTH {
            return Err(DefinitionErrorKind::EmitterTooDeep(name.to_owned()));
        }
        let items = body.as_array().ok_or(DefinitionErrorKind::MalformedEmitter)?;

        self.expanding.push(name);
        let parts = self.flatten(items);
        self.expanding.pop();

        let parts = parts?;
        self.expanded.insert(name, parts.clone());
        Ok(parts)
    }

    fn flatten(&mut self, items: &'a [Value]) -> Result<Vec<Emitter>, DefinitionErrorKind> {
        let mut parts = Vec::new();
        let mut max_len = 0;
        for item in items {
            let expansion = match self.reference(item)? {
                Reference::Leaf(emitter) => vec![emitter],
                Reference::UserDefined(name, body) => self.expand(name, body)?,
            };
            for part in expansion {
                let len = part.max_len();
                if len == 0 {
                    continue;
                }
                max_len += len;
                if max_len > Fragment::CAPACITY {
                    let error = RuleError::emitter_too_long(max_len, self.rule);
                    return Err(DefinitionErrorKind::Rule(error));
                }
                parts.push(part);
            }
        }
        Ok(parts)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// The specific kind of error found in a codec definition.
#[derive(Debug)]
#[non_exhaustive]
pub enum DefinitionErrorKind {
    /// The text is not valid JSON.
    Json(serde_json::Error),
    /// The definition is not a JSON object.
    NotAnObject,
    /// A required key is absent.
    MissingKey(&'static str),
    /// A required key has the wrong type.
    InvalidKey(&'static str),
    /// A guard that is neither a character, a `U+` code point, nor a range.
    BadGuard(String),
    /// A rule object with this many entries instead of exactly one.
    RuleEntries(usize),
    /// An emitter that is neither a string nor `{"emitter": NAME}`, or a
    /// user-defined emitter that is not an array.
    MalformedEmitter,
    /// `{"emitter": NAME}` with a name that is neither builtin nor defined.
    UnknownEmitter(String),
    /// A user-defined emitter that refers back to itself.
    RecursiveEmitter(String),
    /// A user-defined emitter nested more than [`MAX_EMITTER_DEPTH`] levels
    /// deep.
    EmitterTooDeep(String),
    /// The rules parsed but do not form a valid rule set.
    Rule(RuleError),
}

/// An error returned when loading a codec definition.
#[derive(Debug)]
pub struct DefinitionError {
    kind: DefinitionErrorKind,
    rule: Option<usize>,
}

impl DefinitionError {
    fn new(kind: DefinitionErrorKind) -> Self {
        Self { kind, rule: None }
    }

    /// Returns the specific kind of error that occurred.
    pub fn kind(&self) -> &DefinitionErrorKind {
        &self.kind
    }

    /// Index into `RULES` of the offending rule, if the error is tied to one.
    pub fn rule(&self) -> Option<usize> {
        self.rule
    }
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DefinitionErrorKind::Json(e) => return write!(f, "invalid json: {e}"),
            DefinitionErrorKind::Rule(e) => return fmt::Display::fmt(e, f),
            DefinitionErrorKind::NotAnObject => f.write_str("definition must be a json object")?,
            DefinitionErrorKind::MissingKey(key) => write!(f, "missing key {key:?}")?,
            DefinitionErrorKind::InvalidKey(key) => write!(f, "key {key:?} has the wrong type")?,
            DefinitionErrorKind::BadGuard(guard) => write!(f, "invalid guard {guard:?}")?,
            DefinitionErrorKind::RuleEntries(n) => {
                write!(f, "a rule must have exactly one entry, found {n}")?
            }
            DefinitionErrorKind::MalformedEmitter => f.write_str("malformed emitter")?,
            DefinitionErrorKind::UnknownEmitter(name) => write!(f, "unknown emitter {name:?}")?,
            DefinitionErrorKind::RecursiveEmitter(name) => {
                write!(f, "emitter {name:?} refers to itself")?
            }
            DefinitionErrorKind::EmitterTooDeep(name) => write!(
                f,
                "emitter {name:?} is nested more than {MAX_EMITTER_DEPTH} levels deep"
            )?,
        }
        if let Some(index) = self.rule {
            write!(f, " (rule {index})")?;
        }
        Ok(())
    }
}

impl core::error::Error for DefinitionError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match &self.kind {
            DefinitionErrorKind::Json(e) => Some(e),
            DefinitionErrorKind::Rule(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Codec, encode, rules::RuleErrorKind};
    use serde_json::json;
    use std::{format, string::ToString as _, vec};

    fn kind_of(value: Value) -> DefinitionErrorKind {
        from_value(&value).unwrap_err().kind
    }

    /// `e0` to `e{levels - 1}` each refer `fanout` times to the next name, and
    /// the rule for `x` uses `e0`.
    fn linked(levels: usize, fanout: usize, last: Value) -> Value {
        let mut definition = Map::new();
        definition.insert("TARGET".to_string(), json!("T"));
        definition.insert("RULES".to_string(), json!([{ "x": { "emitter": "e0" } }]));
        for i in 0..levels {
            let next = json!({ "emitter": format!("e{}", i + 1) });
            definition.insert(format!("e{i}"), Value::Array(vec![next; fanout]));
        }
        definition.insert(format!("e{levels}"), last);
        Value::Object(definition)
    }

    #[test]
    fn loads_a_definition() {
        let set = from_value(&json!({
            "TARGET": "XML",
            "RULES": [
                { "<": "&lt;" },
                { "&": "&amp;" },
                { "(U+0000-U+001F)": { "emitter": "hexref" } }
            ],
            "DEFAULT-EMITTER": { "emitter": "IDENTITY" },
            "hexref": ["&#x", { "emitter": "HEX" }, ";"]
        }))
        .unwrap();

        assert_eq!(set.name(), "XML");
        assert_eq!(set.rules().len(), 3);
        assert_eq!(encode(&set, "<a & b\n>"), "&lt;a &amp; b&#xa;>");
    }

    #[test]
    fn default_emitter_is_omit() {
        let set = parse(r#"{ "TARGET": "T", "RULES": [ { "(a-c)": { "emitter": "IDENTITY" } } ] }"#)
            .unwrap();
        assert_eq!(encode(&set, "abcdef"), "abc");
    }

    #[test]
    fn builtins() {
        let set = from_value(&json!({
            "TARGET": "T",
            "RULES": [
                { "a": { "emitter": "DEC" } },
                { "b": { "emitter": "HEX" } },
                { "c": { "emitter": "NOP" } }
            ],
            "DEFAULT-EMITTER": { "emitter": "IDENTITY" }
        }))
        .unwrap();
        assert_eq!(encode(&set, "abcd"), "9762d");
    }

    #[test]
    fn nested_user_emitters() {
        let set = from_value(&json!({
            "TARGET": "T",
            "RULES": [ { "x": { "emitter": "outer" } } ],
            "outer": ["[", { "emitter": "inner" }, "]"],
            "inner": [{ "emitter": "DEC" }]
        }))
        .unwrap();
        assert_eq!(encode(&set, "x"), "[120]");
    }

    #[test]
    fn guards() {
        assert_eq!(parse_guard("a").unwrap(), Guard::Single('a'));
        assert_eq!(parse_guard("(").unwrap(), Guard::Single('('));
        assert_eq!(parse_guard("😀").unwrap(), Guard::Single('😀'));
        assert_eq!(parse_guard("u+0041").unwrap(), Guard::Single('A'));
        assert_eq!(parse_guard("U+01F600").unwrap(), Guard::Single('😀'));
        assert_eq!(parse_guard("(a-z)").unwrap(), Guard::Range('a', 'z'));
        assert_eq!(parse_guard("(--/)").unwrap(), Guard::Range('-', '/'));
        assert_eq!(
            parse_guard("(U+0080-U+10FFFF)").unwrap(),
            Guard::Range('\u{80}', '\u{10FFFF}')
        );
    }

    #[test]
    fn bad_guards() {
        for guard in ["", "ab", "U+41", "U+D800", "U+110000", "(a-)", "(a-bc)", "a-z", "(a-z"] {
            assert!(
                matches!(parse_guard(guard), Err(DefinitionErrorKind::BadGuard(_))),
                "{guard:?}"
            );
        }
    }

    #[test]
    fn shape_errors() {
        assert!(matches!(kind_of(json!([])), DefinitionErrorKind::NotAnObject));
        assert!(matches!(
            kind_of(json!({ "RULES": [] })),
            DefinitionErrorKind::MissingKey("TARGET")
        ));
        assert!(matches!(
            kind_of(json!({ "TARGET": "T", "RULES": {} })),
            DefinitionErrorKind::InvalidKey("RULES")
        ));
        assert!(matches!(
            parse("{ nope").unwrap_err().kind(),
            DefinitionErrorKind::Json(_)
        ));
    }

    #[test]
    fn rule_must_have_one_entry() {
        let err = from_value(&json!({
            "TARGET": "T",
            "RULES": [ { "a": "A" }, { "b": "B", "c": "C" } ]
        }))
        .unwrap_err();
        assert!(matches!(err.kind(), DefinitionErrorKind::RuleEntries(2)));
        assert_eq!(err.rule(), Some(1));
        assert_eq!(
            err.to_string(),
            "a rule must have exactly one entry, found 2 (rule 1)"
        );
    }

    #[test]
    fn emitter_errors() {
        assert!(matches!(
            kind_of(json!({ "TARGET": "T", "RULES": [ { "a": { "emitter": "OCT" } } ] })),
            DefinitionErrorKind::UnknownEmitter(name) if name == "OCT"
        ));
        assert!(matches!(
            kind_of(json!({ "TARGET": "T", "RULES": [ { "a": { "kind": "DEC" } } ] })),
            DefinitionErrorKind::MalformedEmitter
        ));
        assert!(matches!(
            kind_of(json!({ "TARGET": "T", "RULES": [ { "a": 7 } ] })),
            DefinitionErrorKind::MalformedEmitter
        ));
        assert!(matches!(
            kind_of(json!({
                "TARGET": "T",
                "RULES": [ { "a": { "emitter": "ping" } } ],
                "ping": [{ "emitter": "pong" }],
                "pong": [{ "emitter": "ping" }]
            })),
            DefinitionErrorKind::RecursiveEmitter(_)
        ));
    }

    #[test]
    fn nesting_depth_is_limited() {
        let set = from_value(&linked(MAX_EMITTER_DEPTH - 1, 1, json!(["!"]))).unwrap();
        assert_eq!(encode(&set, "x"), "!");

        let err = from_value(&linked(MAX_EMITTER_DEPTH, 1, json!(["!"]))).unwrap_err();
        assert!(matches!(err.kind(), DefinitionErrorKind::EmitterTooDeep(_)));
        assert_eq!(err.rule(), Some(0));
    }

    #[test]
    fn long_chain_ending_in_nop() {
        let err = from_value(&linked(20_000, 1, json!([{ "emitter": "NOP" }]))).unwrap_err();
        assert!(matches!(err.kind(), DefinitionErrorKind::EmitterTooDeep(_)));
    }

    #[test]
    fn doubling_emitters_stop_at_capacity() {
        let err = from_value(&linked(40, 2, json!(["ab"]))).unwrap_err();
        let DefinitionErrorKind::Rule(e) = err.kind() else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(e.kind(), RuleErrorKind::EmitterTooLong { max_len: 34 });
        assert_eq!(err.rule(), Some(0));
        assert_eq!(
            err.to_string(),
            "emitter can write 34 bytes, more than the 32 an escape may hold (rule 0)"
        );
    }

    #[test]
    fn doubling_empty_emitters_expand_once() {
        let set = from_value(&linked(60, 2, json!([{ "emitter": "NOP" }, ""]))).unwrap();
        assert_eq!(set.rules()[0].emitter, Emitter::List(vec![]));
        assert_eq!(encode(&set, "x"), "");
    }

    #[test]
    fn rule_build_errors_surface() {
        let err = from_value(&json!({
            "TARGET": "T",
            "RULES": [ { "(z-a)": "!" } ]
        }))
        .unwrap_err();
        let DefinitionErrorKind::Rule(e) = err.kind() else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(e.kind(), RuleErrorKind::InvertedRange { lo: 'z', hi: 'a' });
        assert_eq!(err.rule(), Some(0));
    }
}
