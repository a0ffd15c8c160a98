//! Acceptors: named validators/converters for textual flag and argument
//! values.
//!
//! An [`Acceptor`] first *matches* raw text, producing a [`MatchResult`]
//! (or rejecting it), then *converts* the match into a [`Value`]. The
//! well-known acceptors are available by name through
//! [`AcceptorRegistry::standard`].
//!
//! # Example
//!
//! ```
//! use tooltree_core::{AcceptorRegistry, Value};
//!
//! let registry = AcceptorRegistry::standard();
//! let boolean = registry.lookup("boolean").unwrap();
//! assert_eq!(boolean.accept("YE"), Some(Value::Bool(true)));
//! assert_eq!(boolean.accept("ni"), Some(Value::Bool(false)));
//! assert_eq!(boolean.accept(""), None);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{DefinitionError, NameKind};
use crate::value::{Rational, Value};

/// A successful match: the matched text plus any extra captures a pattern
/// acceptor extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub text: String,
    pub extras: Vec<String>,
}

impl MatchResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extras: Vec::new(),
        }
    }
}

/// Validates and converts a textual value.
pub trait Acceptor: Send + Sync + fmt::Debug {
    /// Short description of the accepted type, used in diagnostics.
    fn type_desc(&self) -> &str;

    /// Matches raw text, returning `None` to reject it.
    fn matches(&self, text: &str) -> Option<MatchResult>;

    /// Converts a previous match into its final value.
    fn convert(&self, matched: &MatchResult) -> Value;

    /// Values to suggest when `text` was rejected.
    fn suggestions(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }

    /// Every value worth offering during completion, if the set is finite.
    fn completion_values(&self) -> Vec<String> {
        Vec::new()
    }

    /// Matches and converts in one step.
    fn accept(&self, text: &str) -> Option<Value> {
        self.matches(text).map(|m| self.convert(&m))
    }
}

type ConvertFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;
type PatternConvertFn = Arc<dyn Fn(&str, &[String]) -> Value + Send + Sync>;

/// An acceptor backed by a single function that both validates and
/// converts.
#[derive(Clone)]
pub struct SimpleAcceptor {
    type_desc: String,
    func: ConvertFn,
}

impl SimpleAcceptor {
    pub fn new<F>(type_desc: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            type_desc: type_desc.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for SimpleAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleAcceptor")
            .field("type_desc", &self.type_desc)
            .finish_non_exhaustive()
    }
}

impl Acceptor for SimpleAcceptor {
    fn type_desc(&self) -> &str {
        &self.type_desc
    }

    fn matches(&self, text: &str) -> Option<MatchResult> {
        (self.func)(text).map(|_| MatchResult::new(text))
    }

    fn convert(&self, matched: &MatchResult) -> Value {
        (self.func)(&matched.text).unwrap_or_else(|| Value::from(matched.text.as_str()))
    }

    fn accept(&self, text: &str) -> Option<Value> {
        (self.func)(text)
    }
}

/// An acceptor that matches a regular expression. Capture groups become
/// [`MatchResult::extras`] and are handed to the optional converter.
#[derive(Clone)]
pub struct PatternAcceptor {
    type_desc: String,
    pattern: Regex,
    converter: Option<PatternConvertFn>,
}

impl PatternAcceptor {
    /// Compiles `pattern`; matched text converts to a string value.
    pub fn new(type_desc: impl Into<String>, pattern: &str) -> Result<Self, DefinitionError> {
        let compiled = Regex::new(pattern).map_err(|err| DefinitionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            type_desc: type_desc.into(),
            pattern: compiled,
            converter: None,
        })
    }

    /// Sets a converter receiving the matched text and capture groups.
    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&str, &[String]) -> Value + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }
}

impl fmt::Debug for PatternAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternAcceptor")
            .field("type_desc", &self.type_desc)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

impl Acceptor for PatternAcceptor {
    fn type_desc(&self) -> &str {
        &self.type_desc
    }

    fn matches(&self, text: &str) -> Option<MatchResult> {
        let captures = self.pattern.captures(text)?;
        let extras = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        Some(MatchResult {
            text: text.to_string(),
            extras,
        })
    }

    fn convert(&self, matched: &MatchResult) -> Value {
        match &self.converter {
            Some(converter) => converter(&matched.text, &matched.extras),
            None => Value::from(matched.text.as_str()),
        }
    }
}

/// Accepts exactly one of an enumerated set of values, compared by their
/// display form.
#[derive(Debug, Clone)]
pub struct EnumAcceptor {
    type_desc: String,
    values: Vec<Value>,
}

impl EnumAcceptor {
    pub fn new(type_desc: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            type_desc: type_desc.into(),
            values,
        }
    }

    /// Shorthand for an enumeration of strings.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values.into_iter().map(|s| Value::String(s.into())).collect();
        let desc = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        Self::new(desc, values)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Acceptor for EnumAcceptor {
    fn type_desc(&self) -> &str {
        &self.type_desc
    }

    fn matches(&self, text: &str) -> Option<MatchResult> {
        self.values
            .iter()
            .any(|v| v.to_string() == text)
            .then(|| MatchResult::new(text))
    }

    fn convert(&self, matched: &MatchResult) -> Value {
        self.values
            .iter()
            .find(|v| v.to_string() == matched.text)
            .cloned()
            .unwrap_or_else(|| Value::from(matched.text.as_str()))
    }

    fn completion_values(&self) -> Vec<String> {
        self.values.iter().map(ToString::to_string).collect()
    }

    fn suggestions(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.values
            .iter()
            .map(ToString::to_string)
            .filter(|candidate| {
                let candidate = candidate.to_lowercase();
                !lowered.is_empty()
                    && (candidate.starts_with(&lowered) || lowered.starts_with(&candidate))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum NumericRange {
    Integer(RangeInclusive<i64>),
    Float { min: f64, max: f64 },
}

/// Accepts numbers inside an inclusive range.
///
/// # Examples
///
/// ```
/// use tooltree_core::{Acceptor, RangeAcceptor, Value};
///
/// let port = RangeAcceptor::integer(1..=65535);
/// assert_eq!(port.accept("8080"), Some(Value::Int(8080)));
/// assert_eq!(port.accept("0"), None);
/// ```
#[derive(Debug, Clone)]
pub struct RangeAcceptor {
    type_desc: String,
    range: NumericRange,
}

impl RangeAcceptor {
    pub fn integer(range: RangeInclusive<i64>) -> Self {
        Self {
            type_desc: format!("integer in {}..={}", range.start(), range.end()),
            range: NumericRange::Integer(range),
        }
    }

    pub fn float(min: f64, max: f64) -> Self {
        Self {
            type_desc: format!("number in {min}..={max}"),
            range: NumericRange::Float { min, max },
        }
    }
}

impl Acceptor for RangeAcceptor {
    fn type_desc(&self) -> &str {
        &self.type_desc
    }

    fn matches(&self, text: &str) -> Option<MatchResult> {
        let inside = match &self.range {
            NumericRange::Integer(range) => parse_integer(text).is_some_and(|i| range.contains(&i)),
            NumericRange::Float { min, max } => {
                parse_float(text).is_some_and(|x| x >= *min && x <= *max)
            }
        };
        inside.then(|| MatchResult::new(text))
    }

    fn convert(&self, matched: &MatchResult) -> Value {
        match &self.range {
            NumericRange::Integer(_) => parse_integer(&matched.text).map_or(Value::Null, Value::Int),
            NumericRange::Float { .. } => parse_float(&matched.text).map_or(Value::Null, Value::Float),
        }
    }
}

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(0[xX][0-9a-fA-F_]+|0[bB][01_]+|0[oO][0-7_]+|[0-9][0-9_]*)$")
        .expect("static regex must compile")
});
static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
        .expect("static regex must compile")
});
static RATIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?[0-9]+)(?:/([0-9]+)|\.([0-9]+))?$").expect("static regex must compile")
});

/// Parses an integer with optional sign, `0x`/`0b`/`0o` radix prefix and
/// `_` separators.
pub fn parse_integer(text: &str) -> Option<i64> {
    let caps = INTEGER_RE.captures(text)?;
    let negative = &caps[1] == "-";
    let body = caps[2].replace('_', "");
    let (digits, radix) = match body.get(..2) {
        Some("0x" | "0X") => (&body[2..], 16),
        Some("0b" | "0B") => (&body[2..], 2),
        Some("0o" | "0O") => (&body[2..], 8),
        _ => (body.as_str(), 10),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// Parses a decimal floating point number (no `inf`/`nan` spellings).
pub fn parse_float(text: &str) -> Option<f64> {
    if !FLOAT_RE.is_match(text) {
        return None;
    }
    text.parse().ok()
}

/// Parses `a/b`, an integer, or a terminating decimal as an exact
/// fraction.
pub fn parse_rational(text: &str) -> Option<Rational> {
    let caps = RATIONAL_RE.captures(text)?;
    let whole: i64 = caps[1].parse().ok()?;
    if let Some(denom) = caps.get(2) {
        return Rational::new(whole, denom.as_str().parse().ok()?);
    }
    if let Some(fraction) = caps.get(3) {
        let digits = fraction.as_str();
        let scale = 10i64.checked_pow(u32::try_from(digits.len()).ok()?)?;
        let frac: i64 = digits.parse().ok()?;
        let magnitude = whole.checked_abs()?.checked_mul(scale)?.checked_add(frac)?;
        let numer = if caps[1].starts_with('-') { -magnitude } else { magnitude };
        return Rational::new(numer, scale);
    }
    Rational::new(whole, 1)
}

/// Parses the most specific numeric form: integer, then fraction, then
/// float.
pub fn parse_numeric(text: &str) -> Option<Value> {
    if let Some(i) = parse_integer(text) {
        return Some(Value::Int(i));
    }
    if text.contains('/') {
        return parse_rational(text).map(Value::Rational);
    }
    parse_float(text).map(Value::Float)
}

const TRUE_STRINGS: [&str; 3] = ["+", "true", "yes"];
const FALSE_STRINGS: [&str; 4] = ["-", "false", "no", "nil"];

/// Parses a boolean from any case-insensitive prefix of `true`, `yes`, `+`
/// or `false`, `no`, `nil`, `-`. The empty string is rejected.
pub fn parse_boolean(text: &str) -> Option<bool> {
    if text.is_empty() {
        return None;
    }
    let lowered = text.to_lowercase();
    if TRUE_STRINGS.iter().any(|s| s.starts_with(&lowered)) {
        return Some(true);
    }
    if FALSE_STRINGS.iter().any(|s| s.starts_with(&lowered)) {
        return Some(false);
    }
    None
}

/// An acceptor given directly, or by a name resolved through the tool
/// ancestry when the owning tool is finished.
#[derive(Debug, Clone)]
pub enum AcceptorRef {
    Named(String),
    Resolved(Arc<dyn Acceptor>),
}

impl AcceptorRef {
    /// Returns the acceptor once resolved.
    pub fn resolved(&self) -> Option<&Arc<dyn Acceptor>> {
        match self {
            Self::Resolved(acceptor) => Some(acceptor),
            Self::Named(_) => None,
        }
    }

    /// Returns the pending name, if not yet resolved.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Resolved(_) => None,
        }
    }
}

impl From<Arc<dyn Acceptor>> for AcceptorRef {
    fn from(acceptor: Arc<dyn Acceptor>) -> Self {
        Self::Resolved(acceptor)
    }
}

/// Name-to-acceptor table. The loader owns one and tools may shadow its
/// entries with their own registrations.
#[derive(Debug, Clone, Default)]
pub struct AcceptorRegistry {
    entries: BTreeMap<String, Arc<dyn Acceptor>>,
}

impl AcceptorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the well-known acceptors: `string`,
    /// `integer`, `float`, `rational`, `numeric`, `boolean`, `array` and
    /// `regexp`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, SimpleAcceptor); 8] = [
            (
                "string",
                SimpleAcceptor::new("string", |s| Some(Value::from(s))),
            ),
            (
                "integer",
                SimpleAcceptor::new("integer", |s| parse_integer(s).map(Value::Int)),
            ),
            (
                "float",
                SimpleAcceptor::new("float", |s| parse_float(s).map(Value::Float)),
            ),
            (
                "rational",
                SimpleAcceptor::new("rational", |s| parse_rational(s).map(Value::Rational)),
            ),
            ("numeric", SimpleAcceptor::new("number", parse_numeric)),
            (
                "boolean",
                SimpleAcceptor::new("boolean", |s| parse_boolean(s).map(Value::Bool)),
            ),
            (
                "array",
                SimpleAcceptor::new("comma-separated list", |s| {
                    let items = if s.is_empty() {
                        Vec::new()
                    } else {
                        s.split(',').map(Value::from).collect()
                    };
                    Some(Value::List(items))
                }),
            ),
            (
                "regexp",
                SimpleAcceptor::new("regular expression", |s| {
                    Regex::new(s).ok().map(|_| Value::from(s))
                }),
            ),
        ];
        for (name, acceptor) in builtins {
            registry.entries.insert(name.to_string(), Arc::new(acceptor));
        }
        registry
    }

    /// Registers an acceptor, failing if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        acceptor: Arc<dyn Acceptor>,
    ) -> Result<(), DefinitionError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: NameKind::Acceptor,
                name,
            });
        }
        self.entries.insert(name, acceptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Acceptor>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(name: &str) -> Arc<dyn Acceptor> {
        AcceptorRegistry::standard().lookup(name).unwrap()
    }

    #[test]
    fn test_boolean_prefixes() {
        let boolean = standard("boolean");
        for text in ["t", "TR", "true", "y", "Yes", "+"] {
            assert_eq!(boolean.accept(text), Some(Value::Bool(true)), "{text}");
        }
        for text in ["f", "FALSE", "n", "no", "ni", "nil", "-"] {
            assert_eq!(boolean.accept(text), Some(Value::Bool(false)), "{text}");
        }
        assert_eq!(boolean.accept(""), None);
        assert_eq!(boolean.accept("maybe"), None);
        assert_eq!(boolean.accept("truest"), None);
    }

    #[test]
    fn test_integer_forms() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-1_000"), Some(-1000));
        assert_eq!(parse_integer("0x1f"), Some(31));
        assert_eq!(parse_integer("0b101"), Some(5));
        assert_eq!(parse_integer("0o17"), Some(15));
        assert_eq!(parse_integer("1.5"), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("99999999999999999999"), None);
    }

    #[test]
    fn test_float_rejects_special_spellings() {
        assert_eq!(parse_float("1.5e3"), Some(1500.0));
        assert_eq!(parse_float(".5"), Some(0.5));
        assert_eq!(parse_float("inf"), None);
        assert_eq!(parse_float("NaN"), None);
        assert_eq!(parse_float(""), None);
    }

    #[test]
    fn test_rational_forms() {
        assert_eq!(parse_rational("3/6"), Rational::new(1, 2));
        assert_eq!(parse_rational("-1.25"), Rational::new(-5, 4));
        assert_eq!(parse_rational("7"), Rational::new(7, 1));
        assert_eq!(parse_rational("1/0"), None);
    }

    #[test]
    fn test_numeric_picks_most_specific() {
        assert_eq!(parse_numeric("3"), Some(Value::Int(3)));
        assert_eq!(
            parse_numeric("1/3"),
            Rational::new(1, 3).map(Value::Rational)
        );
        assert_eq!(parse_numeric("2.5"), Some(Value::Float(2.5)));
        assert_eq!(parse_numeric("x"), None);
    }

    #[test]
    fn test_array_and_regexp() {
        let array = standard("array");
        assert_eq!(
            array.accept("a,b"),
            Some(Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(array.accept(""), Some(Value::List(Vec::new())));
        let regexp = standard("regexp");
        assert!(regexp.accept("^a+$").is_some());
        assert!(regexp.accept("(").is_none());
    }

    #[test]
    fn test_enum_acceptor_and_suggestions() {
        let colors = EnumAcceptor::strings(["red", "green", "grey"]);
        assert_eq!(colors.type_desc(), "red|green|grey");
        assert_eq!(colors.accept("red"), Some(Value::from("red")));
        assert_eq!(colors.accept("blue"), None);
        assert_eq!(colors.suggestions("gr"), vec!["green", "grey"]);
    }

    #[test]
    fn test_pattern_acceptor_extras() {
        let acceptor = PatternAcceptor::new("key=value", r"^(\w+)=(\w*)$")
            .unwrap()
            .with_converter(|_, extras| Value::List(extras.iter().map(|s| Value::from(s.as_str())).collect()));
        let matched = acceptor.matches("a=b").unwrap();
        assert_eq!(matched.extras, vec!["a", "b"]);
        assert_eq!(
            acceptor.convert(&matched),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert!(acceptor.matches("nope").is_none());
        assert!(PatternAcceptor::new("bad", "(").is_err());
    }

    #[test]
    fn test_float_range() {
        let ratio = RangeAcceptor::float(0.0, 1.0);
        assert_eq!(ratio.accept("0.5"), Some(Value::Float(0.5)));
        assert_eq!(ratio.accept("1.5"), None);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = AcceptorRegistry::standard();
        let err = registry
            .register("integer", Arc::new(RangeAcceptor::integer(0..=1)))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateName { .. }));
        registry
            .register("bit", Arc::new(RangeAcceptor::integer(0..=1)))
            .unwrap();
        assert!(registry.contains("bit"));
    }
}
