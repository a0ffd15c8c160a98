//! Flag syntax parsing, canonicalization and prefix resolution.
//!
//! A [`Flag`] binds one context key to one or more textual spellings
//! ([`FlagSyntax`]). Spellings are parsed from strings such as `-v`,
//! `--output=FILE`, `-j[N]` or `--[no-]color`, then canonicalized together
//! so that every synonym agrees on whether the flag is boolean or valued
//! and, for valued flags, whether the value is required.
//!
//! # Example
//!
//! ```
//! use tooltree_core::{FlagBuilder, FlagKind};
//!
//! let flag = FlagBuilder::new("verbose")
//!     .syntax("-v")
//!     .syntax("--[no-]verbose")
//!     .build()
//!     .unwrap();
//! assert_eq!(flag.kind(), FlagKind::Boolean);
//! assert_eq!(flag.display_name(), "--[no-]verbose");
//!
//! let resolution = flag.resolve("--no-verbose");
//! let found = resolution.unique().unwrap();
//! assert!(found.negative && found.exact);
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::acceptor::{Acceptor, AcceptorRef};
use crate::completion::{Completion, CompletionRef, EnumCompletion};
use crate::error::DefinitionError;
use crate::value::Value;
use crate::words::kebab_case;

/// Whether a spelling is a single-dash short flag or a double-dash long
/// flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStyle {
    Short,
    Long,
}

/// Whether a flag is an on/off switch or carries a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Boolean,
    Value,
}

/// Whether a valued flag requires its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueArity {
    Required,
    Optional,
}

struct SyntaxPatterns {
    short_bool: Regex,
    short_optional_outer: Regex,
    short_optional_inner: Regex,
    short_required: Regex,
    negatable: Regex,
    long_bool: Regex,
    long_optional_outer: Regex,
    long_optional_inner: Regex,
    long_required: Regex,
}

impl SyntaxPatterns {
    fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static regex must compile");
        Self {
            short_bool: re(r"^-([?\w])$"),
            short_optional_outer: re(r"^-([?\w])( ?)\[(\w+)\]$"),
            short_optional_inner: re(r"^-([?\w])\[( )(\w+)\]$"),
            short_required: re(r"^-([?\w])( ?)(\w+)$"),
            negatable: re(r"^--\[no-\](\w[?\w-]*)$"),
            long_bool: re(r"^--(\w[?\w-]*)$"),
            long_optional_outer: re(r"^--(\w[?\w-]*)([= ])\[(\w+)\]$"),
            long_optional_inner: re(r"^--(\w[?\w-]*)\[([= ])(\w+)\]$"),
            long_required: re(r"^--(\w[?\w-]*)([= ])(\w+)$"),
        }
    }
}

static PATTERNS: LazyLock<SyntaxPatterns> = LazyLock::new(SyntaxPatterns::new);

/// One parsed spelling of a flag.
///
/// Plain spellings (`-v`, `--verbose`) leave the kind undetermined until
/// the owning [`Flag`] is canonicalized; valued and negatable spellings
/// determine it themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSyntax {
    original: String,
    name: String,
    positive: String,
    negative: Option<String>,
    style: FlagStyle,
    kind: Option<FlagKind>,
    arity: Option<ValueArity>,
    delimiter: String,
    label: Option<String>,
    canonical: String,
}

impl FlagSyntax {
    /// Parses one flag spelling.
    ///
    /// # Examples
    ///
    /// ```
    /// use tooltree_core::{FlagKind, FlagStyle, FlagSyntax, ValueArity};
    ///
    /// let syntax = FlagSyntax::parse("--name[=NAME]").unwrap();
    /// assert_eq!(syntax.style(), FlagStyle::Long);
    /// assert_eq!(syntax.kind(), Some(FlagKind::Value));
    /// assert_eq!(syntax.arity(), Some(ValueArity::Optional));
    /// assert_eq!(syntax.delimiter(), "=");
    /// assert_eq!(syntax.label(), Some("NAME"));
    ///
    /// assert!(FlagSyntax::parse("---x").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        let p = &*PATTERNS;
        if let Some(c) = p.short_bool.captures(text) {
            return Ok(Self::plain(text, &c[1], FlagStyle::Short));
        }
        if let Some(c) = p.short_optional_outer.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Short, ValueArity::Optional, &c[2], &c[3]));
        }
        if let Some(c) = p.short_optional_inner.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Short, ValueArity::Optional, &c[2], &c[3]));
        }
        if let Some(c) = p.short_required.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Short, ValueArity::Required, &c[2], &c[3]));
        }
        if let Some(c) = p.negatable.captures(text) {
            let mut syntax = Self::plain(text, &c[1], FlagStyle::Long);
            syntax.negative = Some(format!("--no-{}", &c[1]));
            syntax.kind = Some(FlagKind::Boolean);
            syntax.render();
            return Ok(syntax);
        }
        if let Some(c) = p.long_bool.captures(text) {
            return Ok(Self::plain(text, &c[1], FlagStyle::Long));
        }
        if let Some(c) = p.long_optional_outer.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Long, ValueArity::Optional, &c[2], &c[3]));
        }
        if let Some(c) = p.long_optional_inner.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Long, ValueArity::Optional, &c[2], &c[3]));
        }
        if let Some(c) = p.long_required.captures(text) {
            return Ok(Self::valued(text, &c[1], FlagStyle::Long, ValueArity::Required, &c[2], &c[3]));
        }
        Err(DefinitionError::IllegalFlagSyntax(text.to_string()))
    }

    fn plain(text: &str, name: &str, style: FlagStyle) -> Self {
        let positive = match style {
            FlagStyle::Short => format!("-{name}"),
            FlagStyle::Long => format!("--{name}"),
        };
        Self {
            original: text.to_string(),
            name: name.to_string(),
            canonical: positive.clone(),
            positive,
            negative: None,
            style,
            kind: None,
            arity: None,
            delimiter: String::new(),
            label: None,
        }
    }

    fn valued(
        text: &str,
        name: &str,
        style: FlagStyle,
        arity: ValueArity,
        delimiter: &str,
        label: &str,
    ) -> Self {
        let mut syntax = Self::plain(text, name, style);
        syntax.kind = Some(FlagKind::Value);
        syntax.arity = Some(arity);
        syntax.delimiter = delimiter.to_string();
        syntax.label = Some(label.to_string());
        syntax.render();
        syntax
    }

    fn render(&mut self) {
        self.canonical = match (self.kind, self.arity, &self.label) {
            (Some(FlagKind::Value), Some(ValueArity::Optional), Some(label)) => {
                format!("{}[{}{}]", self.positive, self.delimiter, label)
            }
            (Some(FlagKind::Value), _, Some(label)) => {
                format!("{}{}{}", self.positive, self.delimiter, label)
            }
            _ if self.negative.is_some() => format!("--[no-]{}", self.name),
            _ => self.positive.clone(),
        };
    }

    /// Adopts the flag-wide kind, arity, label and delimiter. Spellings
    /// that already determined their own kind are left untouched.
    fn configure_canonical(
        &mut self,
        kind: FlagKind,
        arity: Option<ValueArity>,
        label: &str,
        delimiter: Option<&str>,
    ) {
        if self.kind.is_some() {
            return;
        }
        self.kind = Some(kind);
        if kind == FlagKind::Value {
            self.arity = arity;
            self.delimiter = match (self.style, delimiter) {
                (FlagStyle::Short, None | Some("=")) => " ".to_string(),
                (FlagStyle::Long, None | Some("")) => "=".to_string(),
                (_, Some(delim)) => delim.to_string(),
            };
            self.label = Some(label.to_string());
        }
        self.render();
    }

    /// The string this syntax was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The positive spelling, e.g. `--verbose`.
    pub fn positive(&self) -> &str {
        &self.positive
    }

    /// The negated spelling of a `--[no-]name` syntax.
    pub fn negative(&self) -> Option<&str> {
        self.negative.as_deref()
    }

    /// All spellings this syntax answers to.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.positive.as_str()).chain(self.negative.as_deref())
    }

    pub fn style(&self) -> FlagStyle {
        self.style
    }

    /// The kind; `None` only for a plain spelling not yet canonicalized.
    pub fn kind(&self) -> Option<FlagKind> {
        self.kind
    }

    pub fn arity(&self) -> Option<ValueArity> {
        self.arity
    }

    /// Separator between the flag and its value: `""`, `" "` or `"="`.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Display form, e.g. `--output=FILE`, `-j[ N]`, `--[no-]color`.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Ordering key: the bare name, lowercased.
    pub fn sort_str(&self) -> String {
        self.name.to_lowercase()
    }
}

/// How a flag occurrence combines with the value already bound to its key.
#[derive(Clone, Default)]
pub enum FlagHandler {
    /// Replace the previous value.
    #[default]
    Set,
    /// Append to a list, starting a new list when nothing was bound.
    Push,
    /// Custom combination of the given and previous values.
    Custom(Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>),
}

impl FlagHandler {
    /// Combines a newly given value with the previously bound one.
    pub fn apply(&self, given: Value, previous: Option<&Value>) -> Value {
        match self {
            Self::Set => given,
            Self::Push => match previous {
                Some(Value::List(items)) => {
                    let mut items = items.clone();
                    items.push(given);
                    Value::List(items)
                }
                Some(Value::Null) | None => Value::List(vec![given]),
                Some(other) => Value::List(vec![other.clone(), given]),
            },
            Self::Custom(func) => func(given, previous.unwrap_or(&Value::Null)),
        }
    }
}

impl fmt::Debug for FlagHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("Set"),
            Self::Push => f.write_str("Push"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named set of synonymous spellings bound to one context key.
#[derive(Debug, Clone)]
pub struct Flag {
    key: String,
    syntax: Vec<FlagSyntax>,
    acceptor: Option<AcceptorRef>,
    handler: FlagHandler,
    default: Value,
    kind: FlagKind,
    arity: Option<ValueArity>,
    value_label: Option<String>,
    value_delim: String,
    desc: String,
    long_desc: Vec<String>,
    group: Option<String>,
    value_completion: Option<CompletionRef>,
    report_collisions: bool,
    display_name: String,
    sort_str: String,
}

impl Flag {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn syntax(&self) -> &[FlagSyntax] {
        &self.syntax
    }

    pub fn short_flag_syntax(&self) -> impl Iterator<Item = &FlagSyntax> {
        self.syntax.iter().filter(|s| s.style == FlagStyle::Short)
    }

    pub fn long_flag_syntax(&self) -> impl Iterator<Item = &FlagSyntax> {
        self.syntax.iter().filter(|s| s.style == FlagStyle::Long)
    }

    /// Every spelling, positive and negative, in declaration order.
    pub fn effective_flags(&self) -> Vec<&str> {
        self.syntax.iter().flat_map(FlagSyntax::spellings).collect()
    }

    /// A flag whose spellings were all dropped is inactive and ignored.
    pub fn is_active(&self) -> bool {
        !self.syntax.is_empty()
    }

    pub fn acceptor(&self) -> Option<&AcceptorRef> {
        self.acceptor.as_ref()
    }

    pub fn handler(&self) -> &FlagHandler {
        &self.handler
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    /// Value arity; `None` for boolean flags.
    pub fn arity(&self) -> Option<ValueArity> {
        self.arity
    }

    pub fn value_label(&self) -> Option<&str> {
        self.value_label.as_deref()
    }

    pub fn value_delim(&self) -> &str {
        &self.value_delim
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn long_desc(&self) -> &[String] {
        &self.long_desc
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn value_completion(&self) -> Option<&CompletionRef> {
        self.value_completion.as_ref()
    }

    pub fn report_collisions(&self) -> bool {
        self.report_collisions
    }

    /// Display form, preferring the first long spelling.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn sort_str(&self) -> &str {
        &self.sort_str
    }

    /// Matches a token against every spelling of this flag. Exact matches
    /// take precedence over prefix matches.
    pub fn resolve(&self, token: &str) -> FlagResolution<'_> {
        let mut resolution = FlagResolution::new(token);
        for syntax in &self.syntax {
            let negative = syntax.negative.as_deref();
            let (negated, exact) = if syntax.positive == token {
                (false, true)
            } else if negative == Some(token) {
                (true, true)
            } else if syntax.positive.starts_with(token) {
                (false, false)
            } else if negative.is_some_and(|n| n.starts_with(token)) {
                (true, false)
            } else {
                continue;
            };
            let spelling = if negated {
                negative.unwrap_or(&syntax.positive)
            } else {
                &syntax.positive
            };
            resolution.add(FlagMatch {
                flag: self,
                syntax,
                spelling,
                negative: negated,
                exact,
            });
        }
        resolution
    }

    /// Drops spellings rejected by `keep`, refreshing the display name.
    pub(crate) fn retain_syntax(&mut self, keep: impl Fn(&FlagSyntax) -> bool) {
        self.syntax.retain(|s| keep(s));
        self.refresh_display();
    }

    pub(crate) fn set_acceptor(&mut self, acceptor: AcceptorRef) {
        self.acceptor = Some(acceptor);
    }

    pub(crate) fn set_value_completion(&mut self, completion: CompletionRef) {
        self.value_completion = Some(completion);
    }

    fn refresh_display(&mut self) {
        let preferred = self.long_flag_syntax().next().or_else(|| self.syntax.first());
        let display_name = preferred.map(|s| s.canonical.clone()).unwrap_or_default();
        let sort_str = preferred.map(FlagSyntax::sort_str).unwrap_or_default();
        self.display_name = display_name;
        self.sort_str = sort_str;
    }
}

/// Builds a [`Flag`], parsing and canonicalizing its spellings once all of
/// them are known.
///
/// When no spelling is given, one is synthesized from the key: `-k` for a
/// single-character key, `--kebab-key` otherwise, with a `VALUE`
/// placeholder if the acceptor or default implies a value.
///
/// # Examples
///
/// ```
/// use tooltree_core::{FlagBuilder, FlagKind, Value};
///
/// let flag = FlagBuilder::new("dry_run").build().unwrap();
/// assert_eq!(flag.display_name(), "--dry-run");
/// assert_eq!(flag.kind(), FlagKind::Boolean);
///
/// let flag = FlagBuilder::new("level").default(Value::Int(1)).build().unwrap();
/// assert_eq!(flag.display_name(), "--level=VALUE");
/// ```
#[derive(Debug, Clone)]
pub struct FlagBuilder {
    key: String,
    syntax: Vec<String>,
    acceptor: Option<AcceptorRef>,
    default: Option<Value>,
    handler: FlagHandler,
    desc: String,
    long_desc: Vec<String>,
    group: Option<String>,
    value_completion: Option<CompletionRef>,
    report_collisions: bool,
}

impl FlagBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            syntax: Vec::new(),
            acceptor: None,
            default: None,
            handler: FlagHandler::Set,
            desc: String::new(),
            long_desc: Vec::new(),
            group: None,
            value_completion: None,
            report_collisions: true,
        }
    }

    /// Adds a spelling such as `-o`, `--out=FILE` or `--[no-]color`.
    pub fn syntax(mut self, syntax: impl Into<String>) -> Self {
        self.syntax.push(syntax.into());
        self
    }

    pub fn accept(mut self, acceptor: Arc<dyn Acceptor>) -> Self {
        self.acceptor = Some(AcceptorRef::Resolved(acceptor));
        self
    }

    /// Uses a named acceptor, resolved when the tool is finished.
    pub fn accept_named(mut self, name: impl Into<String>) -> Self {
        self.acceptor = Some(AcceptorRef::Named(name.into()));
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn handler(mut self, handler: FlagHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn long_desc(mut self, lines: Vec<String>) -> Self {
        self.long_desc = lines;
        self
    }

    /// Places the flag in a named flag group of the tool.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Completes values from a fixed list.
    pub fn complete_values<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.complete_with(Arc::new(EnumCompletion::new(values)))
    }

    pub fn complete_with(mut self, completion: Arc<dyn Completion>) -> Self {
        self.value_completion = Some(CompletionRef::Resolved(completion));
        self
    }

    /// Uses a named value completion, resolved when the tool is finished.
    pub fn complete_named(mut self, name: impl Into<String>) -> Self {
        self.value_completion = Some(CompletionRef::Named(name.into()));
        self
    }

    /// When `false`, spellings already used on the tool are silently
    /// dropped instead of raising a collision error.
    pub fn report_collisions(mut self, report: bool) -> Self {
        self.report_collisions = report;
        self
    }

    pub fn build(self) -> Result<Flag, DefinitionError> {
        if self.key.is_empty() {
            return Err(DefinitionError::EmptyFlagKey);
        }
        let needs_value = self.acceptor.is_some()
            || self.default.as_ref().is_some_and(Value::implies_flag_value);
        let mut syntax = self
            .syntax
            .iter()
            .map(|s| FlagSyntax::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        if syntax.is_empty() {
            syntax.push(FlagSyntax::parse(&default_syntax(&self.key, needs_value))?);
        }

        let canonical = canonicalize(&self.key, &syntax, needs_value)?;
        for s in &mut syntax {
            s.configure_canonical(
                canonical.kind,
                canonical.arity,
                &canonical.label,
                canonical.delimiter.as_deref(),
            );
        }
        let value_delim = match canonical.kind {
            FlagKind::Value => syntax
                .iter()
                .rev()
                .find(|s| s.style == FlagStyle::Long)
                .or_else(|| syntax.last())
                .map(|s| s.delimiter.clone())
                .unwrap_or_default(),
            FlagKind::Boolean => String::new(),
        };

        let mut flag = Flag {
            key: self.key,
            syntax,
            acceptor: self.acceptor,
            handler: self.handler,
            default: self.default.unwrap_or_default(),
            kind: canonical.kind,
            arity: canonical.arity,
            value_label: (canonical.kind == FlagKind::Value).then_some(canonical.label),
            value_delim,
            desc: self.desc,
            long_desc: self.long_desc,
            group: self.group,
            value_completion: self.value_completion,
            report_collisions: self.report_collisions,
            display_name: String::new(),
            sort_str: String::new(),
        };
        flag.refresh_display();
        Ok(flag)
    }
}

fn default_syntax(key: &str, needs_value: bool) -> String {
    let name = kebab_case(key);
    match (name.chars().count() == 1, needs_value) {
        (true, false) => format!("-{name}"),
        (true, true) => format!("-{name} VALUE"),
        (false, false) => format!("--{name}"),
        (false, true) => format!("--{name}=VALUE"),
    }
}

struct Canonical {
    kind: FlagKind,
    arity: Option<ValueArity>,
    label: String,
    delimiter: Option<String>,
}

/// Scans short spellings, then long spellings, each newest first; the
/// last spelling scanned that determines a value sets the shared label
/// and delimiter.
fn canonicalize(
    key: &str,
    syntax: &[FlagSyntax],
    needs_value: bool,
) -> Result<Canonical, DefinitionError> {
    let mut kind = None;
    let mut arity = None;
    let mut label = None;
    let mut delimiter = None;

    let shorts = syntax.iter().filter(|s| s.style == FlagStyle::Short).rev();
    let longs = syntax.iter().filter(|s| s.style == FlagStyle::Long).rev();
    for s in shorts.chain(longs) {
        let Some(found) = s.kind else {
            continue;
        };
        if kind.is_some_and(|k| k != found) {
            return Err(DefinitionError::ConflictingFlagKind {
                key: key.to_string(),
            });
        }
        kind = Some(found);
        if found != FlagKind::Value {
            continue;
        }
        if arity.is_some() && arity != s.arity {
            return Err(DefinitionError::ConflictingValueArity {
                key: key.to_string(),
            });
        }
        arity = s.arity;
        label = s.label.clone();
        delimiter = Some(s.delimiter.clone());
    }

    let kind = kind.unwrap_or(if needs_value {
        FlagKind::Value
    } else {
        FlagKind::Boolean
    });
    let arity = match kind {
        FlagKind::Value => Some(arity.unwrap_or(ValueArity::Required)),
        FlagKind::Boolean => None,
    };
    Ok(Canonical {
        kind,
        arity,
        label: label.unwrap_or_else(|| "VALUE".to_string()),
        delimiter,
    })
}

/// One spelling that matched a token.
#[derive(Debug, Clone, Copy)]
pub struct FlagMatch<'a> {
    pub flag: &'a Flag,
    pub syntax: &'a FlagSyntax,
    pub spelling: &'a str,
    pub negative: bool,
    pub exact: bool,
}

/// Outcome of matching a token against one or more flags.
///
/// Exact matches beat prefix matches: once an exact match is recorded,
/// prefix matches are discarded. Among matches of the same precision,
/// the ambiguity count is the number of distinct `(flag, polarity)` pairs.
#[derive(Debug, Clone)]
pub struct FlagResolution<'a> {
    token: String,
    exact: bool,
    matches: Vec<FlagMatch<'a>>,
}

impl<'a> FlagResolution<'a> {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            exact: false,
            matches: Vec::new(),
        }
    }

    fn add(&mut self, found: FlagMatch<'a>) {
        if found.exact && !self.exact {
            self.matches.clear();
            self.exact = true;
        } else if found.exact != self.exact {
            return;
        }
        self.matches.push(found);
    }

    /// Folds another flag's resolution of the same token into this one.
    pub fn merge(&mut self, other: FlagResolution<'a>) {
        for found in other.matches {
            self.add(found);
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `true` if the surviving matches are exact spellings.
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    fn distinct(&self) -> Vec<&FlagMatch<'a>> {
        let mut distinct: Vec<&FlagMatch<'a>> = Vec::new();
        for found in &self.matches {
            let seen = distinct
                .iter()
                .any(|d| std::ptr::eq(d.flag, found.flag) && d.negative == found.negative);
            if !seen {
                distinct.push(found);
            }
        }
        distinct
    }

    pub fn count(&self) -> usize {
        self.distinct().len()
    }

    pub fn is_not_found(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn is_unique(&self) -> bool {
        self.count() == 1
    }

    pub fn is_ambiguous(&self) -> bool {
        self.count() > 1
    }

    /// The single match, if the token resolved unambiguously.
    pub fn unique(&self) -> Option<&FlagMatch<'a>> {
        match self.distinct().as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn matches(&self) -> &[FlagMatch<'a>] {
        &self.matches
    }

    /// Sorted, deduplicated spellings that matched, for diagnostics and
    /// completion.
    pub fn matching_spellings(&self) -> Vec<String> {
        let mut spellings: Vec<String> = self.matches.iter().map(|m| m.spelling.to_string()).collect();
        spellings.sort();
        spellings.dedup();
        spellings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(key: &str, syntax: &[&str]) -> Flag {
        syntax
            .iter()
            .fold(FlagBuilder::new(key), |b, s| b.syntax(*s))
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_short_forms() {
        let s = FlagSyntax::parse("-a").unwrap();
        assert_eq!((s.style(), s.kind()), (FlagStyle::Short, None));

        let s = FlagSyntax::parse("-o FILE").unwrap();
        assert_eq!(s.kind(), Some(FlagKind::Value));
        assert_eq!(s.arity(), Some(ValueArity::Required));
        assert_eq!(s.delimiter(), " ");
        assert_eq!(s.canonical(), "-o FILE");

        let s = FlagSyntax::parse("-oFILE").unwrap();
        assert_eq!(s.delimiter(), "");
        assert_eq!(s.label(), Some("FILE"));

        let s = FlagSyntax::parse("-j[N]").unwrap();
        assert_eq!(s.arity(), Some(ValueArity::Optional));
        assert_eq!(s.canonical(), "-j[N]");

        let s = FlagSyntax::parse("-j[ N]").unwrap();
        assert_eq!(s.delimiter(), " ");
        assert_eq!(s.canonical(), "-j[ N]");
    }

    #[test]
    fn test_parse_long_forms() {
        let s = FlagSyntax::parse("--out=FILE").unwrap();
        assert_eq!((s.delimiter(), s.label()), ("=", Some("FILE")));

        let s = FlagSyntax::parse("--out FILE").unwrap();
        assert_eq!(s.delimiter(), " ");

        let s = FlagSyntax::parse("--out[=FILE]").unwrap();
        assert_eq!(s.arity(), Some(ValueArity::Optional));
        assert_eq!(s.canonical(), "--out[=FILE]");

        let s = FlagSyntax::parse("--out=[FILE]").unwrap();
        assert_eq!(s.arity(), Some(ValueArity::Optional));

        let s = FlagSyntax::parse("--[no-]color").unwrap();
        assert_eq!(s.kind(), Some(FlagKind::Boolean));
        assert_eq!(s.spellings().collect::<Vec<_>>(), vec!["--color", "--no-color"]);
        assert_eq!(s.canonical(), "--[no-]color");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["", "-", "--", "x", "---a", "-ab c", "--a b c", "--[no-]a=X", "--=X"] {
            assert!(FlagSyntax::parse(text).is_err(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn test_canonicalize_spreads_value_to_plain_spellings() {
        let f = flag("output", &["-o", "--output=FILE"]);
        assert_eq!(f.kind(), FlagKind::Value);
        assert_eq!(f.arity(), Some(ValueArity::Required));
        assert_eq!(f.value_label(), Some("FILE"));
        let short = f.short_flag_syntax().next().unwrap();
        assert_eq!(short.canonical(), "-o FILE");
        assert_eq!(f.display_name(), "--output=FILE");
    }

    #[test]
    fn test_canonicalize_long_delimiter_default() {
        let f = flag("output", &["-oFILE", "--output"]);
        let long = f.long_flag_syntax().next().unwrap();
        assert_eq!(long.canonical(), "--output=FILE");
        let short = f.short_flag_syntax().next().unwrap();
        assert_eq!(short.canonical(), "-oFILE");
    }

    #[test]
    fn test_canonicalize_optional_value() {
        let f = flag("level", &["-l", "--level[=N]"]);
        assert_eq!(f.arity(), Some(ValueArity::Optional));
        let short = f.short_flag_syntax().next().unwrap();
        assert_eq!(short.canonical(), "-l[ N]");
    }

    #[test]
    fn test_canonicalize_rejects_mixed_kinds() {
        let err = FlagBuilder::new("x")
            .syntax("--[no-]x")
            .syntax("-x VAL")
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::ConflictingFlagKind { key: "x".into() });

        let err = FlagBuilder::new("x")
            .syntax("-x VAL")
            .syntax("--x[=VAL]")
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::ConflictingValueArity { key: "x".into() });
    }

    #[test]
    fn test_default_syntax_from_key() {
        let f = FlagBuilder::new("v").build().unwrap();
        assert_eq!(f.display_name(), "-v");
        let f = FlagBuilder::new("n").accept_named("integer").build().unwrap();
        assert_eq!(f.display_name(), "-n VALUE");
        assert_eq!(f.kind(), FlagKind::Value);
        let f = FlagBuilder::new("dry_run").default(false).build().unwrap();
        assert_eq!(f.display_name(), "--dry-run");
        assert_eq!(f.kind(), FlagKind::Boolean);
    }

    #[test]
    fn test_plain_spellings_with_acceptor_become_valued() {
        let f = FlagBuilder::new("count")
            .syntax("-c")
            .syntax("--count")
            .accept_named("integer")
            .build()
            .unwrap();
        assert_eq!(f.kind(), FlagKind::Value);
        assert_eq!(f.display_name(), "--count=VALUE");
        assert_eq!(f.short_flag_syntax().next().unwrap().canonical(), "-c VALUE");
    }

    #[test]
    fn test_negatable_round_trip() {
        let f = flag("verbose", &["--[no-]verbose"]);
        assert_eq!(f.display_name(), "--[no-]verbose");

        let r = f.resolve("--verbose");
        let m = r.unique().unwrap();
        assert!(m.exact && !m.negative);

        let r = f.resolve("--no-verbose");
        let m = r.unique().unwrap();
        assert!(m.exact && m.negative);

        let r = f.resolve("--no-v");
        let m = r.unique().unwrap();
        assert!(!m.exact && m.negative);
    }

    #[test]
    fn test_resolution_merges_across_flags() {
        let foo = flag("foo", &["--foo"]);
        let force = flag("force", &["--force"]);

        let mut r = foo.resolve("--fo");
        r.merge(force.resolve("--fo"));
        assert!(r.is_ambiguous());
        assert_eq!(r.count(), 2);
        assert_eq!(r.matching_spellings(), vec!["--foo", "--force"]);

        let mut r = foo.resolve("--foo");
        r.merge(force.resolve("--foo"));
        let m = r.unique().unwrap();
        assert!(m.exact);
        assert_eq!(m.flag.key(), "foo");

        let mut r = force.resolve("--foo");
        r.merge(foo.resolve("--foo"));
        assert_eq!(r.unique().unwrap().flag.key(), "foo");

        let r = foo.resolve("--bar");
        assert!(r.is_not_found());
    }

    #[test]
    fn test_prefix_of_two_spellings_of_one_flag_is_unique() {
        let f = flag("verbose", &["--verbose", "--verb"]);
        let r = f.resolve("--ve");
        assert!(r.is_unique());
        assert_eq!(r.matching_spellings(), vec!["--verb", "--verbose"]);
    }

    #[test]
    fn test_push_handler() {
        let push = FlagHandler::Push;
        let once = push.apply(Value::from("a"), None);
        let twice = push.apply(Value::from("b"), Some(&once));
        assert_eq!(twice, Value::List(vec![Value::from("a"), Value::from("b")]));
    }
}
