//! Binds command-line arguments to a resolved tool's flags and positional
//! slots.
//!
//! The parser is incremental: [`ArgParser::parse`] may be called several
//! times, and its intermediate state (a flag still waiting for its value,
//! the next positional slot) is what completion inspects. Problems are
//! collected as [`UsageError`] values; nothing here is fatal.
//!
//! # Example
//!
//! ```
//! use tooltree_core::{ArgParser, FlagBuilder, PositionalArg, ToolDefinition, Value};
//!
//! let mut tool = ToolDefinition::new(vec!["greet".into()], 0);
//! tool.add_flag(FlagBuilder::new("loud").syntax("-l").syntax("--[no-]loud").build().unwrap())
//!     .unwrap();
//! tool.add_positional(PositionalArg::optional("whom").default("world")).unwrap();
//!
//! let outcome = ArgParser::new(&tool).parse(["-l", "ruby"]).finish().into_outcome();
//! assert!(outcome.errors.is_empty());
//! assert_eq!(outcome.data["loud"], Value::Bool(true));
//! assert_eq!(outcome.data["whom"], Value::from("ruby"));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::acceptor::AcceptorRef;
use crate::error::UsageError;
use crate::flag::{Flag, FlagKind, ValueArity};
use crate::positional::{ArgArity, PositionalArg};
use crate::tool::ToolDefinition;
use crate::value::Value;
use crate::words::suggest;

/// Final result of parsing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub data: BTreeMap<String, Value>,
    pub errors: Vec<UsageError>,
}

#[derive(Debug, Clone)]
struct PendingFlag<'a> {
    flag: &'a Flag,
    spelling: String,
}

/// Incremental argument parser for one tool.
#[derive(Debug)]
pub struct ArgParser<'a> {
    tool: &'a ToolDefinition,
    data: BTreeMap<String, Value>,
    errors: Vec<UsageError>,
    seen_flags: BTreeSet<String>,
    active_flag: Option<PendingFlag<'a>>,
    positionals: Vec<&'a PositionalArg>,
    arg_index: usize,
    extra_args: Vec<String>,
    parsed_args: Vec<String>,
    flags_allowed: bool,
    subtool_names: Vec<String>,
    finished: bool,
}

impl<'a> ArgParser<'a> {
    /// Starts from the tool's default data.
    pub fn new(tool: &'a ToolDefinition) -> Self {
        Self {
            tool,
            data: tool.default_data().clone(),
            errors: Vec::new(),
            seen_flags: BTreeSet::new(),
            active_flag: None,
            positionals: tool
                .required_args()
                .iter()
                .chain(tool.optional_args())
                .collect(),
            arg_index: 0,
            extra_args: Vec::new(),
            parsed_args: Vec::new(),
            flags_allowed: !tool.argument_parsing_disabled(),
            subtool_names: Vec::new(),
            finished: false,
        }
    }

    /// Names offered as suggestions when extra words turn out to be an
    /// unknown subtool.
    pub fn with_subtool_names(mut self, names: Vec<String>) -> Self {
        self.subtool_names = names;
        self
    }

    pub fn tool(&self) -> &'a ToolDefinition {
        self.tool
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn errors(&self) -> &[UsageError] {
        &self.errors
    }

    pub fn parsed_args(&self) -> &[String] {
        &self.parsed_args
    }

    /// Keys of flags given so far.
    pub fn seen_flags(&self) -> &BTreeSet<String> {
        &self.seen_flags
    }

    /// The flag still waiting for a value, if any.
    pub fn active_flag(&self) -> Option<&'a Flag> {
        self.active_flag.as_ref().map(|p| p.flag)
    }

    /// The positional slot the next non-flag argument would bind to.
    pub fn next_arg(&self) -> Option<&'a PositionalArg> {
        self.positionals
            .get(self.arg_index)
            .copied()
            .or_else(|| self.tool.remaining_arg())
    }

    /// `false` after `--`, after the first positional when the tool
    /// enforces flags before args, or when parsing is disabled.
    pub fn flags_allowed(&self) -> bool {
        self.flags_allowed
    }

    /// `true` once any argument has been consumed.
    pub fn has_args(&self) -> bool {
        !self.parsed_args.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn parse<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.parse_arg(arg.as_ref());
        }
        self
    }

    fn parse_arg(&mut self, arg: &str) {
        if self.finished {
            return;
        }
        self.parsed_args.push(arg.to_string());
        if self.tool.argument_parsing_disabled() {
            self.handle_positional(arg);
            return;
        }
        if let Some(pending) = self.active_flag.take() {
            let optional = pending.flag.arity() == Some(ValueArity::Optional);
            if !(optional && self.flags_allowed && arg.starts_with('-')) {
                self.apply_flag_text(pending.flag, &pending.spelling, arg);
                return;
            }
            self.apply_flag_value(pending.flag, Value::Bool(true));
        }
        if self.flags_allowed {
            if arg == "--" {
                self.flags_allowed = false;
                return;
            }
            if let Some(body) = arg.strip_prefix("--").filter(|b| !b.is_empty()) {
                self.handle_long_flag(body);
                return;
            }
            if arg.len() > 1 && arg.starts_with('-') {
                self.handle_short_cluster(&arg[1..]);
                return;
            }
        }
        self.handle_positional(arg);
    }

    fn handle_long_flag(&mut self, body: &str) {
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (format!("--{name}"), Some(value)),
            None => (format!("--{body}"), None),
        };
        let Some((flag, negative)) = self.find_flag(&name) else {
            return;
        };
        let spelling = name;
        match (flag.kind(), value) {
            (FlagKind::Boolean, Some(_)) => {
                self.errors.push(UsageError::FlagValueNotAllowed { flag: spelling });
            }
            (FlagKind::Boolean, None) => self.apply_flag_value(flag, Value::Bool(!negative)),
            (FlagKind::Value, Some(text)) => self.apply_flag_text(flag, &spelling, text),
            (FlagKind::Value, None) => self.active_flag = Some(PendingFlag { flag, spelling }),
        }
    }

    fn handle_short_cluster(&mut self, cluster: &str) {
        for (index, ch) in cluster.char_indices() {
            let spelling = format!("-{ch}");
            let Some((flag, _)) = self.find_flag(&spelling) else {
                continue;
            };
            match flag.kind() {
                FlagKind::Boolean => self.apply_flag_value(flag, Value::Bool(true)),
                FlagKind::Value => {
                    let rest = &cluster[index + ch.len_utf8()..];
                    if rest.is_empty() {
                        self.active_flag = Some(PendingFlag { flag, spelling });
                    } else {
                        self.apply_flag_text(flag, &spelling, rest);
                    }
                    return;
                }
            }
        }
    }

    fn find_flag(&mut self, spelling: &str) -> Option<(&'a Flag, bool)> {
        let resolution = self.tool.resolve_flag(spelling);
        if let Some(found) = resolution.unique() {
            return Some((found.flag, found.negative));
        }
        if resolution.is_ambiguous() {
            self.errors.push(UsageError::FlagAmbiguous {
                spelling: spelling.to_string(),
                candidates: resolution.matching_spellings(),
            });
        } else {
            let known = self.tool.flags().iter().flat_map(|f| f.effective_flags());
            self.errors.push(UsageError::FlagUnrecognized {
                spelling: spelling.to_string(),
                suggestions: suggest(spelling, known),
            });
        }
        None
    }

    fn apply_flag_text(&mut self, flag: &'a Flag, spelling: &str, text: &str) {
        match accept(flag.acceptor(), text) {
            Ok(value) => self.apply_flag_value(flag, value),
            Err((type_desc, suggestions)) => self.errors.push(UsageError::FlagValueNotAccepted {
                flag: spelling.to_string(),
                value: text.to_string(),
                type_desc,
                suggestions,
            }),
        }
    }

    fn apply_flag_value(&mut self, flag: &'a Flag, value: Value) {
        let key = flag.key().to_string();
        let combined = flag.handler().apply(value, self.data.get(&key));
        self.seen_flags.insert(key.clone());
        self.data.insert(key, combined);
    }

    fn handle_positional(&mut self, arg: &str) {
        if self.tool.enforces_flags_before_args() {
            self.flags_allowed = false;
        }
        let Some(slot) = self.next_arg() else {
            self.extra_args.push(arg.to_string());
            return;
        };
        let value = match accept(slot.acceptor(), arg) {
            Ok(value) => value,
            Err((type_desc, suggestions)) => {
                self.errors.push(UsageError::ArgValueNotAccepted {
                    arg: slot.display_name().to_string(),
                    value: arg.to_string(),
                    type_desc,
                    suggestions,
                });
                if slot.arity() != ArgArity::Remaining {
                    self.arg_index += 1;
                }
                return;
            }
        };
        if slot.arity() == ArgArity::Remaining {
            let entry = self
                .data
                .entry(slot.key().to_string())
                .or_insert_with(|| Value::List(Vec::new()));
            match entry {
                Value::List(items) => items.push(value),
                other => *other = Value::List(vec![value]),
            }
        } else {
            self.data.insert(slot.key().to_string(), value);
            self.arg_index += 1;
        }
    }

    /// Closes parsing and records end-of-input errors: a flag missing its
    /// value, unfilled required slots, and leftover words. Leftover words
    /// on a tool that cannot run are reported as an unknown subtool.
    pub fn finish(mut self) -> Self {
        if self.finished {
            return self;
        }
        if let Some(pending) = self.active_flag.take() {
            match pending.flag.arity() {
                Some(ValueArity::Optional) => self.apply_flag_value(pending.flag, Value::Bool(true)),
                _ => self.errors.push(UsageError::FlagValueMissing {
                    flag: pending.spelling,
                }),
            }
        }
        let required = self.tool.required_args().len();
        if self.arg_index < required {
            let names = self.tool.required_args()[self.arg_index..]
                .iter()
                .map(|arg| arg.display_name().to_string())
                .collect();
            self.errors.push(UsageError::ArgsMissing { names });
        }
        if let Some(first) = self.extra_args.first() {
            if self.tool.is_runnable() {
                self.errors.push(UsageError::ExtraArgs {
                    args: self.extra_args.clone(),
                });
            } else {
                let mut words = self.tool.words().to_vec();
                words.push(first.clone());
                self.errors.push(UsageError::ToolNotFound {
                    words,
                    suggestions: suggest(first, &self.subtool_names),
                });
            }
        }
        for group in self.tool.flag_groups() {
            let display = |key: &str| {
                self.tool
                    .flags_for_key(key)
                    .next()
                    .map(|f| f.display_name().to_string())
                    .unwrap_or_else(|| key.to_string())
            };
            let errors = group.validate(&self.seen_flags, display);
            self.errors.extend(errors);
        }
        self.finished = true;
        self
    }

    pub fn into_outcome(self) -> ParseOutcome {
        ParseOutcome {
            data: self.data,
            errors: self.errors,
        }
    }
}

fn accept(acceptor: Option<&AcceptorRef>, text: &str) -> Result<Value, (String, Vec<String>)> {
    match acceptor.and_then(AcceptorRef::resolved) {
        Some(acceptor) => acceptor
            .accept(text)
            .ok_or_else(|| (acceptor.type_desc().to_string(), acceptor.suggestions(text))),
        None => Ok(Value::from(text)),
    }
}
