//! Error types for tool definitions and argument parsing.
//!
//! Two families are kept apart:
//!
//! - [`DefinitionError`] is raised while a tool is being defined (bad flag
//!   syntax, colliding spellings, alias cycles, ...). It aborts the
//!   configuration unit that produced it.
//! - [`UsageError`] describes a problem with the arguments given to a
//!   resolved tool. These are collected by the
//!   [`ArgParser`](crate::ArgParser) and returned as values.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Kind of a named, inheritable registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Acceptor,
    Mixin,
    Template,
    Completion,
    Middleware,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acceptor => "acceptor",
            Self::Mixin => "mixin",
            Self::Template => "template",
            Self::Completion => "completion",
            Self::Middleware => "middleware",
        };
        f.write_str(name)
    }
}

/// Errors raised while defining tools.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A tool name word is empty or contains control, quoting or shell
    /// metacharacters.
    #[error("illegal tool name word: {0:?}")]
    IllegalWord(String),
    /// A flag syntax string matches none of the recognized shapes.
    #[error("illegal flag syntax: {0:?}")]
    IllegalFlagSyntax(String),
    /// A flag key is empty.
    #[error("flag key cannot be empty")]
    EmptyFlagKey,
    /// An argument key is empty.
    #[error("argument key cannot be empty")]
    EmptyArgKey,
    /// A flag declares both boolean and valued spellings.
    #[error("flag {key:?} cannot have both boolean and valued forms")]
    ConflictingFlagKind { key: String },
    /// A flag declares both required-value and optional-value spellings.
    #[error("flag {key:?} cannot have both required and optional values")]
    ConflictingValueArity { key: String },
    /// A flag spelling is already used by another flag or was reserved.
    #[error("cannot use flag {spelling:?} because it is already assigned or reserved")]
    FlagCollision { spelling: String },
    /// A flag refers to a flag group the tool does not have.
    #[error("no flag group named {0:?}")]
    UnknownFlagGroup(String),
    /// A flag group name is used twice on the same tool.
    #[error("flag group {0:?} is already defined")]
    DuplicateFlagGroup(String),
    /// A second catch-all argument was declared.
    #[error("tool already has a remaining-args slot {0:?}")]
    DuplicateRemainingArg(String),
    /// A named acceptor, mixin, template or completion is registered twice
    /// in the same scope.
    #[error("duplicate {kind} named {name:?}")]
    DuplicateName { kind: NameKind, name: String },
    /// A named acceptor, mixin, template or completion could not be found
    /// in the tool ancestry nor in the loader registries.
    #[error("unknown {kind} named {name:?}")]
    UnknownName { kind: NameKind, name: String },
    /// An acceptor regular expression failed to compile.
    #[error("invalid acceptor pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
    /// Following an alias chain revisited a name.
    #[error("alias cycle detected: {}", join_paths(.0))]
    AliasCycle(Vec<Vec<String>>),
    /// Following a delegation chain revisited a tool.
    #[error("delegation cycle detected: {}", join_paths(.0))]
    DelegationCycle(Vec<Vec<String>>),
    /// A tool is defined twice at the same priority.
    #[error("tool {0:?} is already defined at this priority")]
    AlreadyDefined(String),
    /// A name is an alias at this priority and cannot also be a tool.
    #[error("{0:?} is an alias and cannot be defined as a tool")]
    NameIsAlias(String),
    /// A name is a tool at this priority and cannot also be an alias.
    #[error("cannot make {0:?} an alias because it is already defined")]
    NameIsTool(String),
    /// A tool was modified after its definition was finished.
    #[error("tool {0:?} is finished and can no longer be modified")]
    ToolFinished(String),
    /// A source was registered after loading started.
    #[error("cannot add a source after loading has started")]
    SourceAfterLoading,
    /// A configuration file could not be interpreted.
    #[error("invalid tool file: {0}")]
    InvalidToolFile(String),
}

fn join_paths(paths: &[Vec<String>]) -> String {
    paths
        .iter()
        .map(|words| format!("{:?}", words.join(" ")))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Problems with the arguments passed to a resolved tool.
///
/// These are plain values: the [`ArgParser`](crate::ArgParser) collects
/// them and the caller decides how to report them and which exit status
/// to use.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageError {
    #[error("flag {spelling:?} is not recognized")]
    FlagUnrecognized {
        spelling: String,
        suggestions: Vec<String>,
    },
    #[error("flag prefix {spelling:?} is ambiguous; could be: {}", candidates.join(", "))]
    FlagAmbiguous {
        spelling: String,
        candidates: Vec<String>,
    },
    #[error("flag {flag:?} is missing its value")]
    FlagValueMissing { flag: String },
    #[error("flag {flag:?} does not take a value")]
    FlagValueNotAllowed { flag: String },
    #[error("unacceptable value {value:?} for flag {flag:?} (expected {type_desc})")]
    FlagValueNotAccepted {
        flag: String,
        value: String,
        type_desc: String,
        suggestions: Vec<String>,
    },
    #[error("unacceptable value {value:?} for argument {arg} (expected {type_desc})")]
    ArgValueNotAccepted {
        arg: String,
        value: String,
        type_desc: String,
        suggestions: Vec<String>,
    },
    #[error("missing required arguments: {}", names.join(", "))]
    ArgsMissing { names: Vec<String> },
    #[error("extra arguments: {}", args.join(" "))]
    ExtraArgs { args: Vec<String> },
    #[error("tool not found: {:?}", words.join(" "))]
    ToolNotFound {
        words: Vec<String>,
        suggestions: Vec<String>,
    },
    #[error("flag {flag:?} is required")]
    FlagRequired { flag: String },
    #[error("exactly one or at least one of these flags is required: {}", flags.join(", "))]
    FlagGroupRequiresOne { group: String, flags: Vec<String> },
    #[error("at most one of these flags may be given: {}", flags.join(", "))]
    FlagGroupConflict { group: String, flags: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_cycle_message_lists_path() {
        let err = DefinitionError::AliasCycle(vec![
            vec!["x".to_string()],
            vec!["y".to_string()],
            vec!["x".to_string()],
        ]);
        assert_eq!(err.to_string(), r#"alias cycle detected: "x" -> "y" -> "x""#);
    }

    #[test]
    fn test_usage_error_serializes_with_kind_tag() {
        let err = UsageError::ExtraArgs {
            args: vec!["a".into()],
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "extra_args");
        assert_eq!(json["args"][0], "a");
    }
}
