//! Tool, flag and argument model for hierarchical command-line tool trees.
//!
//! This crate defines the building blocks a loader assembles into tools:
//!
//! - [`FlagSyntax`] / [`Flag`]: textual flag spellings (`-v`,
//!   `--output=FILE`, `--[no-]color`) canonicalized into one consistent
//!   kind, arity and label, with exact-over-prefix resolution.
//! - [`PositionalArg`]: required, optional and catch-all slots.
//! - [`Acceptor`]: validation and conversion of textual values into
//!   [`Value`]s, with a registry of well-known acceptors.
//! - [`ToolDefinition`]: everything known about one tool at one priority.
//! - [`ArgParser`]: binds arguments to a tool, collecting [`UsageError`]s.
//! - [`Completion`]: the completion contract and
//!   [`StandardToolCompletion`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tooltree_core::*;
//!
//! let mut tool = ToolDefinition::new(vec!["deploy".into()], 0);
//! tool.add_flag(
//!     FlagBuilder::new("env")
//!         .syntax("-e")
//!         .syntax("--env=NAME")
//!         .accept(Arc::new(EnumAcceptor::strings(["staging", "prod"])))
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//! tool.add_positional(PositionalArg::optional("tag").default("latest")).unwrap();
//!
//! let outcome = ArgParser::new(&tool).parse(["--env", "prod"]).finish().into_outcome();
//! assert_eq!(outcome.data["env"], Value::from("prod"));
//! assert_eq!(outcome.data["tag"], Value::from("latest"));
//!
//! let outcome = ArgParser::new(&tool).parse(["--env=dev"]).finish().into_outcome();
//! assert!(matches!(outcome.errors[0], UsageError::FlagValueNotAccepted { .. }));
//! ```

mod acceptor;
mod completion;
mod error;
mod flag;
mod flag_group;
mod parser;
mod positional;
mod tool;
mod value;
mod words;

pub use acceptor::{
    Acceptor, AcceptorRef, AcceptorRegistry, EnumAcceptor, MatchResult, PatternAcceptor,
    RangeAcceptor, SimpleAcceptor, parse_boolean, parse_float, parse_integer, parse_numeric,
    parse_rational,
};
pub use completion::{
    Candidate, Completion, CompletionContext, CompletionRef, EnumCompletion,
    FileSystemCompletion, StandardToolCompletion, ToolLookup, completion_for,
};
pub use error::{DefinitionError, NameKind, UsageError};
pub use flag::{
    Flag, FlagBuilder, FlagHandler, FlagKind, FlagMatch, FlagResolution, FlagStyle, FlagSyntax,
    ValueArity,
};
pub use flag_group::{FlagGroup, FlagGroupKind};
pub use parser::{ArgParser, ParseOutcome};
pub use positional::{ArgArity, PositionalArg};
pub use tool::{NameResolver, RunHandler, ToolContext, ToolDefinition};
pub use value::{Rational, Value};
pub use words::{
    display_words, is_hidden_word, is_prefix, kebab_case, looks_like_flag, split_delimited,
    suggest, validate_word, validate_words,
};
