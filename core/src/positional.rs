//! Positional argument slots.

use std::sync::Arc;

use crate::acceptor::{Acceptor, AcceptorRef};
use crate::completion::{Completion, CompletionRef};
use crate::value::Value;

/// How many words a positional slot binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgArity {
    Required,
    Optional,
    /// Catch-all: binds every word left after the other slots are filled.
    Remaining,
}

/// One positional slot bound to a context key.
///
/// # Example
///
/// ```
/// use tooltree_core::{ArgArity, PositionalArg, Value};
///
/// let arg = PositionalArg::optional("greeting").default(Value::from("world"));
/// assert_eq!(arg.arity(), ArgArity::Optional);
/// assert_eq!(arg.display_name(), "GREETING");
/// ```
#[derive(Debug, Clone)]
pub struct PositionalArg {
    key: String,
    arity: ArgArity,
    acceptor: Option<AcceptorRef>,
    default: Value,
    display_name: String,
    desc: String,
    long_desc: Vec<String>,
    completion: Option<CompletionRef>,
}

impl PositionalArg {
    fn new(key: impl Into<String>, arity: ArgArity) -> Self {
        let key = key.into();
        Self {
            display_name: key.replace('-', "_").to_uppercase(),
            key,
            arity,
            acceptor: None,
            default: match arity {
                ArgArity::Remaining => Value::List(Vec::new()),
                _ => Value::Null,
            },
            desc: String::new(),
            long_desc: Vec::new(),
            completion: None,
        }
    }

    pub fn required(key: impl Into<String>) -> Self {
        Self::new(key, ArgArity::Required)
    }

    pub fn optional(key: impl Into<String>) -> Self {
        Self::new(key, ArgArity::Optional)
    }

    pub fn remaining(key: impl Into<String>) -> Self {
        Self::new(key, ArgArity::Remaining)
    }

    pub fn accept(mut self, acceptor: Arc<dyn Acceptor>) -> Self {
        self.acceptor = Some(AcceptorRef::Resolved(acceptor));
        self
    }

    pub fn accept_named(mut self, name: impl Into<String>) -> Self {
        self.acceptor = Some(AcceptorRef::Named(name.into()));
        self
    }

    /// Default bound when the argument is not supplied. Ignored for
    /// required arguments.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        if self.arity != ArgArity::Required {
            self.default = value.into();
        }
        self
    }

    pub fn display_as(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
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

    pub fn complete_with(mut self, completion: Arc<dyn Completion>) -> Self {
        self.completion = Some(CompletionRef::Resolved(completion));
        self
    }

    pub fn complete_named(mut self, name: impl Into<String>) -> Self {
        self.completion = Some(CompletionRef::Named(name.into()));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn arity(&self) -> ArgArity {
        self.arity
    }

    pub fn acceptor(&self) -> Option<&AcceptorRef> {
        self.acceptor.as_ref()
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn long_description(&self) -> &[String] {
        &self.long_desc
    }

    pub fn completion(&self) -> Option<&CompletionRef> {
        self.completion.as_ref()
    }

    pub(crate) fn set_acceptor(&mut self, acceptor: AcceptorRef) {
        self.acceptor = Some(acceptor);
    }

    pub(crate) fn set_completion(&mut self, completion: CompletionRef) {
        self.completion = Some(completion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_has_no_default() {
        let arg = PositionalArg::required("path").default("ignored");
        assert_eq!(arg.default_value(), &Value::Null);
    }

    #[test]
    fn test_remaining_defaults_to_empty_list() {
        let arg = PositionalArg::remaining("rest");
        assert_eq!(arg.default_value(), &Value::List(Vec::new()));
        assert_eq!(arg.display_name(), "REST");
    }

    #[test]
    fn test_display_name_upper_snake() {
        assert_eq!(PositionalArg::optional("out-dir").display_name(), "OUT_DIR");
    }
}
