//! YAML tool files.
//!
//! One file defines one tool; its stem is the tool name. Nested tools are
//! declared under `tools:` and are only evaluated when a lookup reaches
//! them.
//!
//! # Example
//!
//! ```yaml
//! desc: Deploy the service
//! flags:
//!   - key: env
//!     syntax: ["-e", "--env=NAME"]
//!     accept: { enum: [staging, prod] }
//!   - key: dry_run
//! args:
//!   - key: tag
//!     arity: optional
//!     default: latest
//! exec: ["./scripts/deploy.sh"]
//! tools:
//!   rollback:
//!     desc: Roll back the last deploy
//!     exec: ["./scripts/rollback.sh"]
//! aliases:
//!   rb: rollback
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tooltree_core::{
    Acceptor, CompletionRef, DefinitionError, EnumAcceptor, EnumCompletion, FlagBuilder,
    FlagGroupKind, FlagHandler, PatternAcceptor, PositionalArg, RangeAcceptor, ToolContext, Value,
};

use crate::scope::ToolScope;

/// Evaluates the text of one tool file into a scope.
pub trait ToolFileEvaluator: Send + Sync {
    fn evaluate(&self, text: &str, path: &Path, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError>;
}

/// The YAML front end.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlEvaluator;

impl ToolFileEvaluator for YamlEvaluator {
    fn evaluate(&self, text: &str, path: &Path, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError> {
        let file = ToolFile::parse(text)
            .map_err(|e| DefinitionError::InvalidToolFile(format!("{}: {e}", path.display())))?;
        file.apply(scope)
    }
}

/// Word path written either as one space-separated string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WordsSpec {
    Joined(String),
    List(Vec<String>),
}

impl Default for WordsSpec {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl WordsSpec {
    pub fn to_words(&self) -> Vec<String> {
        match self {
            Self::Joined(text) => text.split_whitespace().map(str::to_string).collect(),
            Self::List(words) => words.clone(),
        }
    }
}

/// One spelling or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl OneOrMany {
    fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(one) => vec![one.clone()],
            Self::Many(many) => many.clone(),
        }
    }
}

/// An inline acceptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum AcceptorSpec {
    Enum(Vec<Value>),
    Pattern(String),
    Range { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
}

impl AcceptorSpec {
    pub fn build(&self) -> Result<Arc<dyn Acceptor>, DefinitionError> {
        Ok(match self {
            Self::Enum(values) => {
                let desc = values.iter().map(ToString::to_string).collect::<Vec<_>>().join("|");
                Arc::new(EnumAcceptor::new(desc, values.clone()))
            }
            Self::Pattern(pattern) => Arc::new(PatternAcceptor::new(pattern.clone(), pattern)?),
            Self::Range { min, max } => Arc::new(RangeAcceptor::integer(*min..=*max)),
            Self::FloatRange { min, max } => Arc::new(RangeAcceptor::float(*min, *max)),
        })
    }
}

/// An acceptor given by name or inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcceptSpec {
    Named(String),
    Inline(AcceptorSpec),
}

/// A value completion: a fixed list or a registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompleteSpec {
    Values(Vec<String>),
    Named(String),
}

impl CompleteSpec {
    fn to_ref(&self) -> CompletionRef {
        match self {
            Self::Values(values) => CompletionRef::Resolved(Arc::new(EnumCompletion::new(values.clone()))),
            Self::Named(name) => CompletionRef::Named(name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSpec {
    #[default]
    Set,
    Push,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSpec {
    pub key: String,
    #[serde(default)]
    pub syntax: OneOrMany,
    #[serde(default)]
    pub accept: Option<AcceptSpec>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub handler: HandlerSpec,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub long_desc: Vec<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub complete: Option<CompleteSpec>,
    #[serde(default = "default_true")]
    pub report_collisions: bool,
}

fn default_true() -> bool {
    true
}

impl FlagSpec {
    fn builder(&self) -> Result<FlagBuilder, DefinitionError> {
        let mut builder = FlagBuilder::new(self.key.clone())
            .desc(self.desc.clone())
            .long_desc(self.long_desc.clone())
            .report_collisions(self.report_collisions)
            .handler(match self.handler {
                HandlerSpec::Set => FlagHandler::Set,
                HandlerSpec::Push => FlagHandler::Push,
            });
        for syntax in self.syntax.to_vec() {
            builder = builder.syntax(syntax);
        }
        builder = match &self.accept {
            Some(AcceptSpec::Named(name)) => builder.accept_named(name.clone()),
            Some(AcceptSpec::Inline(spec)) => builder.accept(spec.build()?),
            None => builder,
        };
        if let Some(default) = &self.default {
            builder = builder.default(default.clone());
        }
        if let Some(group) = &self.group {
            builder = builder.group(group.clone());
        }
        builder = match self.complete.as_ref().map(CompleteSpec::to_ref) {
            Some(CompletionRef::Resolved(completion)) => builder.complete_with(completion),
            Some(CompletionRef::Named(name)) => builder.complete_named(name),
            None => builder,
        };
        Ok(builder)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AritySpec {
    #[default]
    Required,
    Optional,
    Remaining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgSpec {
    pub key: String,
    #[serde(default)]
    pub arity: AritySpec,
    #[serde(default)]
    pub accept: Option<AcceptSpec>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub long_desc: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub complete: Option<CompleteSpec>,
}

impl ArgSpec {
    /// Applies everything but the arity; an inline acceptor is built up
    /// front so the failure surfaces before the argument is added.
    fn configure(&self, mut arg: PositionalArg, acceptor: Option<Arc<dyn Acceptor>>) -> PositionalArg {
        arg = arg.desc(self.desc.clone()).long_desc(self.long_desc.clone());
        if let Some(acceptor) = acceptor {
            arg = arg.accept(acceptor);
        } else if let Some(AcceptSpec::Named(name)) = &self.accept {
            arg = arg.accept_named(name.clone());
        }
        if let Some(default) = &self.default {
            arg = arg.default(default.clone());
        }
        if let Some(name) = &self.display_name {
            arg = arg.display_as(name.clone());
        }
        match self.complete.as_ref().map(CompleteSpec::to_ref) {
            Some(CompletionRef::Resolved(completion)) => arg.complete_with(completion),
            Some(CompletionRef::Named(name)) => arg.complete_named(name),
            None => arg,
        }
    }

    fn apply(&self, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError> {
        let acceptor = match &self.accept {
            Some(AcceptSpec::Inline(spec)) => Some(spec.build()?),
            _ => None,
        };
        let configure = |arg| self.configure(arg, acceptor);
        match self.arity {
            AritySpec::Required => scope.required_arg(self.key.clone(), configure)?,
            AritySpec::Optional => scope.optional_arg(self.key.clone(), configure)?,
            AritySpec::Remaining => scope.remaining_args(self.key.clone(), configure)?,
        };
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagGroupSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FlagGroupKind,
    #[serde(default)]
    pub desc: String,
}

/// The contents of one YAML tool file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolFile {
    pub desc: Option<String>,
    pub long_desc: Vec<String>,
    pub flags: Vec<FlagSpec>,
    pub flag_groups: Vec<FlagGroupSpec>,
    pub args: Vec<ArgSpec>,
    pub acceptors: BTreeMap<String, AcceptorSpec>,
    #[serde(deserialize_with = "ordered_map")]
    pub tools: Vec<(String, ToolFile)>,
    #[serde(deserialize_with = "ordered_map")]
    pub aliases: Vec<(String, WordsSpec)>,
    pub delegate_to: Option<WordsSpec>,
    pub exec: Option<Vec<String>>,
    pub include: Vec<String>,
    pub load: Vec<PathBuf>,
    pub disable_flags: Vec<String>,
    pub enforce_flags_before_args: bool,
    pub require_exact_flag_match: bool,
    pub disable_argument_parsing: bool,
    pub complete: Option<CompleteSpec>,
}

impl ToolFile {
    /// Parses a tool file. An empty document is an empty tool.
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Applies the file's declarations to `scope`.
    pub fn apply(&self, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError> {
        for (name, spec) in &self.acceptors {
            scope.acceptor(name.clone(), spec.build()?)?;
        }
        if let Some(desc) = &self.desc {
            scope.desc(desc.clone())?;
        }
        if !self.long_desc.is_empty() {
            scope.long_desc(self.long_desc.clone())?;
        }
        for mixin in &self.include {
            scope.include(mixin)?;
        }
        if !self.disable_flags.is_empty() {
            scope.disable_flag(self.disable_flags.as_slice())?;
        }
        for group in &self.flag_groups {
            scope.flag_group(group.kind, group.name.clone(), group.desc.clone())?;
        }
        for flag in &self.flags {
            scope.flag(flag.builder()?)?;
        }
        for arg in &self.args {
            arg.apply(scope)?;
        }
        if let Some(target) = &self.delegate_to {
            scope.delegate_to(target.to_words().as_slice())?;
        }
        if let Some(argv) = &self.exec {
            scope.on_run(exec_handler(argv.clone()))?;
        }
        if self.enforce_flags_before_args {
            scope.enforce_flags_before_args()?;
        }
        if self.require_exact_flag_match {
            scope.require_exact_flag_match()?;
        }
        if self.disable_argument_parsing {
            scope.disable_argument_parsing()?;
        }
        if let Some(complete) = &self.complete {
            scope.complete_with(complete.to_ref())?;
        }
        for path in &self.load {
            scope.load(path)?;
        }
        for (name, target) in &self.aliases {
            let target = target.to_words();
            if target.is_empty() {
                return Err(DefinitionError::InvalidToolFile(format!("alias {name:?} has no target")));
            }
            scope.alias_tool(name, target.as_slice())?;
        }
        for (name, spec) in &self.tools {
            let spec = Arc::new(spec.clone());
            scope.tool(name, move |nested: &mut ToolScope<'_>| {
                nested.claim_tool()?;
                spec.apply(nested)
            })?;
        }
        Ok(())
    }
}

/// Builds a run handler that executes `argv` followed by the tool's raw
/// arguments.
///
/// Bound data is exported as `TOOLTREE_<KEY>` variables, the tool path as
/// `TOOLTREE_TOOL`. The child runs in the tool's context directory.
fn exec_handler(argv: Vec<String>) -> impl Fn(&ToolContext) -> i32 + Send + Sync + 'static {
    move |ctx: &ToolContext| {
        let Some((program, fixed)) = argv.split_first() else {
            return 0;
        };
        let mut command = Command::new(program);
        command.args(fixed).args(&ctx.args);
        command.env("TOOLTREE_TOOL", ctx.words.join(" "));
        for (key, value) in &ctx.data {
            command.env(env_name(key), value.to_string());
        }
        if let Some(dir) = &ctx.context_directory {
            command.current_dir(dir);
        }
        debug!(program = %program, tool = %ctx.words.join(" "), "executing tool command");
        match command.status() {
            Ok(status) => status.code().unwrap_or(1),
            Err(err) => {
                warn!(program = %program, error = %err, "failed to start tool command");
                127
            }
        }
    }
}

fn env_name(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("TOOLTREE_{key}")
}

/// Deserializes a mapping into a vector of entries, keeping document order.
/// A null value deserializes as the entry type's default.
fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de> + Default,
{
    struct OrderedMap<V>(PhantomData<V>);

    impl<'de, V> Visitor<'de> for OrderedMap<V>
    where
        V: Deserialize<'de> + Default,
    {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::new();
            while let Some(key) = map.next_key::<String>()? {
                let value: Option<V> = map.next_value()?;
                entries.push((key, value.unwrap_or_default()));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(OrderedMap(PhantomData))
}
