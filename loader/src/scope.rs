//! The evaluation scope handed to configuration units.
//!
//! A unit (a tool file, a callback, a nested tool block) configures one
//! tool through a [`ToolScope`]. Everything it declares is collected into a
//! patch that the loader merges atomically once the unit has finished
//! without error; nested tools are not evaluated on the spot but queued so
//! they are only expanded when a lookup needs them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tooltree_core::{FlagBuilder, Value};
//! use tooltree_loader::{Loader, ToolBlock, ToolScope};
//!
//! let root: ToolBlock = Arc::new(|scope: &mut ToolScope<'_>| {
//!     scope.tool("greet", |t: &mut ToolScope<'_>| {
//!         t.desc("Print a greeting")?
//!             .flag(FlagBuilder::new("shout").syntax("-s").syntax("--shout"))?
//!             .optional_arg("whom", |arg| arg.default("world"))?
//!             .on_run(|_| 0)?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! });
//!
//! let loader = Loader::builder().callback("example", root).build().unwrap();
//! let (tool, rest) = loader.resolve(&["greet", "ruby"]).unwrap();
//! assert_eq!(tool.desc(), "Print a greeting");
//! assert_eq!(tool.default_data()["whom"], Value::from("world"));
//! assert_eq!(rest, vec!["ruby"]);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tooltree_core::{
    Acceptor, Completion, CompletionRef, DefinitionError, FlagBuilder, FlagGroupKind, NameKind,
    PositionalArg, ToolContext, ToolDefinition, Value, validate_word, validate_words,
};

use crate::registry::Registries;
use crate::slot::Alias;
use crate::source::SourceInfo;

/// A block of configuration for one tool.
pub type ToolBlock = Arc<dyn Fn(&mut ToolScope<'_>) -> Result<(), DefinitionError> + Send + Sync>;

/// Reusable configuration applied with [`ToolScope::include`].
pub trait Mixin: Send + Sync {
    fn include(&self, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError>;
}

impl<F> Mixin for F
where
    F: Fn(&mut ToolScope<'_>) -> Result<(), DefinitionError> + Send + Sync,
{
    fn include(&self, scope: &mut ToolScope<'_>) -> Result<(), DefinitionError> {
        self(scope)
    }
}

/// Parameterized configuration applied with [`ToolScope::expand`],
/// typically declaring one or more nested tools.
pub trait Template: Send + Sync {
    fn expand(
        &self,
        scope: &mut ToolScope<'_>,
        args: &BTreeMap<String, Value>,
    ) -> Result<(), DefinitionError>;
}

impl<F> Template for F
where
    F: Fn(&mut ToolScope<'_>, &BTreeMap<String, Value>) -> Result<(), DefinitionError> + Send + Sync,
{
    fn expand(
        &self,
        scope: &mut ToolScope<'_>,
        args: &BTreeMap<String, Value>,
    ) -> Result<(), DefinitionError> {
        self(scope, args)
    }
}

/// Mixins and templates visible to a unit, chained to those of the unit
/// that declared it.
#[derive(Clone, Default)]
pub(crate) struct ScopeNames {
    mixins: BTreeMap<String, Arc<dyn Mixin>>,
    templates: BTreeMap<String, Arc<dyn Template>>,
    parent: Option<Arc<ScopeNames>>,
}

impl ScopeNames {
    fn find_mixin(&self, name: &str) -> Option<Arc<dyn Mixin>> {
        self.mixins
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_mixin(name)))
    }

    fn find_template(&self, name: &str) -> Option<Arc<dyn Template>> {
        self.templates
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_template(name)))
    }
}

/// Deferred work produced by a unit.
#[derive(Clone)]
pub(crate) enum Unit {
    Path(PathBuf),
    Block {
        label: String,
        base_dir: Option<PathBuf>,
        block: ToolBlock,
    },
    Git {
        remote: String,
        path: PathBuf,
        commit: String,
    },
}

/// A unit queued for later expansion at `words`.
#[derive(Clone)]
pub(crate) struct Deferred {
    pub(crate) words: Vec<String>,
    pub(crate) unit: Unit,
    /// Set for included units: the tool they configure is claimed under
    /// the including unit's label.
    pub(crate) claim_label: Option<String>,
}

/// Everything a unit declared.
pub(crate) struct UnitOutput {
    pub(crate) tool: ToolDefinition,
    pub(crate) aliases: Vec<Alias>,
    pub(crate) nested: Vec<Deferred>,
    pub(crate) names: Arc<ScopeNames>,
}

/// Configures one tool.
///
/// Methods that define the tool (description, flags, arguments, run
/// behavior) claim it for the unit's source; a tool may only be claimed by
/// one source per priority.
pub struct ToolScope<'a> {
    source: &'a SourceInfo,
    registries: &'a Registries,
    label: String,
    remaining_words: Vec<String>,
    base_dir: Option<PathBuf>,
    inherited: Arc<ScopeNames>,
    local: ScopeNames,
    tool: ToolDefinition,
    aliases: Vec<Alias>,
    nested: Vec<Deferred>,
}

impl<'a> ToolScope<'a> {
    pub(crate) fn new(
        source: &'a SourceInfo,
        registries: &'a Registries,
        label: String,
        words: Vec<String>,
        remaining_words: Vec<String>,
        base_dir: Option<PathBuf>,
        inherited: Arc<ScopeNames>,
    ) -> Self {
        Self {
            tool: ToolDefinition::new(words, source.priority()),
            source,
            registries,
            label,
            remaining_words,
            base_dir,
            inherited,
            local: ScopeNames::default(),
            aliases: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub(crate) fn into_output(self) -> UnitOutput {
        let names = ScopeNames {
            mixins: self.local.mixins,
            templates: self.local.templates,
            parent: Some(self.inherited),
        };
        UnitOutput {
            tool: self.tool,
            aliases: self.aliases,
            nested: self.nested,
            names: Arc::new(names),
        }
    }

    /// Word path of the tool being configured.
    pub fn words(&self) -> &[String] {
        self.tool.words()
    }

    /// Words of the lookup that triggered this evaluation, beyond
    /// [`words`](Self::words).
    pub fn remaining_words(&self) -> &[String] {
        &self.remaining_words
    }

    pub fn priority(&self) -> i64 {
        self.tool.priority()
    }

    pub fn source(&self) -> &SourceInfo {
        self.source
    }

    /// The tool as configured so far.
    pub fn definition(&self) -> &ToolDefinition {
        &self.tool
    }

    /// Directory relative paths given to [`load`](Self::load) are resolved
    /// against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir
            .as_deref()
            .or_else(|| self.source.context_directory())
    }

    /// Claims the tool for this unit's source without configuring it.
    pub(crate) fn claim_tool(&mut self) -> Result<(), DefinitionError> {
        self.claim().map(|_| ())
    }

    fn claim(&mut self) -> Result<&mut ToolDefinition, DefinitionError> {
        self.tool.claim_source(&self.label)?;
        Ok(&mut self.tool)
    }

    fn child_words(&self, name: &str) -> Result<Vec<String>, DefinitionError> {
        validate_word(name)?;
        let mut words = self.tool.words().to_vec();
        words.push(name.to_string());
        Ok(words)
    }

    pub fn desc(&mut self, desc: impl Into<String>) -> Result<&mut Self, DefinitionError> {
        self.claim()?.set_desc(desc)?;
        Ok(self)
    }

    pub fn long_desc<I, S>(&mut self, lines: I) -> Result<&mut Self, DefinitionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into).collect();
        self.claim()?.set_long_desc(lines)?;
        Ok(self)
    }

    pub fn flag(&mut self, flag: FlagBuilder) -> Result<&mut Self, DefinitionError> {
        let flag = flag.build()?;
        self.claim()?.add_flag(flag)?;
        Ok(self)
    }

    pub fn flag_group(
        &mut self,
        kind: FlagGroupKind,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Result<&mut Self, DefinitionError> {
        self.claim()?.add_flag_group(kind, Some(name.into()), desc)?;
        Ok(self)
    }

    pub fn required_arg(
        &mut self,
        key: impl Into<String>,
        configure: impl FnOnce(PositionalArg) -> PositionalArg,
    ) -> Result<&mut Self, DefinitionError> {
        self.claim()?.add_positional(configure(PositionalArg::required(key)))?;
        Ok(self)
    }

    pub fn optional_arg(
        &mut self,
        key: impl Into<String>,
        configure: impl FnOnce(PositionalArg) -> PositionalArg,
    ) -> Result<&mut Self, DefinitionError> {
        self.claim()?.add_positional(configure(PositionalArg::optional(key)))?;
        Ok(self)
    }

    pub fn remaining_args(
        &mut self,
        key: impl Into<String>,
        configure: impl FnOnce(PositionalArg) -> PositionalArg,
    ) -> Result<&mut Self, DefinitionError> {
        self.claim()?.add_positional(configure(PositionalArg::remaining(key)))?;
        Ok(self)
    }

    /// Binds a fixed value into the tool's data.
    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self, DefinitionError> {
        self.claim()?.set_data(key, value.into())?;
        Ok(self)
    }

    pub fn on_run<F>(&mut self, handler: F) -> Result<&mut Self, DefinitionError>
    where
        F: Fn(&ToolContext) -> i32 + Send + Sync + 'static,
    {
        self.claim()?.set_run_handler(Arc::new(handler))?;
        Ok(self)
    }

    /// Makes the tool run the tool at the absolute path `target` with the
    /// same arguments.
    pub fn delegate_to<S: AsRef<str>>(&mut self, target: &[S]) -> Result<&mut Self, DefinitionError> {
        validate_words(target)?;
        let target = target.iter().map(|w| w.as_ref().to_string()).collect();
        self.claim()?.set_delegate(target)?;
        Ok(self)
    }

    /// Declares a subtool. The block runs only when a lookup reaches it.
    pub fn tool<F>(&mut self, name: &str, block: F) -> Result<&mut Self, DefinitionError>
    where
        F: Fn(&mut ToolScope<'_>) -> Result<(), DefinitionError> + Send + Sync + 'static,
    {
        self.tool_block(name, Arc::new(block))
    }

    /// Like [`tool`](Self::tool), with a shared block.
    pub fn tool_block(&mut self, name: &str, block: ToolBlock) -> Result<&mut Self, DefinitionError> {
        let words = self.child_words(name)?;
        self.nested.push(Deferred {
            words,
            unit: Unit::Block {
                label: self.label.clone(),
                base_dir: self.base_dir.clone(),
                block,
            },
            claim_label: None,
        });
        Ok(self)
    }

    /// Declares `name` as an alias of the sibling path `target`.
    pub fn alias_tool<S: AsRef<str>>(&mut self, name: &str, target: &[S]) -> Result<&mut Self, DefinitionError> {
        let words = self.child_words(name)?;
        validate_words(target)?;
        let mut full_target = self.tool.words().to_vec();
        full_target.extend(target.iter().map(|w| w.as_ref().to_string()));
        if full_target == words {
            return Err(DefinitionError::AliasCycle(vec![words.clone(), full_target]));
        }
        self.aliases.push(Alias {
            words,
            target: full_target,
        });
        Ok(self)
    }

    /// Includes a file or directory into the current tool, as if its
    /// contents were written here.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, DefinitionError> {
        let path = path.as_ref();
        let path = match self.base_dir() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        self.nested.push(Deferred {
            words: self.tool.words().to_vec(),
            unit: Unit::Path(path),
            claim_label: Some(self.label.clone()),
        });
        Ok(self)
    }

    /// Includes a path of a pinned remote repository into the current tool.
    pub fn load_git(
        &mut self,
        remote: impl Into<String>,
        path: impl Into<PathBuf>,
        commit: impl Into<String>,
    ) -> Result<&mut Self, DefinitionError> {
        self.nested.push(Deferred {
            words: self.tool.words().to_vec(),
            unit: Unit::Git {
                remote: remote.into(),
                path: path.into(),
                commit: commit.into(),
            },
            claim_label: Some(self.label.clone()),
        });
        Ok(self)
    }

    /// Registers a named acceptor for this tool and its descendants.
    pub fn acceptor(&mut self, name: impl Into<String>, acceptor: Arc<dyn Acceptor>) -> Result<&mut Self, DefinitionError> {
        self.tool.register_acceptor(name, acceptor)?;
        Ok(self)
    }

    /// Registers a named completion for this tool and its descendants.
    pub fn completion(
        &mut self,
        name: impl Into<String>,
        completion: Arc<dyn Completion>,
    ) -> Result<&mut Self, DefinitionError> {
        self.tool.register_completion(name, completion)?;
        Ok(self)
    }

    /// Registers a mixin visible to this unit and the tools it declares.
    pub fn mixin(&mut self, name: impl Into<String>, mixin: Arc<dyn Mixin>) -> Result<&mut Self, DefinitionError> {
        let name = name.into();
        if self.local.mixins.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: NameKind::Mixin,
                name,
            });
        }
        self.local.mixins.insert(name, mixin);
        Ok(self)
    }

    pub fn template(&mut self, name: impl Into<String>, template: Arc<dyn Template>) -> Result<&mut Self, DefinitionError> {
        let name = name.into();
        if self.local.templates.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: NameKind::Template,
                name,
            });
        }
        self.local.templates.insert(name, template);
        Ok(self)
    }

    /// Applies a named mixin. Local registrations shadow inherited ones,
    /// which shadow the loader's registry.
    pub fn include(&mut self, name: &str) -> Result<&mut Self, DefinitionError> {
        let mixin = self
            .local
            .find_mixin(name)
            .or_else(|| self.inherited.find_mixin(name))
            .or_else(|| self.registries.mixins.lookup(name))
            .ok_or_else(|| DefinitionError::UnknownName {
                kind: NameKind::Mixin,
                name: name.to_string(),
            })?;
        mixin.include(self)?;
        Ok(self)
    }

    /// Applies a named template with the given arguments.
    pub fn expand(&mut self, name: &str, args: &BTreeMap<String, Value>) -> Result<&mut Self, DefinitionError> {
        let template = self
            .local
            .find_template(name)
            .or_else(|| self.inherited.find_template(name))
            .or_else(|| self.registries.templates.lookup(name))
            .ok_or_else(|| DefinitionError::UnknownName {
                kind: NameKind::Template,
                name: name.to_string(),
            })?;
        template.expand(self, args)?;
        Ok(self)
    }

    /// Reserves flag spellings so no flag of this tool can use them.
    pub fn disable_flag<S: AsRef<str>>(&mut self, spellings: &[S]) -> Result<&mut Self, DefinitionError> {
        self.tool.disable_flag(spellings)?;
        Ok(self)
    }

    pub fn enforce_flags_before_args(&mut self) -> Result<&mut Self, DefinitionError> {
        self.claim()?.set_enforce_flags_before_args(true)?;
        Ok(self)
    }

    pub fn require_exact_flag_match(&mut self) -> Result<&mut Self, DefinitionError> {
        self.claim()?.set_require_exact_flag_match(true)?;
        Ok(self)
    }

    pub fn disable_argument_parsing(&mut self) -> Result<&mut Self, DefinitionError> {
        self.claim()?.disable_argument_parsing()?;
        Ok(self)
    }

    /// Replaces the tool's completion strategy.
    pub fn complete_with(&mut self, completion: CompletionRef) -> Result<&mut Self, DefinitionError> {
        self.claim()?.set_completion(completion)?;
        Ok(self)
    }

    pub fn set_context_directory(&mut self, dir: impl Into<PathBuf>) -> Result<&mut Self, DefinitionError> {
        self.tool.set_context_directory(dir.into())?;
        Ok(self)
    }

    /// Queues a directory entry as the subtool `name`.
    pub(crate) fn defer_child_path(&mut self, name: &str, path: PathBuf) -> Result<(), DefinitionError> {
        let words = self.child_words(name)?;
        self.nested.push(Deferred {
            words,
            unit: Unit::Path(path),
            claim_label: None,
        });
        Ok(())
    }

    pub(crate) fn add_data_dir(&mut self, dir: PathBuf) -> Result<(), DefinitionError> {
        self.tool.add_data_dir(dir)
    }

    pub(crate) fn add_lib_dir(&mut self, dir: PathBuf) -> Result<(), DefinitionError> {
        self.tool.add_lib_dir(dir)
    }
}
