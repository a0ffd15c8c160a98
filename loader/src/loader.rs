//! The tool resolution engine.
//!
//! A [`Loader`] owns every registered source, a worklist of configuration
//! units not yet evaluated, and one name slot per word path holding the
//! definition each priority layer contributed. Lookups expand only the
//! units whose word path could contribute to the request, so a large tool
//! tree is never loaded as a whole for a single invocation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tooltree_core::FlagBuilder;
//! use tooltree_loader::{Loader, ToolBlock, ToolScope};
//!
//! let root: ToolBlock = Arc::new(|scope: &mut ToolScope<'_>| {
//!     scope.tool("build", |t: &mut ToolScope<'_>| {
//!         t.flag(FlagBuilder::new("release").syntax("--release"))?
//!             .on_run(|_| 0)?;
//!         Ok(())
//!     })?;
//!     scope.alias_tool("b", &["build"])?;
//!     Ok(())
//! });
//!
//! let loader = Loader::builder().callback("project", root).build().unwrap();
//! let invocation = loader.parse(&["b", "--rel"]).unwrap();
//! assert_eq!(invocation.tool.words(), ["build"]);
//! assert!(invocation.outcome.errors.is_empty());
//! assert_eq!(invocation.run(), Some(0));
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};
use tooltree_core::{
    Acceptor, ArgParser, Candidate, Completion, CompletionContext, DefinitionError, NameResolver,
    ParseOutcome, ToolContext, ToolDefinition, ToolLookup, completion_for, display_words,
    is_hidden_word, is_prefix, looks_like_flag, split_delimited, validate_word, validate_words,
};

use crate::config::LoaderConfig;
use crate::error::{DefinitionFailure, LoaderError, Result};
use crate::git::{GitCache, RemoteCache};
use crate::registry::{Middleware, Registries};
use crate::scope::{Mixin, ScopeNames, Template, ToolBlock, ToolScope, Unit, UnitOutput};
use crate::slot::{Alias, NameSlot, SlotEntry};
use crate::source::{Source, SourceInfo, SourceKind};
use crate::tool_file::{ToolFileEvaluator, YamlEvaluator};

/// Called with each preload file of a directory, and the word path of
/// the directory, before any tool file in it is evaluated.
pub type PreloadHook = Arc<dyn Fn(&Path, &[String]) -> std::result::Result<(), DefinitionError> + Send + Sync>;

/// Label attached to errors raised by the loader itself rather than by a
/// configuration unit.
const LOADER_LABEL: &str = "loader";

/// A child returned by [`Loader::list_children`].
#[derive(Debug, Clone)]
pub enum ChildEntry {
    Tool(Arc<ToolDefinition>),
    Alias(Alias),
}

impl ChildEntry {
    pub fn words(&self) -> &[String] {
        match self {
            Self::Tool(tool) => tool.words(),
            Self::Alias(alias) => &alias.words,
        }
    }

    /// Last word of the path.
    pub fn name(&self) -> &str {
        self.words().last().map(String::as_str).unwrap_or_default()
    }
}

/// Filters for [`Loader::list_children`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Descend into grandchildren.
    pub recursive: bool,
    /// Keep paths with a word starting with `_`.
    pub include_hidden: bool,
    /// Keep tools that neither run nor have a runnable descendant.
    pub include_non_runnable: bool,
}

/// A resolved and parsed command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The tool the words named.
    pub tool: Arc<ToolDefinition>,
    /// The tool that runs: `tool`, or the end of its delegation chain.
    pub runner: Arc<ToolDefinition>,
    /// Arguments after the tool name.
    pub args: Vec<String>,
    pub outcome: ParseOutcome,
}

impl Invocation {
    pub fn context(&self) -> ToolContext {
        ToolContext {
            words: self.runner.words().to_vec(),
            args: self.args.clone(),
            data: self.outcome.data.clone(),
            context_directory: self.runner.context_directory().map(Path::to_path_buf),
        }
    }

    /// Runs the tool's handler. Returns `None` when the tool has no run
    /// behavior.
    pub fn run(&self) -> Option<i32> {
        let handler = self.runner.run_handler()?;
        Some(handler(&self.context()))
    }
}

#[derive(Clone)]
struct WorkItem {
    id: u64,
    source: Arc<SourceInfo>,
    unit: Unit,
    words: Vec<String>,
    names: Arc<ScopeNames>,
    claim_label: Option<String>,
}

impl WorkItem {
    fn is_relevant(&self, words: &[String], subtree: bool) -> bool {
        is_prefix(&self.words, words) || (subtree && is_prefix(words, &self.words))
    }

    fn label(&self) -> String {
        if let Some(label) = &self.claim_label {
            return label.clone();
        }
        match &self.unit {
            Unit::Path(path) => path.display().to_string(),
            Unit::Block { label, .. } => label.clone(),
            Unit::Git { .. } => self.source.label(),
        }
    }
}

#[derive(Default)]
struct LoaderState {
    slots: BTreeMap<Vec<String>, NameSlot>,
    worklist: VecDeque<WorkItem>,
    next_id: u64,
    max_priority: i64,
    min_priority: i64,
    loading_started: bool,
    load_errors: Vec<DefinitionFailure>,
    preloaded: HashSet<PathBuf>,
    root_fallback: Option<Arc<ToolDefinition>>,
}

impl LoaderState {
    fn push_work(&mut self, source: Arc<SourceInfo>, unit: Unit, words: Vec<String>, names: Arc<ScopeNames>, claim_label: Option<String>) {
        self.next_id += 1;
        self.worklist.push_back(WorkItem {
            id: self.next_id,
            source,
            unit,
            words,
            names,
            claim_label,
        });
    }

    fn entry(&self, words: &[String], priority: i64) -> Option<&SlotEntry> {
        self.slots.get(words).and_then(|slot| slot.get(priority))
    }

    fn current(&self, words: &[String]) -> Option<(i64, &SlotEntry)> {
        self.slots.get(words).and_then(NameSlot::current)
    }

    /// Creates the undefined namespace tools above `words` in one priority
    /// layer.
    fn ensure_ancestors(&mut self, words: &[String], priority: i64) {
        for len in 0..words.len() {
            let prefix = &words[..len];
            let slot = self.slots.entry(prefix.to_vec()).or_default();
            if slot.get(priority).is_none() {
                slot.insert(
                    priority,
                    SlotEntry::Pending(ToolDefinition::new(prefix.to_vec(), priority)),
                );
            }
        }
    }

    fn record_error(&mut self, failure: DefinitionFailure) {
        warn!(error = %failure, "tool definition failed");
        self.load_errors.push(failure);
    }
}

/// Answers name lookups for a tool being finished: its ancestors in the
/// same priority layer first, then the loader-wide registries.
struct LayerNames<'a> {
    state: &'a RefCell<LoaderState>,
    registries: &'a Registries,
    words: &'a [String],
    priority: i64,
}

impl LayerNames<'_> {
    fn find<T>(&self, local: impl Fn(&ToolDefinition) -> Option<T>) -> Option<T> {
        let state = self.state.borrow();
        (0..self.words.len()).rev().find_map(|len| {
            state
                .entry(&self.words[..len], self.priority)
                .and_then(SlotEntry::tool)
                .and_then(&local)
        })
    }
}

impl NameResolver for LayerNames<'_> {
    fn acceptor(&self, name: &str) -> Option<Arc<dyn Acceptor>> {
        self.find(|tool| tool.local_acceptor(name))
            .or_else(|| self.registries.acceptors.lookup(name))
    }

    fn completion(&self, name: &str) -> Option<Arc<dyn Completion>> {
        self.find(|tool| tool.local_completion(name))
            .or_else(|| self.registries.completions.lookup(name))
    }
}

/// Builder for [`Loader`].
pub struct LoaderBuilder {
    config: LoaderConfig,
    sources: Vec<(Source, bool)>,
    evaluator: Arc<dyn ToolFileEvaluator>,
    preload_hook: Option<PreloadHook>,
    remote_cache: Option<Arc<dyn RemoteCache>>,
    registries: Registries,
    errors: Vec<DefinitionError>,
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self {
            config: LoaderConfig::default(),
            sources: Vec::new(),
            evaluator: Arc::new(YamlEvaluator),
            preload_hook: None,
            remote_cache: None,
            registries: Registries::standard(),
            errors: Vec::new(),
        }
    }
}

impl LoaderBuilder {
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a source at a new lowest priority.
    pub fn source(mut self, source: Source) -> Self {
        self.sources.push((source, false));
        self
    }

    /// Registers a source at a new highest priority.
    pub fn high_priority_source(mut self, source: Source) -> Self {
        self.sources.push((source, true));
        self
    }

    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        self.source(Source::Path(path.into()))
    }

    pub fn callback(self, name: impl Into<String>, block: ToolBlock) -> Self {
        self.source(Source::Callback {
            name: name.into(),
            block,
        })
    }

    pub fn git(self, remote: impl Into<String>, path: impl Into<PathBuf>, commit: impl Into<String>) -> Self {
        self.source(Source::Git {
            remote: remote.into(),
            path: path.into(),
            commit: commit.into(),
        })
    }

    /// Replaces the tool file front end.
    pub fn evaluator(mut self, evaluator: Arc<dyn ToolFileEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn preload_hook(mut self, hook: PreloadHook) -> Self {
        self.preload_hook = Some(hook);
        self
    }

    /// Sets the cache used for git sources. Defaults to a [`GitCache`] at
    /// the configured `git_cache_dir`, if any.
    pub fn remote_cache(mut self, cache: Arc<dyn RemoteCache>) -> Self {
        self.remote_cache = Some(cache);
        self
    }

    pub fn acceptor(mut self, name: impl Into<String>, acceptor: Arc<dyn Acceptor>) -> Self {
        if let Err(err) = self.registries.acceptors.register(name, acceptor) {
            self.errors.push(err);
        }
        self
    }

    pub fn completion(mut self, name: impl Into<String>, completion: Arc<dyn Completion>) -> Self {
        if let Err(err) = self.registries.completions.register(name, completion) {
            self.errors.push(err);
        }
        self
    }

    pub fn mixin(mut self, name: impl Into<String>, mixin: Arc<dyn Mixin>) -> Self {
        if let Err(err) = self.registries.mixins.register(name, mixin) {
            self.errors.push(err);
        }
        self
    }

    pub fn template(mut self, name: impl Into<String>, template: Arc<dyn Template>) -> Self {
        if let Err(err) = self.registries.templates.register(name, template) {
            self.errors.push(err);
        }
        self
    }

    /// Registers a middleware under `name`. It only applies once named in
    /// the configuration or through [`use_middleware`](Self::use_middleware).
    pub fn middleware(mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        if let Err(err) = self.registries.middleware.register(name, middleware) {
            self.errors.push(err);
        }
        self
    }

    pub fn use_middleware(mut self, name: impl Into<String>) -> Self {
        self.config.middleware.push(name.into());
        self
    }

    /// Builds the loader and registers the sources in order.
    ///
    /// # Errors
    ///
    /// Fails on duplicate registrations and on middleware names that are
    /// not registered.
    pub fn build(self) -> Result<Loader> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(DefinitionFailure::new(LOADER_LABEL, Vec::new(), error).into());
        }
        let middleware = self
            .config
            .middleware
            .iter()
            .map(|name| {
                self.registries.middleware.lookup(name).ok_or_else(|| {
                    let error = DefinitionError::UnknownName {
                        kind: self.registries.middleware.kind(),
                        name: name.clone(),
                    };
                    LoaderError::from(DefinitionFailure::new(LOADER_LABEL, Vec::new(), error))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let remote_cache = self.remote_cache.or_else(|| {
            self.config
                .git_cache_dir
                .as_ref()
                .map(|dir| Arc::new(GitCache::new(dir)) as Arc<dyn RemoteCache>)
        });
        let loader = Loader {
            config: self.config,
            registries: self.registries,
            middleware,
            evaluator: self.evaluator,
            preload_hook: self.preload_hook,
            remote_cache,
            state: ReentrantMutex::new(RefCell::new(LoaderState::default())),
        };
        for (source, high_priority) in self.sources {
            loader.add_source(source, high_priority)?;
        }
        Ok(loader)
    }
}

/// Lazily loads and resolves tools from prioritized sources.
///
/// Safe to share between threads. File reads, remote fetches and
/// configuration callbacks run outside the internal bookkeeping, so two
/// lookups may evaluate the same unit; only the first result is merged.
pub struct Loader {
    config: LoaderConfig,
    registries: Registries,
    middleware: Vec<Arc<dyn Middleware>>,
    evaluator: Arc<dyn ToolFileEvaluator>,
    preload_hook: Option<PreloadHook>,
    remote_cache: Option<Arc<dyn RemoteCache>>,
    state: ReentrantMutex<RefCell<LoaderState>>,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        let state = guard.borrow();
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("slots", &state.slots.len())
            .field("pending_units", &state.worklist.len())
            .field("loading_started", &state.loading_started)
            .finish_non_exhaustive()
    }
}

impl Loader {
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Registers a source and returns its priority.
    ///
    /// High-priority sources outrank every earlier source; other sources
    /// rank below every earlier one.
    ///
    /// # Errors
    ///
    /// Fails with [`DefinitionError::SourceAfterLoading`] once any lookup
    /// has started.
    pub fn add_source(&self, source: Source, high_priority: bool) -> Result<i64> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let (kind, unit) = match source {
            Source::Path(path) => (SourceKind::Path(path.clone()), Unit::Path(path)),
            Source::Callback { name, block } => (
                SourceKind::Callback(name.clone()),
                Unit::Block {
                    label: format!("callback {name}"),
                    base_dir: None,
                    block,
                },
            ),
            Source::Git {
                remote,
                path,
                commit,
            } => (
                SourceKind::Git {
                    remote: remote.clone(),
                    path: path.clone(),
                    commit: commit.clone(),
                },
                Unit::Git {
                    remote,
                    path,
                    commit,
                },
            ),
        };
        if state.loading_started {
            let label = SourceInfo::new(kind, 0, None).label();
            return Err(DefinitionFailure::new(label, Vec::new(), DefinitionError::SourceAfterLoading).into());
        }
        let priority = if high_priority {
            state.max_priority += 1;
            state.max_priority
        } else {
            state.min_priority -= 1;
            state.min_priority
        };
        let source = Arc::new(SourceInfo::new(kind, priority, None));
        info!(source = %source.label(), priority, "registered tool source");
        state.push_work(source, unit, Vec::new(), Arc::new(ScopeNames::default()), None);
        Ok(priority)
    }

    pub fn add_path(&self, path: impl Into<PathBuf>, high_priority: bool) -> Result<i64> {
        self.add_source(Source::Path(path.into()), high_priority)
    }

    pub fn add_callback(&self, name: impl Into<String>, block: ToolBlock, high_priority: bool) -> Result<i64> {
        let source = Source::Callback {
            name: name.into(),
            block,
        };
        self.add_source(source, high_priority)
    }

    pub fn add_git(
        &self,
        remote: impl Into<String>,
        path: impl Into<PathBuf>,
        commit: impl Into<String>,
        high_priority: bool,
    ) -> Result<i64> {
        let source = Source::Git {
            remote: remote.into(),
            path: path.into(),
            commit: commit.into(),
        };
        self.add_source(source, high_priority)
    }

    /// Resolves a command line to the most specific tool it names.
    ///
    /// The leading words up to the first flag-looking argument are the
    /// name candidate. Returns the tool and the arguments after its name.
    /// When no prefix names a tool, the root tool is returned; if nothing
    /// is defined at all, an empty root at the lowest priority.
    pub fn resolve<S: AsRef<str>>(&self, args: &[S]) -> Result<(Arc<ToolDefinition>, Vec<String>)> {
        let args = split_delimited(args, &self.config.extra_delimiters);
        let name_len = args.iter().take_while(|arg| !looks_like_flag(arg)).count();
        self.expand(&args[..name_len], false)?;
        for len in (0..=name_len).rev() {
            if let Some(tool) = self.lookup_specific(&args[..len])? {
                debug!(tool = %tool.display_name(), priority = tool.priority(), "resolved tool");
                return Ok((tool, args[len..].to_vec()));
            }
        }
        Ok((self.root_fallback()?, args))
    }

    /// Looks up exactly `words`, following aliases. A dangling alias
    /// yields `None`.
    pub fn lookup_specific<S: AsRef<str>>(&self, words: &[S]) -> Result<Option<Arc<ToolDefinition>>> {
        let words = to_words(words);
        let target = self.resolve_alias(&words)?;
        let path = target.as_deref().unwrap_or(&words);
        let guard = self.state.lock();
        let priority = {
            let state = guard.borrow();
            match state.current(path) {
                Some((priority, entry)) if entry.tool().is_some() => priority,
                _ => {
                    if target.is_some() {
                        warn!(alias = %display_words(&words), target = %display_words(path), "alias target not found");
                    }
                    return Ok(None);
                }
            }
        };
        self.finish_tool(&guard, path, priority).map(Some)
    }

    /// Follows an alias chain. Returns the final target, or `None` when
    /// `words` is not an alias.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::AliasCycle`] when the chain revisits a name.
    pub fn resolve_alias<S: AsRef<str>>(&self, words: &[S]) -> Result<Option<Vec<String>>> {
        let words = to_words(words);
        self.expand(&words, false)?;
        let mut current = words.clone();
        let mut visited: Vec<Vec<String>> = Vec::new();
        loop {
            let target = {
                let guard = self.state.lock();
                let state = guard.borrow();
                match state.current(&current) {
                    Some((_, SlotEntry::Alias(alias))) => Some(alias.target.clone()),
                    _ => None,
                }
            };
            let Some(target) = target else {
                return Ok((!visited.is_empty()).then_some(current));
            };
            if visited.contains(&current) {
                visited.push(current);
                let error = DefinitionError::AliasCycle(visited);
                return Err(DefinitionFailure::new(LOADER_LABEL, words, error).into());
            }
            visited.push(std::mem::replace(&mut current, target));
            self.expand(&current, false)?;
        }
    }

    /// Makes `words` an alias of the absolute path `target` in one priority
    /// layer, and activates it there.
    ///
    /// This is the low-level form: `target` is taken as a full word path.
    /// Sibling-relative targets are resolved by
    /// [`ToolScope::alias_tool`](crate::ToolScope::alias_tool) before they
    /// reach the loader.
    pub fn make_alias<S: AsRef<str>, T: AsRef<str>>(&self, words: &[S], target: &[T], priority: i64) -> Result<()> {
        let words = to_words(words);
        let target = to_words(target);
        let fail = |error| LoaderError::from(DefinitionFailure::new(LOADER_LABEL, words.clone(), error));
        validate_words(&words).map_err(fail)?;
        validate_words(&target).map_err(fail)?;
        if words == target {
            return Err(fail(DefinitionError::AliasCycle(vec![words.clone(), target])));
        }
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state
            .entry(&words, priority)
            .and_then(SlotEntry::tool)
            .is_some_and(ToolDefinition::is_defined)
        {
            return Err(fail(DefinitionError::NameIsTool(display_words(&words))));
        }
        state.ensure_ancestors(&words, priority);
        let slot = state.slots.entry(words.clone()).or_default();
        slot.insert(priority, SlotEntry::Alias(Alias { words: words.clone(), target }));
        slot.activate(priority);
        debug!(alias = %display_words(&words), priority, "alias created");
        Ok(())
    }

    /// Claims `priority` as the active layer of `words`, unless a higher
    /// layer already did. Returns whether the claim took effect.
    pub fn activate<S: AsRef<str>>(&self, words: &[S], priority: i64) -> bool {
        let words = to_words(words);
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let activated = state.slots.entry(words.clone()).or_default().activate(priority);
        debug!(tool = %display_words(&words), priority, activated, "activation requested");
        activated
    }

    /// Follows the delegation chain of `tool` to the tool that runs.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::DelegationCycle`] when the chain revisits a
    /// tool, [`LoaderError::DelegateNotFound`] when a target is missing.
    pub fn resolve_delegate(&self, tool: &Arc<ToolDefinition>) -> Result<Arc<ToolDefinition>> {
        Ok(self.follow_delegates(tool)?.unwrap_or_else(|| Arc::clone(tool)))
    }

    fn follow_delegates(&self, tool: &ToolDefinition) -> Result<Option<Arc<ToolDefinition>>> {
        let mut visited = vec![tool.words().to_vec()];
        let mut current: Option<Arc<ToolDefinition>> = None;
        let mut target = tool.delegate_target().map(<[String]>::to_vec);
        while let Some(words) = target {
            if visited.contains(&words) {
                visited.push(words);
                let error = DefinitionError::DelegationCycle(visited);
                return Err(DefinitionFailure::new(LOADER_LABEL, tool.words().to_vec(), error).into());
            }
            let next = self
                .lookup_specific(&words)?
                .ok_or_else(|| LoaderError::DelegateNotFound { words: words.clone() })?;
            visited.push(words);
            target = next.delegate_target().map(<[String]>::to_vec);
            current = Some(next);
        }
        Ok(current)
    }

    /// Lists the tools and aliases below `words`, sorted word by word.
    pub fn list_children<S: AsRef<str>>(&self, words: &[S], options: ListOptions) -> Result<Vec<ChildEntry>> {
        let words = to_words(words);
        let words = self.resolve_alias(&words)?.unwrap_or(words);
        self.expand(&words, true)?;
        let guard = self.state.lock();
        let candidates: Vec<(Vec<String>, i64)> = {
            let state = guard.borrow();
            let below = |path: &Vec<String>| path.len() > words.len() && is_prefix(&words, path);
            let runnable_below = |path: &Vec<String>| {
                state.slots.iter().any(|(other, slot)| {
                    other.len() > path.len()
                        && is_prefix(path, other)
                        && slot
                            .current()
                            .and_then(|(_, entry)| entry.tool())
                            .is_some_and(ToolDefinition::is_runnable)
                })
            };
            state
                .slots
                .iter()
                .filter(|(path, _)| below(path))
                .filter(|(path, _)| options.recursive || path.len() == words.len() + 1)
                .filter(|(path, _)| options.include_hidden || !path[words.len()..].iter().any(|w| is_hidden_word(w)))
                .filter_map(|(path, slot)| {
                    let (priority, entry) = slot.current()?;
                    let keep = match entry.tool() {
                        None => true,
                        Some(tool) => options.include_non_runnable || tool.is_runnable() || runnable_below(path),
                    };
                    keep.then(|| (path.clone(), priority))
                })
                .collect()
        };
        let mut children = Vec::with_capacity(candidates.len());
        for (path, priority) in candidates {
            let alias = match guard.borrow().entry(&path, priority) {
                Some(SlotEntry::Alias(alias)) => Some(alias.clone()),
                _ => None,
            };
            match alias {
                Some(alias) => children.push(ChildEntry::Alias(alias)),
                None => children.push(ChildEntry::Tool(self.finish_tool(&guard, &path, priority)?)),
            }
        }
        Ok(children)
    }

    /// Returns `true` if anything is defined below `words`.
    pub fn has_children<S: AsRef<str>>(&self, words: &[S]) -> Result<bool> {
        let options = ListOptions {
            recursive: false,
            include_hidden: true,
            include_non_runnable: true,
        };
        Ok(!self.list_children(words, options)?.is_empty())
    }

    /// Finds `relative` in the data directories of `tool` and then of its
    /// ancestors in the same priority layer.
    pub fn find_data(&self, tool: &ToolDefinition, relative: impl AsRef<Path>) -> Option<PathBuf> {
        let relative = relative.as_ref();
        let mut dirs: Vec<PathBuf> = tool.data_dirs().to_vec();
        {
            let guard = self.state.lock();
            let state = guard.borrow();
            for len in (0..tool.words().len()).rev() {
                if let Some(ancestor) = state.entry(&tool.words()[..len], tool.priority()).and_then(SlotEntry::tool) {
                    dirs.extend_from_slice(ancestor.data_dirs());
                }
            }
        }
        dirs.into_iter().map(|dir| dir.join(relative)).find(|path| path.exists())
    }

    /// Definition errors collected from configuration units that were
    /// aborted.
    pub fn load_errors(&self) -> Vec<DefinitionFailure> {
        self.state.lock().borrow().load_errors.clone()
    }

    /// Completion candidates for `fragment`, with `words` typed before it.
    pub fn complete<S: AsRef<str>>(&self, words: &[S], fragment: &str) -> Vec<Candidate> {
        let words = split_delimited(words, &self.config.extra_delimiters);
        let Some(context) = CompletionContext::new(self, words, fragment) else {
            return Vec::new();
        };
        completion_for(context.tool()).call(&context)
    }

    /// Resolves a command line and parses the arguments after the tool
    /// name. Usage problems are reported in the outcome, not as errors.
    pub fn parse<S: AsRef<str>>(&self, args: &[S]) -> Result<Invocation> {
        let (tool, args) = self.resolve(args)?;
        let runner = self.resolve_delegate(&tool)?;
        let options = ListOptions {
            include_hidden: true,
            ..ListOptions::default()
        };
        let subtools = self
            .list_children(tool.words(), options)?
            .iter()
            .map(|child| child.name().to_string())
            .collect();
        let outcome = ArgParser::new(&runner)
            .with_subtool_names(subtools)
            .parse(&args)
            .finish()
            .into_outcome();
        Ok(Invocation {
            tool,
            runner,
            args,
            outcome,
        })
    }

    /// Evaluates every pending unit that could contribute to `words`; with
    /// `subtree`, also those below it.
    fn expand(&self, words: &[String], subtree: bool) -> Result<()> {
        let mut first_error: Option<DefinitionFailure> = None;
        loop {
            let batch: Vec<WorkItem> = {
                let guard = self.state.lock();
                let mut state = guard.borrow_mut();
                state.loading_started = true;
                state
                    .worklist
                    .iter()
                    .filter(|item| item.is_relevant(words, subtree))
                    .cloned()
                    .collect()
            };
            if batch.is_empty() {
                break;
            }
            for item in batch {
                debug!(words = %display_words(&item.words), unit = %item.label(), "expanding unit");
                let prepared = self.prepare(&item, words);
                let guard = self.state.lock();
                let mut state = guard.borrow_mut();
                let Some(position) = state.worklist.iter().position(|pending| pending.id == item.id) else {
                    debug!(unit = %item.label(), "unit already merged");
                    continue;
                };
                let failure = match prepared {
                    Ok(output) => {
                        state.worklist.remove(position);
                        Self::merge(&mut state, &item, output)
                            .err()
                            .map(|error| DefinitionFailure::new(item.label(), item.words.clone(), error))
                    }
                    Err(LoaderError::Definition(failure)) => {
                        state.worklist.remove(position);
                        Some(failure)
                    }
                    Err(err) => return Err(err),
                };
                if let Some(failure) = failure {
                    if first_error.is_none() {
                        first_error = Some(failure.clone());
                    }
                    state.record_error(failure);
                }
            }
        }
        match first_error {
            Some(failure) if self.config.strict => Err(failure.into()),
            _ => Ok(()),
        }
    }

    /// Evaluates one unit. Runs without holding the state borrow.
    fn prepare(&self, item: &WorkItem, request: &[String]) -> Result<UnitOutput> {
        let remaining = if is_prefix(&item.words, request) {
            request[item.words.len()..].to_vec()
        } else {
            Vec::new()
        };
        match &item.unit {
            Unit::Path(path) => self.prepare_path(&item.source, path, item, remaining),
            Unit::Block {
                label,
                base_dir,
                block,
            } => {
                let label = item.claim_label.clone().unwrap_or_else(|| label.clone());
                let mut scope = ToolScope::new(
                    &item.source,
                    &self.registries,
                    label.clone(),
                    item.words.clone(),
                    remaining,
                    base_dir.clone(),
                    Arc::clone(&item.names),
                );
                block(&mut scope).map_err(|error| failure(&label, &item.words, error))?;
                finish_scope(scope, &label)
            }
            Unit::Git {
                remote,
                path,
                commit,
            } => {
                let cache = self.remote_cache.as_ref().ok_or_else(|| LoaderError::NoRemoteCache {
                    remote: remote.clone(),
                })?;
                let local = cache
                    .get(remote, path, commit, self.config.update_remote)
                    .map_err(|source| LoaderError::Remote {
                        remote: remote.clone(),
                        commit: commit.clone(),
                        source,
                    })?;
                let source = match local.parent() {
                    Some(parent) if item.source.context_directory().is_none() => {
                        Arc::new(item.source.with_context_directory(parent.to_path_buf()))
                    }
                    _ => Arc::clone(&item.source),
                };
                self.prepare_path(&source, &local, item, remaining)
            }
        }
    }

    fn prepare_path(&self, source: &SourceInfo, path: &Path, item: &WorkItem, remaining: Vec<String>) -> Result<UnitOutput> {
        let metadata = fs::metadata(path).map_err(|e| LoaderError::io(path, e))?;
        if metadata.is_dir() {
            return self.prepare_dir(source, path, item, remaining);
        }
        let label = item.claim_label.clone().unwrap_or_else(|| path.display().to_string());
        let text = fs::read_to_string(path).map_err(|e| LoaderError::io(path, e))?;
        let mut scope = ToolScope::new(
            source,
            &self.registries,
            label.clone(),
            item.words.clone(),
            remaining,
            path.parent().map(Path::to_path_buf),
            Arc::clone(&item.names),
        );
        self.evaluate_file(&mut scope, &text, path)
            .map_err(|error| failure(&label, &item.words, error))?;
        finish_scope(scope, &label)
    }

    fn prepare_dir(&self, source: &SourceInfo, dir: &Path, item: &WorkItem, remaining: Vec<String>) -> Result<UnitOutput> {
        self.run_preload(dir, &item.words)?;
        let index = dir.join(&self.config.index_file_name);
        let index_text = if index.is_file() {
            Some(fs::read_to_string(&index).map_err(|e| LoaderError::io(&index, e))?)
        } else {
            None
        };
        let children = self.dir_children(dir)?;
        let label = item.claim_label.clone().unwrap_or_else(|| {
            let labelled = if index_text.is_some() { index.as_path() } else { dir };
            labelled.display().to_string()
        });
        let mut scope = ToolScope::new(
            source,
            &self.registries,
            label.clone(),
            item.words.clone(),
            remaining,
            Some(dir.to_path_buf()),
            Arc::clone(&item.names),
        );
        let define = |scope: &mut ToolScope<'_>| -> std::result::Result<(), DefinitionError> {
            if let Some(text) = &index_text {
                self.evaluate_file(scope, text, &index)?;
            }
            let data_dir = dir.join(&self.config.data_dir_name);
            if data_dir.is_dir() {
                scope.add_data_dir(data_dir)?;
            }
            let lib_dir = dir.join(&self.config.lib_dir_name);
            if lib_dir.is_dir() {
                scope.add_lib_dir(lib_dir)?;
            }
            for (name, path) in &children {
                scope.defer_child_path(name, path.clone())?;
            }
            Ok(())
        };
        define(&mut scope).map_err(|error| failure(&label, &item.words, error))?;
        finish_scope(scope, &label)
    }

    fn evaluate_file(&self, scope: &mut ToolScope<'_>, text: &str, path: &Path) -> std::result::Result<(), DefinitionError> {
        scope.claim_tool()?;
        self.evaluator.evaluate(text, path, scope)
    }

    /// Tool files and subdirectories of `dir`, by name. Dot files and
    /// names with a fixed meaning are skipped.
    fn dir_children(&self, dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = fs::read_dir(dir).map_err(|e| LoaderError::io(dir, e))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LoaderError::io(dir, e))?;
            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %path.display(), "skipping non UTF-8 file name");
                continue;
            };
            if file_name.starts_with('.') || self.config.is_special_name(&file_name) {
                continue;
            }
            let name = if path.is_dir() {
                file_name
            } else if self.config.is_tool_file(&path) {
                match path.file_stem().and_then(|stem| stem.to_str()) {
                    Some(stem) => stem.to_string(),
                    None => continue,
                }
            } else {
                continue;
            };
            if let Err(error) = validate_word(&name) {
                warn!(path = %path.display(), %error, "skipping tool with illegal name");
                continue;
            }
            children.push((name, path));
        }
        children.sort();
        Ok(children)
    }

    fn run_preload(&self, dir: &Path, words: &[String]) -> Result<()> {
        let Some(hook) = &self.preload_hook else {
            return Ok(());
        };
        let mut files = Vec::new();
        let file = dir.join(&self.config.preload_file_name);
        if file.is_file() {
            files.push(file);
        }
        let preload_dir = dir.join(&self.config.preload_dir_name);
        if preload_dir.is_dir() {
            let entries = fs::read_dir(&preload_dir).map_err(|e| LoaderError::io(&preload_dir, e))?;
            let mut nested = Vec::new();
            for entry in entries {
                let path = entry.map_err(|e| LoaderError::io(&preload_dir, e))?.path();
                if path.is_file() {
                    nested.push(path);
                }
            }
            nested.sort();
            files.extend(nested);
        }
        for file in files {
            let first_visit = self.state.lock().borrow_mut().preloaded.insert(file.clone());
            if !first_visit {
                continue;
            }
            debug!(file = %file.display(), "preloading");
            hook(&file, words).map_err(|error| failure(&file.display().to_string(), words, error))?;
        }
        Ok(())
    }

    /// Merges one unit's output into its priority layer. Nothing is
    /// changed unless every check passes.
    fn merge(state: &mut LoaderState, item: &WorkItem, output: UnitOutput) -> std::result::Result<(), DefinitionError> {
        let priority = item.source.priority();
        let UnitOutput {
            tool,
            aliases,
            nested,
            names,
        } = output;
        let words = tool.words().to_vec();
        let merged = match state.entry(&words, priority) {
            Some(SlotEntry::Finished(_)) => return Err(DefinitionError::ToolFinished(display_words(&words))),
            Some(SlotEntry::Alias(_)) => return Err(DefinitionError::NameIsAlias(display_words(&words))),
            Some(SlotEntry::Pending(existing)) => {
                let mut existing = existing.clone();
                existing.absorb(tool)?;
                existing
            }
            None => tool,
        };
        for alias in &aliases {
            match state.entry(&alias.words, priority) {
                Some(entry) if entry.tool().is_some_and(ToolDefinition::is_defined) => {
                    return Err(DefinitionError::NameIsTool(display_words(&alias.words)));
                }
                Some(SlotEntry::Alias(existing)) if existing.target != alias.target => {
                    return Err(DefinitionError::AlreadyDefined(display_words(&alias.words)));
                }
                _ => {}
            }
        }

        let defined = merged.is_defined();
        state.ensure_ancestors(&words, priority);
        let slot = state.slots.entry(words.clone()).or_default();
        slot.insert(priority, SlotEntry::Pending(merged));
        if defined && slot.activate(priority) {
            debug!(tool = %display_words(&words), priority, "activated");
        }
        for alias in aliases {
            state.ensure_ancestors(&alias.words, priority);
            let slot = state.slots.entry(alias.words.clone()).or_default();
            slot.insert(priority, SlotEntry::Alias(alias));
            slot.activate(priority);
        }
        for deferred in nested {
            state.push_work(
                Arc::clone(&item.source),
                deferred.unit,
                deferred.words,
                Arc::clone(&names),
                deferred.claim_label,
            );
        }
        Ok(())
    }

    /// Returns the frozen tool at `(words, priority)`, finishing it first
    /// if needed. The caller holds the lock; no borrow is held while
    /// middleware runs.
    fn finish_tool(&self, state: &RefCell<LoaderState>, words: &[String], priority: i64) -> Result<Arc<ToolDefinition>> {
        let pending = match state.borrow().entry(words, priority) {
            Some(SlotEntry::Finished(tool)) => return Ok(Arc::clone(tool)),
            Some(SlotEntry::Pending(tool)) => tool.clone(),
            _ => {
                let error = DefinitionError::NameIsAlias(display_words(words));
                return Err(DefinitionFailure::new(LOADER_LABEL, words.to_vec(), error).into());
            }
        };
        let tool = Arc::new(self.finalize(state, pending)?);
        if let Some(slot) = state.borrow_mut().slots.get_mut(words) {
            slot.insert(priority, SlotEntry::Finished(Arc::clone(&tool)));
        }
        Ok(tool)
    }

    fn finalize(&self, state: &RefCell<LoaderState>, mut tool: ToolDefinition) -> Result<ToolDefinition> {
        let label = tool.source_label().unwrap_or(LOADER_LABEL).to_string();
        let words = tool.words().to_vec();
        for middleware in &self.middleware {
            middleware
                .config(&mut tool)
                .map_err(|error| failure(&label, &words, error))?;
        }
        let names = LayerNames {
            state,
            registries: &self.registries,
            words: &words,
            priority: tool.priority(),
        };
        tool.finish(&names).map_err(|error| failure(&label, &words, error))?;
        Ok(tool)
    }

    fn root_fallback(&self) -> Result<Arc<ToolDefinition>> {
        let guard = self.state.lock();
        if let Some(root) = guard.borrow().root_fallback.clone() {
            return Ok(root);
        }
        let root = Arc::new(self.finalize(&guard, ToolDefinition::new(Vec::new(), i64::MIN))?);
        guard.borrow_mut().root_fallback = Some(Arc::clone(&root));
        Ok(root)
    }
}

impl ToolLookup for Loader {
    fn lookup_tool(&self, words: &[String]) -> Option<(Arc<ToolDefinition>, Vec<String>)> {
        self.resolve(words)
            .inspect_err(|err| warn!(error = %err, "lookup failed during completion"))
            .ok()
    }

    fn child_names(&self, words: &[String]) -> Vec<String> {
        let options = ListOptions {
            include_hidden: true,
            ..ListOptions::default()
        };
        self.list_children(words, options)
            .map(|children| children.iter().map(|child| child.name().to_string()).collect())
            .unwrap_or_default()
    }

    fn delegate_of(&self, tool: &ToolDefinition) -> Option<Arc<ToolDefinition>> {
        self.follow_delegates(tool).ok().flatten()
    }
}

fn to_words<S: AsRef<str>>(words: &[S]) -> Vec<String> {
    words.iter().map(|word| word.as_ref().to_string()).collect()
}

fn failure(label: &str, words: &[String], error: DefinitionError) -> LoaderError {
    DefinitionFailure::new(label, words.to_vec(), error).into()
}

/// Records the source's context directory on a tool that has none and
/// returns the unit's output.
fn finish_scope(mut scope: ToolScope<'_>, label: &str) -> Result<UnitOutput> {
    if scope.definition().context_directory().is_none() {
        if let Some(dir) = scope.source().context_directory().map(Path::to_path_buf) {
            let words = scope.words().to_vec();
            scope
                .set_context_directory(dir)
                .map_err(|error| failure(label, &words, error))?;
        }
    }
    Ok(scope.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(f: impl Fn(&mut ToolScope<'_>) -> std::result::Result<(), DefinitionError> + Send + Sync + 'static) -> ToolBlock {
        Arc::new(f)
    }

    #[test]
    fn test_priority_counters() {
        let loader = Loader::builder().build().unwrap();
        let low_a = loader.add_callback("a", block(|_| Ok(())), false).unwrap();
        let low_b = loader.add_callback("b", block(|_| Ok(())), false).unwrap();
        let high_a = loader.add_callback("c", block(|_| Ok(())), true).unwrap();
        let high_b = loader.add_callback("d", block(|_| Ok(())), true).unwrap();
        assert_eq!((low_a, low_b), (-1, -2));
        assert_eq!((high_a, high_b), (1, 2));
    }

    #[test]
    fn test_relevance() {
        let item = WorkItem {
            id: 1,
            source: Arc::new(SourceInfo::new(SourceKind::Callback("x".into()), -1, None)),
            unit: Unit::Path("/x".into()),
            words: vec!["a".into(), "b".into()],
            names: Arc::new(ScopeNames::default()),
            claim_label: None,
        };
        let words = |w: &[&str]| w.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(item.is_relevant(&words(&["a", "b", "c"]), false));
        assert!(item.is_relevant(&words(&["a", "b"]), false));
        assert!(!item.is_relevant(&words(&["a"]), false));
        assert!(item.is_relevant(&words(&["a"]), true));
        assert!(!item.is_relevant(&words(&["x"]), true));
    }

    #[test]
    fn test_empty_loader_returns_root_fallback() {
        let loader = Loader::builder().build().unwrap();
        let (root, rest) = loader.resolve(&["anything"]).unwrap();
        assert!(root.is_root());
        assert_eq!(root.priority(), i64::MIN);
        assert_eq!(rest, vec!["anything"]);
        let (again, _) = loader.resolve::<&str>(&[]).unwrap();
        assert!(Arc::ptr_eq(&root, &again));
    }

    #[test]
    fn test_unknown_middleware_rejected() {
        let err = Loader::builder().use_middleware("nope").build().unwrap_err();
        assert!(matches!(
            err.definition_error(),
            Some(DefinitionError::UnknownName { name, .. }) if name == "nope"
        ));
    }

    #[test]
    fn test_help_middleware_applied() {
        let root = block(|s| {
            s.tool("t", |t| {
                t.on_run(|_| 0)?;
                Ok(())
            })?;
            Ok(())
        });
        let loader = Loader::builder()
            .callback("cb", root)
            .use_middleware("help_flags")
            .build()
            .unwrap();
        let (tool, _) = loader.resolve(&["t"]).unwrap();
        assert!(tool.used_flags().contains("--help"));
        assert!(tool.flags_for_key("_help").next().is_some());
    }
}
