//! The aggregate definition of one tool.
//!
//! A [`ToolDefinition`] is created once per `(word path, priority)` and is
//! mutated only while configuration units for that priority are being
//! evaluated. [`ToolDefinition::finish`] resolves every named acceptor and
//! completion; after that the loader hands it out behind an `Arc` and it is
//! never modified again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::acceptor::{Acceptor, AcceptorRef};
use crate::completion::{Completion, CompletionRef};
use crate::error::{DefinitionError, NameKind};
use crate::flag::{Flag, FlagResolution};
use crate::flag_group::{FlagGroup, FlagGroupKind};
use crate::positional::{ArgArity, PositionalArg};
use crate::value::Value;
use crate::words::display_words;

/// Run behavior of a tool; returns the process exit code.
pub type RunHandler = Arc<dyn Fn(&ToolContext) -> i32 + Send + Sync>;

/// What a run handler sees: the resolved tool, its bound data and the raw
/// arguments after the tool name.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub words: Vec<String>,
    pub args: Vec<String>,
    pub data: BTreeMap<String, Value>,
    pub context_directory: Option<PathBuf>,
}

/// Resolves acceptor and completion names that a tool does not register
/// itself. The loader answers from the tool's ancestry and its global
/// registries.
pub trait NameResolver {
    fn acceptor(&self, name: &str) -> Option<Arc<dyn Acceptor>>;
    fn completion(&self, name: &str) -> Option<Arc<dyn Completion>>;
}

/// Everything known about one tool at one priority.
#[derive(Clone)]
pub struct ToolDefinition {
    words: Vec<String>,
    priority: i64,
    desc: String,
    long_desc: Vec<String>,
    flags: Vec<Flag>,
    flag_groups: Vec<FlagGroup>,
    required_args: Vec<PositionalArg>,
    optional_args: Vec<PositionalArg>,
    remaining_arg: Option<PositionalArg>,
    default_data: BTreeMap<String, Value>,
    used_flags: BTreeSet<String>,
    acceptors: BTreeMap<String, Arc<dyn Acceptor>>,
    completions: BTreeMap<String, Arc<dyn Completion>>,
    run_handler: Option<RunHandler>,
    delegate_target: Option<Vec<String>>,
    completion: Option<CompletionRef>,
    enforce_flags_before_args: bool,
    require_exact_flag_match: bool,
    argument_parsing_disabled: bool,
    context_directory: Option<PathBuf>,
    data_dirs: Vec<PathBuf>,
    lib_dirs: Vec<PathBuf>,
    source_label: Option<String>,
    finished: bool,
}

impl ToolDefinition {
    pub fn new(words: Vec<String>, priority: i64) -> Self {
        Self {
            words,
            priority,
            desc: String::new(),
            long_desc: Vec::new(),
            flags: Vec::new(),
            flag_groups: vec![FlagGroup::new(FlagGroupKind::Optional, None, "")],
            required_args: Vec::new(),
            optional_args: Vec::new(),
            remaining_arg: None,
            default_data: BTreeMap::new(),
            used_flags: BTreeSet::new(),
            acceptors: BTreeMap::new(),
            completions: BTreeMap::new(),
            run_handler: None,
            delegate_target: None,
            completion: None,
            enforce_flags_before_args: false,
            require_exact_flag_match: false,
            argument_parsing_disabled: false,
            context_directory: None,
            data_dirs: Vec::new(),
            lib_dirs: Vec::new(),
            source_label: None,
            finished: false,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Last word of the path; empty for the root tool.
    pub fn simple_name(&self) -> &str {
        self.words.last().map(String::as_str).unwrap_or("")
    }

    pub fn display_name(&self) -> String {
        display_words(&self.words)
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn is_root(&self) -> bool {
        self.words.is_empty()
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn long_desc(&self) -> &[String] {
        &self.long_desc
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// Active flags bound to `key`.
    pub fn flags_for_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Flag> + 'a {
        self.flags.iter().filter(move |f| f.key() == key)
    }

    pub fn flag_groups(&self) -> &[FlagGroup] {
        &self.flag_groups
    }

    pub fn flag_group(&self, name: &str) -> Option<&FlagGroup> {
        self.flag_groups.iter().find(|g| g.name() == Some(name))
    }

    pub fn required_args(&self) -> &[PositionalArg] {
        &self.required_args
    }

    pub fn optional_args(&self) -> &[PositionalArg] {
        &self.optional_args
    }

    pub fn remaining_arg(&self) -> Option<&PositionalArg> {
        self.remaining_arg.as_ref()
    }

    /// Positional slots in binding order: required, optional, catch-all.
    pub fn positional_args(&self) -> impl Iterator<Item = &PositionalArg> {
        self.required_args
            .iter()
            .chain(&self.optional_args)
            .chain(self.remaining_arg.as_ref())
    }

    /// Data bound before any argument is parsed: flag and argument
    /// defaults plus explicitly set keys.
    pub fn default_data(&self) -> &BTreeMap<String, Value> {
        &self.default_data
    }

    /// Every flag spelling taken by a flag or reserved with
    /// [`disable_flag`](Self::disable_flag).
    pub fn used_flags(&self) -> &BTreeSet<String> {
        &self.used_flags
    }

    pub fn run_handler(&self) -> Option<&RunHandler> {
        self.run_handler.as_ref()
    }

    pub fn delegate_target(&self) -> Option<&[String]> {
        self.delegate_target.as_deref()
    }

    pub fn completion(&self) -> Option<&CompletionRef> {
        self.completion.as_ref()
    }

    /// A tool is runnable if it has a run handler or delegates.
    pub fn is_runnable(&self) -> bool {
        self.run_handler.is_some() || self.delegate_target.is_some()
    }

    pub fn enforces_flags_before_args(&self) -> bool {
        self.enforce_flags_before_args
    }

    pub fn requires_exact_flag_match(&self) -> bool {
        self.require_exact_flag_match
    }

    pub fn argument_parsing_disabled(&self) -> bool {
        self.argument_parsing_disabled
    }

    pub fn context_directory(&self) -> Option<&Path> {
        self.context_directory.as_deref()
    }

    pub fn data_dirs(&self) -> &[PathBuf] {
        &self.data_dirs
    }

    pub fn lib_dirs(&self) -> &[PathBuf] {
        &self.lib_dirs
    }

    /// Label of the configuration source that defined this tool.
    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    /// `true` once some configuration unit has claimed this tool.
    pub fn is_defined(&self) -> bool {
        self.source_label.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tool-local acceptor registration.
    pub fn local_acceptor(&self, name: &str) -> Option<Arc<dyn Acceptor>> {
        self.acceptors.get(name).cloned()
    }

    pub fn local_completion(&self, name: &str) -> Option<Arc<dyn Completion>> {
        self.completions.get(name).cloned()
    }

    fn check_mutable(&self) -> Result<(), DefinitionError> {
        if self.finished {
            return Err(DefinitionError::ToolFinished(self.display_name()));
        }
        Ok(())
    }

    /// Marks the tool as defined by `label`. A tool can be claimed by one
    /// source only.
    pub fn claim_source(&mut self, label: &str) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        match &self.source_label {
            Some(existing) if existing != label => {
                Err(DefinitionError::AlreadyDefined(self.display_name()))
            }
            Some(_) => Ok(()),
            None => {
                self.source_label = Some(label.to_string());
                Ok(())
            }
        }
    }

    pub fn set_desc(&mut self, desc: impl Into<String>) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.desc = desc.into();
        Ok(())
    }

    pub fn set_long_desc(&mut self, lines: Vec<String>) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.long_desc = lines;
        Ok(())
    }

    /// Adds a flag, checking its spellings against those already in use.
    ///
    /// Flags built with `report_collisions(false)` silently lose colliding
    /// spellings instead; if none remain the flag is not added.
    pub fn add_flag(&mut self, mut flag: Flag) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        let group_index = match flag.group() {
            Some(name) => self
                .flag_groups
                .iter()
                .position(|g| g.name() == Some(name))
                .ok_or_else(|| DefinitionError::UnknownFlagGroup(name.to_string()))?,
            None => 0,
        };
        let taken = flag
            .effective_flags()
            .into_iter()
            .find(|s| self.used_flags.contains(*s))
            .map(str::to_string);
        if let Some(spelling) = taken {
            if flag.report_collisions() {
                return Err(DefinitionError::FlagCollision { spelling });
            }
            let used = &self.used_flags;
            flag.retain_syntax(|s| s.spellings().all(|sp| !used.contains(sp)));
        }
        if !flag.is_active() {
            debug!(tool = %self.display_name(), key = flag.key(), "flag has no usable spellings");
            return Ok(());
        }
        for spelling in flag.effective_flags() {
            self.used_flags.insert(spelling.to_string());
        }
        self.flag_groups[group_index].add_flag_key(flag.key());
        self.default_data
            .insert(flag.key().to_string(), flag.default_value().clone());
        self.flags.push(flag);
        Ok(())
    }

    /// Adds a flag group. Named groups must be unique on the tool.
    pub fn add_flag_group(
        &mut self,
        kind: FlagGroupKind,
        name: Option<String>,
        desc: impl Into<String>,
    ) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        if let Some(name) = &name {
            if self.flag_group(name).is_some() {
                return Err(DefinitionError::DuplicateFlagGroup(name.clone()));
            }
        }
        self.flag_groups.push(FlagGroup::new(kind, name, desc));
        Ok(())
    }

    /// Reserves spellings so no later flag can use them.
    pub fn disable_flag<S: AsRef<str>>(&mut self, spellings: &[S]) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        for spelling in spellings {
            let spelling = spelling.as_ref();
            if !self.used_flags.insert(spelling.to_string()) {
                return Err(DefinitionError::FlagCollision {
                    spelling: spelling.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Adds a positional slot. Its default is bound immediately.
    pub fn add_positional(&mut self, arg: PositionalArg) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        if arg.key().is_empty() {
            return Err(DefinitionError::EmptyArgKey);
        }
        if arg.arity() != ArgArity::Required {
            self.default_data
                .insert(arg.key().to_string(), arg.default_value().clone());
        }
        match arg.arity() {
            ArgArity::Required => self.required_args.push(arg),
            ArgArity::Optional => self.optional_args.push(arg),
            ArgArity::Remaining => {
                if let Some(existing) = &self.remaining_arg {
                    return Err(DefinitionError::DuplicateRemainingArg(
                        existing.key().to_string(),
                    ));
                }
                self.remaining_arg = Some(arg);
            }
        }
        Ok(())
    }

    /// Binds a fixed value, as if it were a default.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.default_data.insert(key.into(), value);
        Ok(())
    }

    pub fn set_run_handler(&mut self, handler: RunHandler) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.run_handler = Some(handler);
        Ok(())
    }

    /// Makes this tool run `target` with the same arguments.
    pub fn set_delegate(&mut self, target: Vec<String>) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.delegate_target = Some(target);
        Ok(())
    }

    pub fn register_acceptor(
        &mut self,
        name: impl Into<String>,
        acceptor: Arc<dyn Acceptor>,
    ) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        let name = name.into();
        if self.acceptors.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: NameKind::Acceptor,
                name,
            });
        }
        self.acceptors.insert(name, acceptor);
        Ok(())
    }

    pub fn register_completion(
        &mut self,
        name: impl Into<String>,
        completion: Arc<dyn Completion>,
    ) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        let name = name.into();
        if self.completions.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: NameKind::Completion,
                name,
            });
        }
        self.completions.insert(name, completion);
        Ok(())
    }

    /// Replaces the standard completion strategy for this tool.
    pub fn set_completion(&mut self, completion: CompletionRef) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.completion = Some(completion);
        Ok(())
    }

    pub fn set_enforce_flags_before_args(&mut self, value: bool) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.enforce_flags_before_args = value;
        Ok(())
    }

    pub fn set_require_exact_flag_match(&mut self, value: bool) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.require_exact_flag_match = value;
        Ok(())
    }

    /// Binds every argument to the catch-all slot without interpreting
    /// flags.
    pub fn disable_argument_parsing(&mut self) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.argument_parsing_disabled = true;
        Ok(())
    }

    pub fn set_context_directory(&mut self, dir: PathBuf) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        self.context_directory = Some(dir);
        Ok(())
    }

    pub fn add_data_dir(&mut self, dir: PathBuf) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        if !self.data_dirs.contains(&dir) {
            self.data_dirs.push(dir);
        }
        Ok(())
    }

    pub fn add_lib_dir(&mut self, dir: PathBuf) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        if !self.lib_dirs.contains(&dir) {
            self.lib_dirs.push(dir);
        }
        Ok(())
    }

    /// Matches a flag token against every flag of the tool.
    ///
    /// With [`requires_exact_flag_match`](Self::requires_exact_flag_match)
    /// set, prefix matches are discarded.
    pub fn resolve_flag(&self, token: &str) -> FlagResolution<'_> {
        let mut resolution = FlagResolution::new(token);
        for flag in &self.flags {
            resolution.merge(flag.resolve(token));
        }
        if self.require_exact_flag_match && !resolution.is_exact() {
            return FlagResolution::new(token);
        }
        resolution
    }

    /// Folds a definition produced by another configuration unit for the
    /// same word path and priority into this one.
    pub fn absorb(&mut self, other: ToolDefinition) -> Result<(), DefinitionError> {
        self.check_mutable()?;
        if let Some(label) = &other.source_label {
            self.claim_source(label)?;
        }
        if !other.desc.is_empty() {
            self.desc = other.desc;
        }
        if !other.long_desc.is_empty() {
            self.long_desc = other.long_desc;
        }
        for group in other.flag_groups.into_iter().skip(1) {
            if let Some(name) = group.name() {
                if self.flag_group(name).is_none() {
                    self.add_flag_group(group.kind(), Some(name.to_string()), group.desc())?;
                }
            }
        }
        let reserved: Vec<String> = other
            .used_flags
            .iter()
            .filter(|s| !other.flags.iter().any(|f| f.effective_flags().contains(&s.as_str())))
            .cloned()
            .collect();
        self.disable_flag(&reserved)?;
        for flag in other.flags {
            self.add_flag(flag)?;
        }
        for arg in other
            .required_args
            .into_iter()
            .chain(other.optional_args)
            .chain(other.remaining_arg)
        {
            self.add_positional(arg)?;
        }
        for (key, value) in other.default_data {
            self.default_data.entry(key).or_insert(value);
        }
        for (name, acceptor) in other.acceptors {
            self.register_acceptor(name, acceptor)?;
        }
        for (name, completion) in other.completions {
            self.register_completion(name, completion)?;
        }
        if other.run_handler.is_some() {
            self.run_handler = other.run_handler;
        }
        if other.delegate_target.is_some() {
            self.delegate_target = other.delegate_target;
        }
        if other.completion.is_some() {
            self.completion = other.completion;
        }
        self.enforce_flags_before_args |= other.enforce_flags_before_args;
        self.require_exact_flag_match |= other.require_exact_flag_match;
        self.argument_parsing_disabled |= other.argument_parsing_disabled;
        if self.context_directory.is_none() {
            self.context_directory = other.context_directory;
        }
        for dir in other.data_dirs {
            self.add_data_dir(dir)?;
        }
        for dir in other.lib_dirs {
            self.add_lib_dir(dir)?;
        }
        Ok(())
    }

    /// Resolves named acceptors and completions and freezes the tool.
    /// Tool-local registrations shadow those found through `names`.
    pub fn finish(&mut self, names: &dyn NameResolver) -> Result<(), DefinitionError> {
        if self.finished {
            return Ok(());
        }
        let local_acceptors = &self.acceptors;
        let local_completions = &self.completions;
        let find_acceptor = |name: &str| {
            local_acceptors
                .get(name)
                .cloned()
                .or_else(|| names.acceptor(name))
                .ok_or_else(|| DefinitionError::UnknownName {
                    kind: NameKind::Acceptor,
                    name: name.to_string(),
                })
        };
        let find_completion = |name: &str| {
            local_completions
                .get(name)
                .cloned()
                .or_else(|| names.completion(name))
                .ok_or_else(|| DefinitionError::UnknownName {
                    kind: NameKind::Completion,
                    name: name.to_string(),
                })
        };

        for flag in &mut self.flags {
            if let Some(name) = flag.acceptor().and_then(AcceptorRef::name) {
                let acceptor = find_acceptor(name)?;
                flag.set_acceptor(AcceptorRef::Resolved(acceptor));
            }
            if let Some(name) = flag.value_completion().and_then(CompletionRef::name) {
                let completion = find_completion(name)?;
                flag.set_value_completion(CompletionRef::Resolved(completion));
            }
        }
        let args = self
            .required_args
            .iter_mut()
            .chain(&mut self.optional_args)
            .chain(self.remaining_arg.as_mut());
        for arg in args {
            if let Some(name) = arg.acceptor().and_then(AcceptorRef::name) {
                let acceptor = find_acceptor(name)?;
                arg.set_acceptor(AcceptorRef::Resolved(acceptor));
            }
            if let Some(name) = arg.completion().and_then(CompletionRef::name) {
                let completion = find_completion(name)?;
                arg.set_completion(CompletionRef::Resolved(completion));
            }
        }
        if let Some(name) = self.completion.as_ref().and_then(CompletionRef::name) {
            self.completion = Some(CompletionRef::Resolved(find_completion(name)?));
        }
        self.finished = true;
        debug!(tool = %self.display_name(), priority = self.priority, "tool finished");
        Ok(())
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("words", &self.words)
            .field("priority", &self.priority)
            .field("desc", &self.desc)
            .field("flags", &self.flags)
            .field("runnable", &self.is_runnable())
            .field("delegate_target", &self.delegate_target)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagBuilder;

    struct NoNames;

    impl NameResolver for NoNames {
        fn acceptor(&self, _name: &str) -> Option<Arc<dyn Acceptor>> {
            None
        }
        fn completion(&self, _name: &str) -> Option<Arc<dyn Completion>> {
            None
        }
    }

    fn tool() -> ToolDefinition {
        ToolDefinition::new(vec!["greet".into()], 0)
    }

    #[test]
    fn test_optional_arg_default_installed_before_parsing() {
        let mut t = tool();
        t.add_positional(PositionalArg::optional("whom").default("world"))
            .unwrap();
        assert_eq!(t.default_data().get("whom"), Some(&Value::from("world")));
    }

    #[test]
    fn test_positional_order() {
        let mut t = tool();
        t.add_positional(PositionalArg::remaining("rest")).unwrap();
        t.add_positional(PositionalArg::optional("b")).unwrap();
        t.add_positional(PositionalArg::required("a")).unwrap();
        let keys: Vec<_> = t.positional_args().map(PositionalArg::key).collect();
        assert_eq!(keys, vec!["a", "b", "rest"]);
        assert!(!t.default_data().contains_key("a"));
        assert_eq!(
            t.add_positional(PositionalArg::remaining("more")).unwrap_err(),
            DefinitionError::DuplicateRemainingArg("rest".into())
        );
    }

    #[test]
    fn test_flag_collision() {
        let mut t = tool();
        t.add_flag(FlagBuilder::new("verbose").syntax("-v").build().unwrap())
            .unwrap();
        let err = t
            .add_flag(FlagBuilder::new("version").syntax("-v").build().unwrap())
            .unwrap_err();
        assert_eq!(err, DefinitionError::FlagCollision { spelling: "-v".into() });
    }

    #[test]
    fn test_quiet_collision_drops_spellings() {
        let mut t = tool();
        t.disable_flag(&["-h"]).unwrap();
        let help = FlagBuilder::new("help")
            .syntax("-h")
            .syntax("--help")
            .report_collisions(false)
            .build()
            .unwrap();
        t.add_flag(help).unwrap();
        assert_eq!(t.flags()[0].effective_flags(), vec!["--help"]);

        let only_h = FlagBuilder::new("h2")
            .syntax("-h")
            .report_collisions(false)
            .build()
            .unwrap();
        t.add_flag(only_h).unwrap();
        assert_eq!(t.flags().len(), 1);
    }

    #[test]
    fn test_unknown_flag_group() {
        let mut t = tool();
        let flag = FlagBuilder::new("x").group("mode").build().unwrap();
        assert_eq!(
            t.add_flag(flag.clone()).unwrap_err(),
            DefinitionError::UnknownFlagGroup("mode".into())
        );
        t.add_flag_group(FlagGroupKind::ExactlyOne, Some("mode".into()), "")
            .unwrap();
        t.add_flag(flag).unwrap();
        assert_eq!(t.flag_group("mode").unwrap().flag_keys(), ["x"]);
    }

    #[test]
    fn test_finish_resolves_local_acceptor_and_freezes() {
        let mut t = tool();
        t.register_acceptor(
            "word",
            Arc::new(crate::acceptor::EnumAcceptor::strings(["a", "b"])),
        )
        .unwrap();
        t.add_flag(FlagBuilder::new("w").accept_named("word").build().unwrap())
            .unwrap();
        t.finish(&NoNames).unwrap();
        assert!(t.flags()[0].acceptor().unwrap().resolved().is_some());
        assert_eq!(
            t.set_desc("late").unwrap_err(),
            DefinitionError::ToolFinished("greet".into())
        );
    }

    #[test]
    fn test_finish_reports_unknown_acceptor() {
        let mut t = tool();
        t.add_flag(FlagBuilder::new("n").accept_named("nope").build().unwrap())
            .unwrap();
        assert_eq!(
            t.finish(&NoNames).unwrap_err(),
            DefinitionError::UnknownName {
                kind: NameKind::Acceptor,
                name: "nope".into()
            }
        );
    }

    #[test]
    fn test_absorb_conflicting_sources() {
        let mut a = tool();
        a.claim_source("a.yml").unwrap();
        let mut b = tool();
        b.claim_source("b.yml").unwrap();
        assert_eq!(
            a.absorb(b).unwrap_err(),
            DefinitionError::AlreadyDefined("greet".into())
        );

        let mut a = tool();
        let mut b = tool();
        b.claim_source("b.yml").unwrap();
        b.set_desc("hello").unwrap();
        b.add_flag(FlagBuilder::new("loud").build().unwrap()).unwrap();
        a.absorb(b).unwrap();
        assert_eq!(a.desc(), "hello");
        assert!(a.used_flags().contains("--loud"));
        assert_eq!(a.source_label(), Some("b.yml"));
    }

    #[test]
    fn test_exact_match_requirement() {
        let mut t = tool();
        t.add_flag(FlagBuilder::new("verbose").build().unwrap()).unwrap();
        assert!(t.resolve_flag("--verb").is_unique());
        t.set_require_exact_flag_match(true).unwrap();
        assert!(t.resolve_flag("--verb").is_not_found());
        assert!(t.resolve_flag("--verbose").is_unique());
    }
}
