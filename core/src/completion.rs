//! Completion contract and the standard completion strategy.
//!
//! A shell front end builds a [`CompletionContext`] for the words typed so
//! far plus the fragment under the cursor, and asks the resolved tool's
//! [`Completion`] for [`Candidate`]s. Every tool has one strategy: its own
//! override, or [`StandardToolCompletion`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::acceptor::AcceptorRef;
use crate::flag::{Flag, FlagKind, ValueArity};
use crate::parser::ArgParser;
use crate::tool::ToolDefinition;
use crate::words::is_hidden_word;

/// One completion candidate. A partial candidate (such as a directory)
/// should not be followed by a space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Candidate {
    pub string: String,
    pub partial: bool,
}

impl Candidate {
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            string: string.into(),
            partial: false,
        }
    }

    pub fn partial(string: impl Into<String>) -> Self {
        Self {
            string: string.into(),
            partial: true,
        }
    }
}

/// Tool lookups completion needs from the loader.
pub trait ToolLookup {
    /// Resolves a word path, returning the tool and the unconsumed words.
    fn lookup_tool(&self, words: &[String]) -> Option<(Arc<ToolDefinition>, Vec<String>)>;

    /// Names of the direct, visible children of `words`.
    fn child_names(&self, words: &[String]) -> Vec<String>;

    /// Follows a delegation chain to the tool that actually runs.
    fn delegate_of(&self, _tool: &ToolDefinition) -> Option<Arc<ToolDefinition>> {
        None
    }
}

/// Everything a completion strategy may inspect.
pub struct CompletionContext<'a> {
    lookup: &'a dyn ToolLookup,
    tool: Arc<ToolDefinition>,
    previous_words: Vec<String>,
    args: Vec<String>,
    fragment_prefix: String,
    fragment: String,
}

impl<'a> CompletionContext<'a> {
    /// Resolves `words` (everything before the cursor) and captures the
    /// fragment being completed.
    pub fn new(lookup: &'a dyn ToolLookup, words: Vec<String>, fragment: impl Into<String>) -> Option<Self> {
        let (tool, args) = lookup.lookup_tool(&words)?;
        Some(Self {
            lookup,
            tool,
            previous_words: words,
            args,
            fragment_prefix: String::new(),
            fragment: fragment.into(),
        })
    }

    /// Same lookup and fragment, aimed at a different tool.
    pub fn retarget(&self, tool: Arc<ToolDefinition>) -> Self {
        Self {
            lookup: self.lookup,
            tool,
            previous_words: self.previous_words.clone(),
            args: self.args.clone(),
            fragment_prefix: self.fragment_prefix.clone(),
            fragment: self.fragment.clone(),
        }
    }

    /// Part of the shell word that precedes the fragment and is kept out of
    /// candidates, e.g. `--output=` while completing a flag value.
    pub fn with_fragment_prefix(mut self, prefix: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.fragment_prefix = prefix.into();
        self.fragment = fragment.into();
        self
    }

    pub fn lookup(&self) -> &'a dyn ToolLookup {
        self.lookup
    }

    pub fn tool(&self) -> &Arc<ToolDefinition> {
        &self.tool
    }

    pub fn previous_words(&self) -> &[String] {
        &self.previous_words
    }

    /// Words after the tool name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn fragment_prefix(&self) -> &str {
        &self.fragment_prefix
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// A parser that has consumed every argument typed so far.
    pub fn arg_parser(&self) -> ArgParser<'_> {
        ArgParser::new(&self.tool).parse(&self.args)
    }
}

impl fmt::Debug for CompletionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionContext")
            .field("tool", &self.tool.words())
            .field("args", &self.args)
            .field("fragment_prefix", &self.fragment_prefix)
            .field("fragment", &self.fragment)
            .finish()
    }
}

/// A completion strategy.
pub trait Completion: Send + Sync + fmt::Debug {
    fn call(&self, context: &CompletionContext<'_>) -> Vec<Candidate>;
}

/// A completion given directly, or by a name resolved when the owning
/// tool is finished.
#[derive(Debug, Clone)]
pub enum CompletionRef {
    Named(String),
    Resolved(Arc<dyn Completion>),
}

impl CompletionRef {
    pub fn resolved(&self) -> Option<&Arc<dyn Completion>> {
        match self {
            Self::Resolved(completion) => Some(completion),
            Self::Named(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Resolved(_) => None,
        }
    }
}

impl From<Arc<dyn Completion>> for CompletionRef {
    fn from(completion: Arc<dyn Completion>) -> Self {
        Self::Resolved(completion)
    }
}

/// Completes from a fixed list of values.
#[derive(Debug, Clone, Default)]
pub struct EnumCompletion {
    values: Vec<String>,
}

impl EnumCompletion {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl Completion for EnumCompletion {
    fn call(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        self.values
            .iter()
            .filter(|v| v.starts_with(context.fragment()))
            .map(Candidate::new)
            .collect()
    }
}

/// Completes file and directory names relative to a base directory
/// (the tool's context directory, else the process working directory).
#[derive(Debug, Clone, Default)]
pub struct FileSystemCompletion {
    cwd: Option<PathBuf>,
    omit_files: bool,
    omit_directories: bool,
}

impl FileSystemCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn omit_files(mut self) -> Self {
        self.omit_files = true;
        self
    }

    pub fn omit_directories(mut self) -> Self {
        self.omit_directories = true;
        self
    }

    fn candidates(&self, base: &Path, fragment: &str) -> Vec<Candidate> {
        let (dir_part, name_part) = match fragment.rfind('/') {
            Some(index) => fragment.split_at(index + 1),
            None => ("", fragment),
        };
        let dir = if Path::new(dir_part).is_absolute() {
            PathBuf::from(dir_part)
        } else {
            base.join(dir_part)
        };
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(name_part) || (name.starts_with('.') && !name_part.starts_with('.')) {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir && !self.omit_directories {
                candidates.push(Candidate::partial(format!("{dir_part}{name}/")));
            } else if !is_dir && !self.omit_files {
                candidates.push(Candidate::new(format!("{dir_part}{name}")));
            }
        }
        candidates.sort();
        candidates
    }
}

impl Completion for FileSystemCompletion {
    fn call(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        let base = self
            .cwd
            .clone()
            .or_else(|| context.tool().context_directory().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        self.candidates(&base, context.fragment())
    }
}

/// The default strategy. In order: a flag value in progress, subtool
/// names, the next positional slot, flag names, an optional flag value,
/// and finally the delegation target's own completion.
#[derive(Debug, Clone)]
pub struct StandardToolCompletion {
    complete_subtools: bool,
    include_hidden_subtools: bool,
    complete_args: bool,
    complete_flags: bool,
    complete_flag_values: bool,
}

impl Default for StandardToolCompletion {
    fn default() -> Self {
        Self {
            complete_subtools: true,
            include_hidden_subtools: false,
            complete_args: true,
            complete_flags: true,
            complete_flag_values: true,
        }
    }
}

impl StandardToolCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_hidden_subtools(mut self, include: bool) -> Self {
        self.include_hidden_subtools = include;
        self
    }

    pub fn complete_subtools(mut self, enabled: bool) -> Self {
        self.complete_subtools = enabled;
        self
    }

    pub fn complete_args(mut self, enabled: bool) -> Self {
        self.complete_args = enabled;
        self
    }

    pub fn complete_flags(mut self, enabled: bool) -> Self {
        self.complete_flags = enabled;
        self
    }

    pub fn complete_flag_values(mut self, enabled: bool) -> Self {
        self.complete_flag_values = enabled;
        self
    }

    fn valued_flag_candidates(&self, context: &CompletionContext<'_>) -> Option<Vec<Candidate>> {
        if !self.complete_flag_values {
            return None;
        }
        let parser = context.arg_parser();
        if let Some(flag) = parser.active_flag() {
            if flag.arity() == Some(ValueArity::Required) {
                return Some(flag_value_candidates(flag, context));
            }
            return None;
        }
        if !parser.flags_allowed() {
            return None;
        }
        let (name, value) = context.fragment().split_once('=')?;
        if !name.starts_with("--") {
            return None;
        }
        let resolution = context.tool().resolve_flag(name);
        let flag = resolution.unique()?.flag;
        if flag.kind() != FlagKind::Value {
            return Some(Vec::new());
        }
        let value_context = context
            .retarget(Arc::clone(context.tool()))
            .with_fragment_prefix(format!("{}{name}=", context.fragment_prefix()), value);
        Some(flag_value_candidates(flag, &value_context))
    }

    fn subtool_or_arg_candidates(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        let parser = context.arg_parser();
        if parser.active_flag().is_some_and(|f| f.arity() == Some(ValueArity::Required)) {
            return Vec::new();
        }
        if parser.flags_allowed() && context.fragment().starts_with('-') {
            return Vec::new();
        }
        if self.complete_subtools && !parser.has_args() {
            let subtools = self.subtool_candidates(context);
            if !subtools.is_empty() {
                return subtools;
            }
        }
        if !self.complete_args {
            return Vec::new();
        }
        let Some(arg) = parser.next_arg() else {
            return Vec::new();
        };
        if let Some(completion) = arg.completion().and_then(|c| c.resolved()) {
            return completion.call(context);
        }
        acceptor_candidates(arg.acceptor(), context.fragment())
    }

    fn subtool_candidates(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        let fragment = context.fragment();
        context
            .lookup()
            .child_names(context.tool().words())
            .into_iter()
            .filter(|name| name.starts_with(fragment))
            .filter(|name| {
                self.include_hidden_subtools || !is_hidden_word(name) || fragment.starts_with('_')
            })
            .map(Candidate::new)
            .collect()
    }

    fn plain_flag_candidates(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        let fragment = context.fragment();
        if !self.complete_flags || !(fragment.is_empty() || fragment.starts_with('-')) {
            return Vec::new();
        }
        let parser = context.arg_parser();
        if !parser.flags_allowed()
            || parser.active_flag().is_some_and(|f| f.arity() == Some(ValueArity::Required))
        {
            return Vec::new();
        }
        context
            .tool()
            .flags()
            .iter()
            .flat_map(Flag::effective_flags)
            .filter(|spelling| spelling.starts_with(fragment))
            .map(Candidate::new)
            .collect()
    }

    fn optional_flag_value_candidates(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        if !self.complete_flag_values {
            return Vec::new();
        }
        let parser = context.arg_parser();
        match parser.active_flag() {
            Some(flag) if flag.arity() == Some(ValueArity::Optional) => {
                flag_value_candidates(flag, context)
            }
            _ => Vec::new(),
        }
    }
}

impl Completion for StandardToolCompletion {
    fn call(&self, context: &CompletionContext<'_>) -> Vec<Candidate> {
        if let Some(mut candidates) = self.valued_flag_candidates(context) {
            candidates.sort();
            candidates.dedup();
            return candidates;
        }
        let mut candidates = self.subtool_or_arg_candidates(context);
        candidates.extend(self.plain_flag_candidates(context));
        candidates.extend(self.optional_flag_value_candidates(context));
        if context.tool().delegate_target().is_some() {
            if let Some(target) = context.lookup().delegate_of(context.tool()) {
                let delegated = context.retarget(Arc::clone(&target));
                candidates.extend(completion_for(&target).call(&delegated));
            }
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }
}

fn flag_value_candidates(flag: &Flag, context: &CompletionContext<'_>) -> Vec<Candidate> {
    let candidates = match flag.value_completion().and_then(|c| c.resolved()) {
        Some(completion) => completion.call(context),
        None => acceptor_candidates(flag.acceptor(), context.fragment()),
    };
    let prefix = context.fragment_prefix();
    if prefix.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .map(|c| Candidate {
            string: format!("{prefix}{}", c.string),
            partial: c.partial,
        })
        .collect()
}

fn acceptor_candidates(acceptor: Option<&AcceptorRef>, fragment: &str) -> Vec<Candidate> {
    acceptor
        .and_then(AcceptorRef::resolved)
        .map(|a| a.completion_values())
        .unwrap_or_default()
        .into_iter()
        .filter(|v| v.starts_with(fragment))
        .map(Candidate::new)
        .collect()
}

/// The completion strategy of `tool`: its resolved override, else the
/// standard strategy.
pub fn completion_for(tool: &ToolDefinition) -> Arc<dyn Completion> {
    match tool.completion().and_then(CompletionRef::resolved) {
        Some(completion) => Arc::clone(completion),
        None => Arc::new(StandardToolCompletion::default()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::acceptor::EnumAcceptor;
    use crate::flag::FlagBuilder;
    use crate::positional::PositionalArg;
    use crate::tool::RunHandler;

    struct Fixture {
        tools: BTreeMap<Vec<String>, Arc<ToolDefinition>>,
    }

    impl ToolLookup for Fixture {
        fn lookup_tool(&self, words: &[String]) -> Option<(Arc<ToolDefinition>, Vec<String>)> {
            (0..=words.len()).rev().find_map(|len| {
                self.tools
                    .get(&words[..len].to_vec())
                    .map(|t| (Arc::clone(t), words[len..].to_vec()))
            })
        }

        fn child_names(&self, words: &[String]) -> Vec<String> {
            self.tools
                .keys()
                .filter(|k| k.len() == words.len() + 1 && k.starts_with(words))
                .filter_map(|k| k.last().cloned())
                .collect()
        }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn fixture() -> Fixture {
        let root = ToolDefinition::new(Vec::new(), 0);
        let mut build = ToolDefinition::new(words(&["build"]), 0);
        let handler: RunHandler = Arc::new(|_| 0);
        build.set_run_handler(handler).unwrap();
        build
            .add_flag(
                FlagBuilder::new("profile")
                    .syntax("--profile=NAME")
                    .accept(Arc::new(EnumAcceptor::strings(["debug", "release"])))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        build
            .add_flag(FlagBuilder::new("verbose").syntax("-v").syntax("--verbose").build().unwrap())
            .unwrap();
        build
            .add_positional(
                PositionalArg::optional("target").accept(Arc::new(EnumAcceptor::strings(["lib", "bin"]))),
            )
            .unwrap();
        let bench = ToolDefinition::new(words(&["bench"]), 0);
        let hidden = ToolDefinition::new(words(&["_internal"]), 0);

        let mut tools = BTreeMap::new();
        for tool in [root, build, bench, hidden] {
            tools.insert(tool.words().to_vec(), Arc::new(tool));
        }
        Fixture { tools }
    }

    fn complete(fixture: &Fixture, typed: &[&str], fragment: &str) -> Vec<String> {
        let context = CompletionContext::new(fixture, words(typed), fragment).unwrap();
        completion_for(context.tool())
            .call(&context)
            .into_iter()
            .map(|c| c.string)
            .collect()
    }

    #[test]
    fn test_subtools_skip_hidden() {
        let f = fixture();
        assert_eq!(complete(&f, &[], "b"), vec!["bench", "build"]);
        assert_eq!(complete(&f, &[], "_"), vec!["_internal"]);
    }

    #[test]
    fn test_flag_names() {
        let f = fixture();
        assert_eq!(complete(&f, &["build"], "--p"), vec!["--profile"]);
        assert_eq!(complete(&f, &["build"], "-"), vec!["--profile", "--verbose", "-v"]);
    }

    #[test]
    fn test_pending_flag_value() {
        let f = fixture();
        assert_eq!(complete(&f, &["build", "--profile"], "r"), vec!["release"]);
        assert_eq!(complete(&f, &["build", "--profile"], ""), vec!["debug", "release"]);
    }

    #[test]
    fn test_attached_flag_value() {
        let f = fixture();
        assert_eq!(complete(&f, &["build"], "--profile=d"), vec!["--profile=debug"]);
        assert_eq!(complete(&f, &["build"], "--prof=r"), vec!["--prof=release"]);
    }

    #[test]
    fn test_positional_and_flags_together() {
        let f = fixture();
        assert_eq!(
            complete(&f, &["build"], ""),
            vec!["--profile", "--verbose", "-v", "bin", "lib"]
        );
    }

    #[test]
    fn test_filesystem_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("setup.cfg"), "").unwrap();
        std::fs::write(dir.path().join(".secret"), "").unwrap();

        let completion = FileSystemCompletion::new().with_cwd(dir.path());
        let got = completion.candidates(dir.path(), "s");
        assert_eq!(got, vec![Candidate::new("setup.cfg"), Candidate::partial("src/")]);
        let got = completion.candidates(dir.path(), ".");
        assert_eq!(got, vec![Candidate::new(".secret")]);
        let got = FileSystemCompletion::new().omit_files().candidates(dir.path(), "");
        assert_eq!(got, vec![Candidate::partial("src/")]);
    }
}
