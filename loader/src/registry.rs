//! Named registries and middleware.
//!
//! Acceptors, completions, mixins and templates are found by name: first
//! on the tool and its ancestors, then in the loader-wide registries kept
//! here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tooltree_core::{
    AcceptorRegistry, Completion, DefinitionError, FileSystemCompletion, FlagBuilder, NameKind,
    ToolDefinition,
};

use crate::scope::{Mixin, Template};

/// Name-to-implementation table for one kind of registration.
pub struct NameRegistry<T: ?Sized> {
    kind: NameKind,
    entries: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> NameRegistry<T> {
    pub fn new(kind: NameKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> NameKind {
        self.kind
    }

    /// Registers `value` under `name`, rejecting duplicates.
    pub fn register(&mut self, name: impl Into<String>, value: Arc<T>) -> Result<(), DefinitionError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(DefinitionError::DuplicateName {
                kind: self.kind,
                name,
            });
        }
        self.entries.insert(name, value);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Clone for NameRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for NameRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameRegistry")
            .field("kind", &self.kind)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Configures every tool as it is finished, before it is frozen.
pub trait Middleware: Send + Sync {
    fn config(&self, tool: &mut ToolDefinition) -> Result<(), DefinitionError>;
}

/// Adds `-?`, `-h` and `--help` to every tool, skipping spellings the tool
/// already uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpFlagMiddleware;

impl Middleware for HelpFlagMiddleware {
    fn config(&self, tool: &mut ToolDefinition) -> Result<(), DefinitionError> {
        let flag = FlagBuilder::new("_help")
            .syntax("-?")
            .syntax("-h")
            .syntax("--help")
            .desc("Show help for this tool")
            .report_collisions(false)
            .build()?;
        tool.add_flag(flag)
    }
}

/// Loader-wide registries, immutable once the loader is built.
#[derive(Clone)]
pub(crate) struct Registries {
    pub(crate) acceptors: AcceptorRegistry,
    pub(crate) completions: NameRegistry<dyn Completion>,
    pub(crate) mixins: NameRegistry<dyn Mixin>,
    pub(crate) templates: NameRegistry<dyn Template>,
    pub(crate) middleware: NameRegistry<dyn Middleware>,
}

impl Registries {
    /// Well-known acceptors, file and directory completions, and the help
    /// flag middleware.
    pub(crate) fn standard() -> Self {
        let mut completions: NameRegistry<dyn Completion> = NameRegistry::new(NameKind::Completion);
        let mut middleware: NameRegistry<dyn Middleware> = NameRegistry::new(NameKind::Middleware);
        let builtins = [
            ("files", Arc::new(FileSystemCompletion::new()) as Arc<dyn Completion>),
            (
                "directories",
                Arc::new(FileSystemCompletion::new().omit_files()) as Arc<dyn Completion>,
            ),
        ];
        for (name, completion) in builtins {
            let _ = completions.register(name, completion);
        }
        let _ = middleware.register("help_flags", Arc::new(HelpFlagMiddleware) as Arc<dyn Middleware>);
        Self {
            acceptors: AcceptorRegistry::standard(),
            completions,
            mixins: NameRegistry::new(NameKind::Mixin),
            templates: NameRegistry::new(NameKind::Template),
            middleware,
        }
    }
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("acceptors", &self.acceptors.names().collect::<Vec<_>>())
            .field("completions", &self.completions)
            .field("mixins", &self.mixins)
            .field("templates", &self.templates)
            .field("middleware", &self.middleware)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration() {
        let mut registry: NameRegistry<dyn Middleware> = NameRegistry::new(NameKind::Middleware);
        registry.register("help", Arc::new(HelpFlagMiddleware)).unwrap();
        let err = registry.register("help", Arc::new(HelpFlagMiddleware)).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicateName {
                kind: NameKind::Middleware,
                name: "help".into()
            }
        );
        assert!(registry.lookup("help").is_some());
        assert!(registry.lookup("other").is_none());
    }

    #[test]
    fn test_help_middleware_respects_existing_flags() {
        let mut tool = ToolDefinition::new(vec!["t".into()], 0);
        tool.add_flag(FlagBuilder::new("host").syntax("-h HOST").build().unwrap())
            .unwrap();
        HelpFlagMiddleware.config(&mut tool).unwrap();
        let help = tool.flags_for_key("_help").next().unwrap();
        assert_eq!(help.effective_flags(), vec!["-?", "--help"]);
    }

    #[test]
    fn test_standard_registries() {
        let registries = Registries::standard();
        assert!(registries.acceptors.contains("integer"));
        assert!(registries.completions.lookup("files").is_some());
        assert!(registries.middleware.lookup("help_flags").is_some());
    }
}
