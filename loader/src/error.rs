//! Error types for loading and resolving tools.
//!
//! Definition errors coming out of a configuration unit are wrapped with
//! the source and word path they were raised for; I/O, YAML and remote
//! cache failures pass through with their own context.

use std::path::PathBuf;

use thiserror::Error;
use tooltree_core::{DefinitionError, display_words};

/// A [`DefinitionError`] attributed to the unit that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_label}: {}: {error}", display_or_root(.words))]
pub struct DefinitionFailure {
    pub source_label: String,
    pub words: Vec<String>,
    pub error: DefinitionError,
}

impl DefinitionFailure {
    pub fn new(source_label: impl Into<String>, words: Vec<String>, error: DefinitionError) -> Self {
        Self {
            source_label: source_label.into(),
            words,
            error,
        }
    }
}

fn display_or_root(words: &[String]) -> String {
    if words.is_empty() {
        "(root)".to_string()
    } else {
        display_words(words)
    }
}

/// Errors that can occur while loading or resolving tools.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A configuration unit failed to define its tool.
    #[error(transparent)]
    Definition(#[from] DefinitionFailure),

    /// File I/O failure.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The remote cache could not materialize a pinned source.
    #[error("failed to fetch {remote} at {commit}: {source}")]
    Remote {
        remote: String,
        commit: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A git source was registered but the loader has no remote cache.
    #[error("no remote cache configured for {remote}")]
    NoRemoteCache { remote: String },

    /// A delegating tool points at a path with no tool.
    #[error("delegation target not found: {}", display_words(.words))]
    DelegateNotFound { words: Vec<String> },
}

impl LoaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying definition error, if any.
    pub fn definition_error(&self) -> Option<&DefinitionError> {
        match self {
            Self::Definition(failure) => Some(&failure.error),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`LoaderError`].
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_source_and_tool() {
        let failure = DefinitionFailure::new(
            "tools/a.yml",
            vec!["a".into(), "b".into()],
            DefinitionError::AlreadyDefined("a b".into()),
        );
        let text = failure.to_string();
        assert!(text.starts_with("tools/a.yml: a b: "), "{text}");

        let root = DefinitionFailure::new("cb", Vec::new(), DefinitionError::SourceAfterLoading);
        assert!(root.to_string().contains("(root)"));
    }
}
