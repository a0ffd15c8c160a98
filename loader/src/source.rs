//! Configuration sources.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::scope::ToolBlock;

/// One origin of tool configuration, as registered with a
/// [`Loader`](crate::Loader).
#[derive(Clone)]
pub enum Source {
    /// A tool file or a directory of tool files.
    Path(PathBuf),
    /// An in-memory definition of the root tool.
    Callback { name: String, block: ToolBlock },
    /// A path inside a remote git repository, pinned to a commit and
    /// materialized through the [`RemoteCache`](crate::RemoteCache).
    Git {
        remote: String,
        path: PathBuf,
        commit: String,
    },
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Callback { name, .. } => f.debug_struct("Callback").field("name", name).finish(),
            Self::Git {
                remote,
                path,
                commit,
            } => f
                .debug_struct("Git")
                .field("remote", remote)
                .field("path", path)
                .field("commit", commit)
                .finish(),
        }
    }
}

/// What kind of origin a [`SourceInfo`] describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Path(PathBuf),
    Callback(String),
    Git {
        remote: String,
        path: PathBuf,
        commit: String,
    },
}

/// A registered source with its priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    kind: SourceKind,
    priority: i64,
    context_directory: Option<PathBuf>,
}

impl SourceInfo {
    pub(crate) fn new(kind: SourceKind, priority: i64, context_directory: Option<PathBuf>) -> Self {
        let context_directory = context_directory.or_else(|| match &kind {
            SourceKind::Path(path) => path.parent().map(Path::to_path_buf),
            _ => None,
        });
        Self {
            kind,
            priority,
            context_directory,
        }
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Directory that tools from this source treat as their working
    /// context. Defaults to the parent of a registered path.
    pub fn context_directory(&self) -> Option<&Path> {
        self.context_directory.as_deref()
    }

    pub(crate) fn with_context_directory(&self, dir: PathBuf) -> Self {
        Self {
            context_directory: Some(dir),
            ..self.clone()
        }
    }

    /// Human-readable name used in error messages.
    pub fn label(&self) -> String {
        match &self.kind {
            SourceKind::Path(path) => path.display().to_string(),
            SourceKind::Callback(name) => format!("callback {name}"),
            SourceKind::Git {
                remote,
                path,
                commit,
            } => format!("git {remote}:{}@{commit}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_directory_defaults_to_parent() {
        let info = SourceInfo::new(SourceKind::Path("/srv/tools".into()), -1, None);
        assert_eq!(info.context_directory(), Some(Path::new("/srv")));

        let info = SourceInfo::new(SourceKind::Callback("init".into()), 1, None);
        assert_eq!(info.context_directory(), None);
        assert_eq!(info.label(), "callback init");
    }

    #[test]
    fn test_git_label() {
        let info = SourceInfo::new(
            SourceKind::Git {
                remote: "https://example.com/tools.git".into(),
                path: "ci".into(),
                commit: "v1".into(),
            },
            -2,
            None,
        );
        assert_eq!(info.label(), "git https://example.com/tools.git:ci@v1");
    }
}
