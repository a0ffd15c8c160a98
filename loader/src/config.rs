//! Loader configuration.
//!
//! Controls the file-naming conventions used when a directory is expanded,
//! word splitting, middleware and the remote source cache.
//!
//! # Example YAML
//!
//! ```yaml
//! index_file_name: .tooltree.yml
//! preload_file_name: .preload.yml
//! preload_dir_name: .preload
//! data_dir_name: .data
//! lib_dir_name: .lib
//! tool_file_extensions: [yml, yaml]
//! extra_delimiters: ":"
//! middleware: [help_flags]
//! git_cache_dir: /var/cache/tooltree/git
//! update_remote: false
//! strict: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// Settings for a [`Loader`](crate::Loader).
///
/// Missing keys take their defaults; unknown keys are rejected.
///
/// # Examples
///
/// ```
/// # use tooltree_loader::LoaderConfig;
/// let config: LoaderConfig = serde_yaml::from_str("extra_delimiters: ':'").unwrap();
/// assert_eq!(config.extra_delimiters, ":");
/// assert_eq!(config.index_file_name, ".tooltree.yml");
/// assert!(config.is_tool_file(std::path::Path::new("deploy.yaml")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// File evaluated first when a directory is expanded; it defines the
    /// directory's own tool.
    pub index_file_name: String,
    /// Support file handed to the preload hook before any sibling is
    /// evaluated.
    pub preload_file_name: String,
    /// Directory whose files are all handed to the preload hook.
    pub preload_dir_name: String,
    /// Directory recorded as a data directory on the enclosing tool.
    pub data_dir_name: String,
    /// Directory recorded as a library directory on the enclosing tool.
    pub lib_dir_name: String,
    /// Extensions of files that define tools.
    pub tool_file_extensions: Vec<String>,
    /// Characters that split a leading word into several words, e.g. `:`
    /// turns `ns:tool` into `ns tool`.
    pub extra_delimiters: String,
    /// Names of middleware applied to every tool as it is finished.
    pub middleware: Vec<String>,
    /// Where pinned git sources are materialized.
    pub git_cache_dir: Option<PathBuf>,
    /// Refresh existing git checkouts instead of reusing them.
    pub update_remote: bool,
    /// Return the first definition error raised while expanding, instead
    /// of only collecting it.
    pub strict: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            index_file_name: ".tooltree.yml".to_string(),
            preload_file_name: ".preload.yml".to_string(),
            preload_dir_name: ".preload".to_string(),
            data_dir_name: ".data".to_string(),
            lib_dir_name: ".lib".to_string(),
            tool_file_extensions: vec!["yml".to_string(), "yaml".to_string()],
            extra_delimiters: String::new(),
            middleware: Vec::new(),
            git_cache_dir: None,
            update_remote: false,
            strict: true,
        }
    }
}

impl LoaderConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Io`] if the file cannot be read, or
    /// [`LoaderError::Yaml`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| LoaderError::io(path, e))?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| LoaderError::io(path, e))?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Returns `true` if `path` has one of the tool file extensions.
    pub fn is_tool_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.tool_file_extensions.iter().any(|t| t == ext))
    }

    /// Returns `true` for names with a fixed meaning inside a tool
    /// directory.
    pub fn is_special_name(&self, name: &str) -> bool {
        [
            &self.index_file_name,
            &self.preload_file_name,
            &self.preload_dir_name,
            &self.data_dir_name,
            &self.lib_dir_name,
        ]
        .iter()
        .any(|special| special.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.yml");
        let config = LoaderConfig {
            extra_delimiters: ":.".into(),
            middleware: vec!["help_flags".into()],
            ..LoaderConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(LoaderConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = serde_yaml::from_str::<LoaderConfig>("index_file: x").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_missing_file() {
        let err = LoaderConfig::load("/nonexistent/loader.yml").unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn test_update_remote_defaults_off() {
        assert!(!LoaderConfig::default().update_remote);
        let config: LoaderConfig = serde_yaml::from_str("update_remote: true").unwrap();
        assert!(config.update_remote);
    }

    #[test]
    fn test_special_names() {
        let config = LoaderConfig::default();
        assert!(config.is_special_name(".data"));
        assert!(config.is_special_name(".tooltree.yml"));
        assert!(!config.is_special_name("build.yml"));
    }
}
