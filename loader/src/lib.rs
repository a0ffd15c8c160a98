//! Lazy, priority-ordered loading of hierarchical tool trees.
//!
//! Tools are addressed by word paths (`["db", "migrate"]`) and defined by
//! prioritized sources: directories of YAML tool files, in-memory
//! callbacks, or paths inside pinned git repositories. The [`Loader`]
//! evaluates only the configuration a lookup needs, merges the
//! definitions of every priority layer per word path, and resolves
//! aliases and delegation.
//!
//! # Directory layout
//!
//! ```text
//! tools/
//! ├── .tooltree.yml      # the directory's own tool
//! ├── .data/             # found with Loader::find_data
//! ├── build.yml          # tool `build`
//! └── db/
//!     ├── migrate.yml    # tool `db migrate`
//!     └── seed.yaml      # tool `db seed`
//! ```

mod config;
mod error;
mod git;
mod loader;
mod registry;
mod scope;
mod slot;
mod source;
mod tool_file;

pub use config::LoaderConfig;
pub use error::{DefinitionFailure, LoaderError, Result};
pub use git::{GitCache, RemoteCache, RemoteError};
pub use loader::{ChildEntry, Invocation, ListOptions, Loader, LoaderBuilder, PreloadHook};
pub use registry::{HelpFlagMiddleware, Middleware, NameRegistry};
pub use scope::{Mixin, Template, ToolBlock, ToolScope};
pub use slot::Alias;
pub use source::{Source, SourceInfo, SourceKind};
pub use tool_file::{
    AcceptSpec, AcceptorSpec, ArgSpec, AritySpec, CompleteSpec, FlagGroupSpec, FlagSpec,
    HandlerSpec, OneOrMany, ToolFile, ToolFileEvaluator, WordsSpec, YamlEvaluator,
};
