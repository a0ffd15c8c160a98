use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tooltree_core::{ToolDefinition, UsageError, Value};
use tooltree_loader::{ChildEntry, ListOptions, Loader, LoaderConfig};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Directory of tools discovered while walking up from the working
/// directory.
const TOOLS_DIR_NAME: &str = ".tooltree";
/// Single-file tool definition discovered the same way.
const TOOLS_FILE_NAME: &str = ".tooltree.yml";

/// Exit status for usage errors.
const USAGE_EXIT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "tooltree")]
#[command(about = "Resolve, inspect and run tools defined in tool directories")]
struct Cli {
    /// Tool directory or file to load. Repeatable; earlier ones take
    /// precedence. Defaults to `.tooltree` directories and `.tooltree.yml`
    /// files found from the working directory upwards.
    #[arg(long = "tools", value_name = "DIR")]
    tools: Vec<PathBuf>,
    /// Pinned git source to load. Repeatable.
    #[arg(long, num_args = 3, value_names = ["REMOTE", "PATH", "COMMIT"])]
    git: Vec<String>,
    /// Loader configuration file (YAML).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory where git sources are checked out.
    #[arg(long, value_name = "DIR")]
    git_cache: Option<PathBuf>,
    /// Refresh git checkouts that are already cached.
    #[arg(long)]
    update: bool,
    /// Increase log verbosity (-v, -vv, -vvv). `TOOLTREE_LOG` takes
    /// precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the tool a command line names and the arguments left over.
    Resolve(WordsArgs),
    /// List the tools below a word path.
    List(ListArgs),
    /// Parse a command line and print the bound data and usage errors.
    Parse(WordsArgs),
    /// Print completion candidates. The last word is the fragment being
    /// completed.
    Complete(WordsArgs),
    /// Run a tool.
    Run(WordsArgs),
}

#[derive(Debug, Args)]
struct WordsArgs {
    /// Tool words followed by the tool's own flags and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    words: Vec<String>,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Include tools at every depth.
    #[arg(long)]
    recursive: bool,
    /// Include hidden and non-runnable tools.
    #[arg(long)]
    all: bool,
    /// Word path to list below.
    words: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolSummary<'a> {
    words: &'a [String],
    priority: i64,
    desc: &'a str,
    runnable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delegate_to: Option<&'a [String]>,
}

impl<'a> From<&'a ToolDefinition> for ToolSummary<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            words: tool.words(),
            priority: tool.priority(),
            desc: tool.desc(),
            runnable: tool.is_runnable(),
            source: tool.source_label(),
            delegate_to: tool.delegate_target(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ListEntry<'a> {
    Tool(ToolSummary<'a>),
    Alias {
        words: &'a [String],
        target: &'a [String],
    },
}

#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    tool: ToolSummary<'a>,
    args: &'a [String],
}

#[derive(Debug, Serialize)]
struct ParseReport<'a> {
    tool: &'a [String],
    runner: &'a [String],
    args: &'a [String],
    data: &'a BTreeMap<String, Value>,
    errors: &'a [UsageError],
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = build_loader(&cli).and_then(|loader| match cli.command {
        Command::Resolve(args) => run_resolve(&loader, args),
        Command::List(args) => run_list(&loader, args),
        Command::Parse(args) => run_parse(&loader, args),
        Command::Complete(args) => run_complete(&loader, args),
        Command::Run(args) => run_tool(&loader, args),
    });

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("TOOLTREE_LOG").unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_loader(cli: &Cli) -> Result<Loader, String> {
    let mut config = match &cli.config {
        Some(path) => LoaderConfig::load(path).map_err(|e| e.to_string())?,
        None => LoaderConfig::default(),
    };
    if let Some(dir) = &cli.git_cache {
        config.git_cache_dir = Some(dir.clone());
    }
    if cli.update {
        config.update_remote = true;
    }

    let paths = if cli.tools.is_empty() {
        let cwd = env::current_dir().map_err(|e| format!("cannot read working directory: {e}"))?;
        discover_tool_paths(&cwd)
    } else {
        cli.tools.clone()
    };
    if paths.is_empty() && cli.git.is_empty() {
        warn!("no tool directories found");
    }

    let mut builder = Loader::builder().config(config);
    for path in paths {
        debug!(path = %path.display(), "adding tool path");
        builder = builder.path(path);
    }
    for git in cli.git.chunks_exact(3) {
        builder = builder.git(&git[0], &git[1], &git[2]);
    }
    builder.build().map_err(|e| e.to_string())
}

/// Tool sources from `start` up to the filesystem root, nearest first.
fn discover_tool_paths(start: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for dir in start.ancestors() {
        let tools_dir = dir.join(TOOLS_DIR_NAME);
        let tools_file = dir.join(TOOLS_FILE_NAME);
        if tools_dir.is_dir() {
            paths.push(tools_dir);
        } else if tools_file.is_file() {
            paths.push(tools_file);
        }
    }
    paths
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("serialization failed: {e}"))?;
    println!("{json}");
    Ok(())
}

fn run_resolve(loader: &Loader, args: WordsArgs) -> Result<i32, String> {
    let (tool, rest) = loader.resolve(args.words.as_slice()).map_err(|e| e.to_string())?;
    print_json(&ResolveReport {
        tool: ToolSummary::from(tool.as_ref()),
        args: &rest,
    })?;
    Ok(0)
}

fn run_list(loader: &Loader, args: ListArgs) -> Result<i32, String> {
    let options = ListOptions {
        recursive: args.recursive,
        include_hidden: args.all,
        include_non_runnable: args.all,
    };
    let children = loader
        .list_children(args.words.as_slice(), options)
        .map_err(|e| e.to_string())?;
    let entries: Vec<ListEntry<'_>> = children
        .iter()
        .map(|child| match child {
            ChildEntry::Tool(tool) => ListEntry::Tool(ToolSummary::from(tool.as_ref())),
            ChildEntry::Alias(alias) => ListEntry::Alias {
                words: &alias.words,
                target: &alias.target,
            },
        })
        .collect();
    print_json(&entries)?;
    Ok(0)
}

fn run_parse(loader: &Loader, args: WordsArgs) -> Result<i32, String> {
    let invocation = loader.parse(args.words.as_slice()).map_err(|e| e.to_string())?;
    print_json(&ParseReport {
        tool: invocation.tool.words(),
        runner: invocation.runner.words(),
        args: &invocation.args,
        data: &invocation.outcome.data,
        errors: &invocation.outcome.errors,
    })?;
    if invocation.outcome.errors.is_empty() {
        Ok(0)
    } else {
        Ok(USAGE_EXIT)
    }
}

fn run_complete(loader: &Loader, args: WordsArgs) -> Result<i32, String> {
    let mut words = args.words;
    let fragment = words.pop().unwrap_or_default();
    let candidates = loader.complete(words.as_slice(), &fragment);
    print_json(&candidates)?;
    Ok(0)
}

fn run_tool(loader: &Loader, args: WordsArgs) -> Result<i32, String> {
    let invocation = loader.parse(args.words.as_slice()).map_err(|e| e.to_string())?;
    let name = invocation.tool.display_name();
    if !invocation.outcome.errors.is_empty() {
        for error in &invocation.outcome.errors {
            eprintln!("error: {name}: {error}");
        }
        return Ok(USAGE_EXIT);
    }
    match invocation.run() {
        Some(code) => Ok(code),
        None if invocation.tool.is_root() => Err("no tool given".to_string()),
        None => Err(format!("{name} has nothing to run; see `tooltree list {name}`")),
    }
}
