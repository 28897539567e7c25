use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stash",
    about = "Stash: inspect and edit a persistent compute-once cache",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory, overriding configuration and STASH_ROOT
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List cached keys
    Keys,
    /// Show the number of cached entries
    Size,
    /// Print the value cached under a key
    Get(GetArgs),
    /// Cache a JSON value under a key, replacing any prior value
    Set(SetArgs),
    /// Remove one entry, or every entry when no key is given
    Clear(ClearArgs),
    /// Show when an entry was written and where it lives
    Info(InfoArgs),
    /// Deep-merge JSON fragment files and cache the result under a key
    Merge(MergeArgs),
    /// Print the file backing a key
    Path(PathArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// Value as JSON text
    pub value: String,
}

#[derive(Args)]
pub struct ClearArgs {
    pub key: Option<String>,
}

#[derive(Args)]
pub struct InfoArgs {
    pub key: String,
}

#[derive(Args)]
pub struct MergeArgs {
    pub key: String,
    /// JSON files, each an object of `{ root: { sub-key: attributes } }`
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct PathArgs {
    pub key: String,
}
