use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Raise log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Content API base URL (overrides `BOOKPAGES_API_URL`).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Page cache directory (overrides `BOOKPAGES_CACHE_DIR`).
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Flatten a nested TOC JSON file into the page sequence.
    Flatten(FlattenArgs),
    /// Print the table-of-contents outline of a TOC JSON file.
    Outline(OutlineArgs),
    /// Fetch a book's TOC from the content API and flatten it.
    FetchToc(FetchTocArgs),
    /// Resolve one page (structural or content) of a remote book.
    Read(ReadArgs),
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Args)]
pub struct FlattenArgs {
    /// Path to the nested TOC JSON (`generate-pages` response).
    #[arg(long)]
    pub toc: PathBuf,

    /// Book id recorded in the flat model.
    #[arg(long)]
    pub book_id: String,

    /// Output path for the flat model JSON (default: stdout).
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OutlineArgs {
    /// Path to the nested TOC JSON.
    #[arg(long)]
    pub toc: PathBuf,

    #[arg(long, default_value = "local")]
    pub book_id: String,
}

#[derive(Debug, Args)]
pub struct FetchTocArgs {
    #[arg(long)]
    pub book_id: String,

    /// Output path for the flat model JSON (default: stdout).
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[arg(long)]
    pub book_id: String,

    /// Global page number (1-based).
    #[arg(long)]
    pub page: u32,

    /// Warm the cache for the next content pages after resolving.
    #[arg(long)]
    pub prefetch: bool,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove entries older than the max age, and unreadable entries.
    Sweep(CacheSweepArgs),
    /// Remove every cached page of one book.
    Clear(CacheBookArgs),
    /// Print cache statistics for one book as JSON.
    Stats(CacheBookArgs),
}

#[derive(Debug, Args)]
pub struct CacheSweepArgs {
    /// Max entry age in days (default: `BOOKPAGES_CACHE_MAX_AGE_DAYS` or 7).
    #[arg(long)]
    pub days: Option<u32>,
}

#[derive(Debug, Args)]
pub struct CacheBookArgs {
    #[arg(long)]
    pub book_id: String,
}
