//! Stance CLI - where does this thread stand?
//!
//! Lists and reads forum threads through a JSON gateway, summarizes the
//! positions taken across all of a thread's pages with Gemini, and drafts
//! replies from that summary.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stance_core::{Config, ThreadSort};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Stance - chunked stance summaries of long forum threads
#[derive(Parser)]
#[command(name = "stance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "STANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Forum gateway URL (overrides config)
    #[arg(long, global = true, env = "STANCE_FORUM_URL")]
    forum_url: Option<String>,

    /// Analyzer model (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Neither read nor write the analysis cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List threads of a forum
    Threads {
        /// Forum name
        forum: String,

        /// Listing page
        #[arg(long, default_value = "1")]
        page: u32,

        /// Sort order (reply, create, hot)
        #[arg(long, default_value = "reply")]
        sort: ThreadSort,
    },

    /// Search a forum's threads by keyword
    Search {
        /// Forum name
        forum: String,

        /// Search keywords
        query: String,

        /// Result page
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Print one page of a thread as the analyzer sees it
    Show {
        /// Thread id
        tid: u64,

        /// Page number
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Summarize the stances taken across a whole thread
    Analyze {
        /// Thread id
        tid: u64,

        /// Pages per chunk (overrides config)
        #[arg(short = 'k', long)]
        pages_per_chunk: Option<u32>,

        /// Ignore any cached summary and analyze again
        #[arg(long)]
        refresh: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Draft a reply from the thread's stance summary
    Reply {
        /// Thread id
        tid: u64,

        /// Reply mode (a configured persona, or "custom")
        #[arg(long, default_value = "mediator")]
        mode: String,

        /// Viewpoint to argue for (required with --mode custom)
        #[arg(long)]
        viewpoint: Option<String>,

        /// Page whose replies are given as context
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Cached analysis commands
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Prompt template commands
    #[command(subcommand)]
    Prompts(PromptsCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show recently cached analyses
    List {
        /// Number of entries to show
        #[arg(long, default_value = "10")]
        last: u32,
    },

    /// Remove one thread's entry, or everything
    Clear {
        /// Thread id (all entries if omitted)
        tid: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum PromptsCommands {
    /// Show the prompts in use
    Show,

    /// Write the built-in prompts to the prompts directory
    Init {
        /// Overwrite existing prompt files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(path) = &cli.config {
        Config::load_from_file(path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Apply CLI overrides
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(url) = &cli.forum_url {
        config.forum.base_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.gemini.analyzer_model = model.clone();
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }

    init_logging(&config.logging.level);

    Config::ensure_dirs()?;

    match cli.command {
        Commands::Threads { forum, page, sort } => {
            commands::threads::list(config, &forum, page, sort).await
        }
        Commands::Search { forum, query, page } => {
            commands::threads::search(config, &forum, &query, page).await
        }
        Commands::Show { tid, page } => commands::show::run(config, tid, page).await,
        Commands::Analyze {
            tid,
            pages_per_chunk,
            refresh,
            json,
        } => commands::analyze::run(config, tid, pages_per_chunk, refresh, json).await,
        Commands::Reply {
            tid,
            mode,
            viewpoint,
            page,
        } => commands::reply::run(config, tid, mode, viewpoint, page).await,
        Commands::Cache(cmd) => match cmd {
            CacheCommands::List { last } => commands::cache::list(last).await,
            CacheCommands::Clear { tid } => commands::cache::clear(tid).await,
        },
        Commands::Prompts(cmd) => match cmd {
            PromptsCommands::Show => commands::prompts::show(),
            PromptsCommands::Init { force } => commands::prompts::init(force),
        },
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(config),
            ConfigCommands::Init { force } => commands::config::init(force),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from(["stance", "analyze", "8123", "-k", "6", "--refresh"]).unwrap();
        match cli.command {
            Commands::Analyze {
                tid,
                pages_per_chunk,
                refresh,
                json,
            } => {
                assert_eq!(tid, 8123);
                assert_eq!(pages_per_chunk, Some(6));
                assert!(refresh);
                assert!(!json);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_parse_threads_sort() {
        let cli = Cli::try_parse_from(["stance", "threads", "rust", "--sort", "hot"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Threads {
                sort: ThreadSort::Hot,
                page: 1,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["stance", "threads", "rust", "--sort", "newest"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stance",
            "reply",
            "42",
            "--mode",
            "custom",
            "--viewpoint",
            "Tea is better",
            "--no-cache",
            "--model",
            "gemini-2.5-pro",
        ])
        .unwrap();

        assert!(cli.no_cache);
        assert_eq!(cli.model.as_deref(), Some("gemini-2.5-pro"));
        match cli.command {
            Commands::Reply {
                tid,
                mode,
                viewpoint,
                page,
            } => {
                assert_eq!(tid, 42);
                assert_eq!(mode, "custom");
                assert_eq!(viewpoint.as_deref(), Some("Tea is better"));
                assert_eq!(page, 1);
            }
            _ => panic!("expected reply"),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::try_parse_from(["stance", "cache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::Clear { tid: None })
        ));

        let cli = Cli::try_parse_from(["stance", "cache", "clear", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::Clear { tid: Some(7) })
        ));
    }
}
