use anyhow::Result;
use clap::{Parser, Subcommand};
use siteseek_cli::{default_cache_dir, load_config, load_page};
use siteseek_core::{IndexEntry, SearchOutcome};
use siteseek_local::site_index::IndexState;
use siteseek_local::{Assistant, FsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "siteseek")]
#[command(about = "Search a page, its site index, or the site's own search API", long_about = None)]
struct Cli {
    /// Page to search: an http(s) URL, or a local HTML file.
    #[arg(long, global = true, env = "SITESEEK_PAGE")]
    page: Option<String>,
    /// Page URL (required for a local file; overrides the fetched URL otherwise).
    #[arg(long, global = true)]
    url: Option<String>,
    /// JSON config layer. Repeatable; later files win.
    #[arg(long = "config", global = true)]
    configs: Vec<PathBuf>,
    /// Where the site index is persisted (default: the per-user cache dir).
    #[arg(long, global = true, env = "SITESEEK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a query through the provider chain.
    Search {
        query: String,
    },
    /// Build the page index and list its sections.
    Index,
    /// Force a crawl of the site and list the indexed pages.
    Crawl,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

fn print_outcome(outcome: &SearchOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    if outcome.results.is_empty() {
        println!("no results");
        return Ok(());
    }
    println!("results from {}:", outcome.provider_label);
    for (i, r) in outcome.results.iter().enumerate() {
        println!("{}. {}", i + 1, r.title);
        if !r.url.is_empty() {
            println!("   {}", r.url);
        }
        if !r.snippet.is_empty() {
            println!("   {}", r.snippet);
        }
    }
    Ok(())
}

fn print_entries(entries: &[IndexEntry], json: bool) -> Result<()> {
    if json {
        let stored: Vec<_> = entries.iter().map(IndexEntry::to_stored).collect();
        println!("{}", serde_json::to_string_pretty(&stored)?);
        return Ok(());
    }
    println!("{} entries", entries.len());
    for e in entries {
        println!("- {} <{}>", e.title, e.url);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli.configs)?;
    let Some(page_arg) = cli.page.as_deref() else {
        anyhow::bail!("--page is required");
    };
    let page = load_page(page_arg, cli.url.as_deref(), &config).await?;
    let cache_dir = cli.cache_dir.clone().unwrap_or_else(default_cache_dir);
    debug!(page = %page.url, cache_dir = %cache_dir.display(), "loaded page");

    let assistant = Assistant::new(config, page, Arc::new(FsStore::new(cache_dir)));
    assistant.initialize()?;

    match cli.command {
        Commands::Search { query } => {
            let outcome = assistant.search(&query).await?;
            info!(provider = %outcome.provider_name, results = outcome.results.len(), "search done");
            print_outcome(&outcome, cli.json)?;
            // A stale cache refreshes in the background; let it land before exit.
            let site_index = assistant.site_index()?;
            if site_index.state() == IndexState::Refreshing {
                debug!("waiting for site index refresh");
            }
            site_index.settled().await;
        }
        Commands::Index => {
            let entries = assistant.page_index()?.entries();
            print_entries(&entries, cli.json)?;
        }
        Commands::Crawl => {
            let entries = assistant.refresh_site_index().await?;
            print_entries(&entries, cli.json)?;
        }
    }
    Ok(())
}
