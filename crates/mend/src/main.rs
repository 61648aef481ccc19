use anyhow::Context;
use clap::{Parser, Subcommand};
use mend_engine::config::{ConfigLoader, MendConfig};
use mend_engine::{DomSnapshot, SelectorCache, SelectorHealer};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mend", version, about = "Selector healing and cache maintenance")]
struct Args {
    /// Config file (defaults to ./mend.yaml, then ~/.mend/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Selector cache file, overriding the configured path
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show selector cache statistics
    Stats,
    /// Remove expired cache entries
    Prune,
    /// Remove every cache entry
    Clear,
    /// Heal a selector against a saved page
    Heal {
        /// Saved page: HTML, or a JSON DOM snapshot when the file ends in .json
        #[arg(long)]
        html: PathBuf,
        /// Selector that no longer matches
        #[arg(long)]
        selector: String,
        /// Intended action, e.g. "click submit"
        #[arg(long)]
        hint: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Skip the AI resolver
        #[arg(long)]
        no_ai: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries results only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if let Some(path) = args.cache {
        config.cache.path = path;
    }
    debug!("Selector cache at {}", config.cache.path.display());

    match args.command {
        Command::Stats => {
            let stats = open_cache(&config).stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Prune => {
            let removed = open_cache(&config).clear_expired().await;
            println!("Removed {} expired entries", removed);
        }
        Command::Clear => {
            open_cache(&config).clear_all().await;
            println!("Cleared {}", config.cache.path.display());
        }
        Command::Heal {
            html,
            selector,
            hint,
            url,
            title,
            no_ai,
        } => {
            if no_ai {
                config.healing.ai_enabled = false;
            }
            let dom = load_page(&html).await?;
            let mut healer = SelectorHealer::from_config(&config);
            let healed = healer
                .heal_selector(&dom, &selector, &hint, &url, &title)
                .await;
            println!("{}", healed);
        }
    }

    Ok(())
}

fn open_cache(config: &MendConfig) -> SelectorCache {
    SelectorCache::open(config.cache.path.clone(), config.cache.ttl_days)
}

async fn load_page(path: &Path) -> anyhow::Result<DomSnapshot> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing DOM snapshot {}", path.display()))
    } else {
        Ok(DomSnapshot::from_html(&content))
    }
}
