use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quote_sync::{
    add_quote, merge_import, push_quote, read_csv, read_json, schedule_store_sync, sync_once,
    write_csv, write_json, Config, HttpRemoteSource, PayloadFormat, PushOutcome, Quote,
    ReconciliationEngine, SqliteStore, Store,
};

#[derive(Parser)]
#[command(name = "quote-sync")]
#[command(about = "Local quote collection with server sync")]
#[command(version)]
struct Cli {
    /// SQLite database holding the local quotes (default: $QUOTE_SYNC_DB or quotes.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Remote endpoint (default: $QUOTE_SYNC_REMOTE_URL)
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Remote payload format: posts | quotes
    #[arg(long, global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a quote locally
    Add { text: String, category: String },

    /// Add a quote locally and post it to the remote
    Push { text: String, category: String },

    /// List quotes, optionally for one category
    List {
        #[arg(long, short = 'c')]
        category: Option<String>,
    },

    /// List distinct categories
    Categories,

    /// Show one random quote
    Random {
        #[arg(long, short = 'c')]
        category: Option<String>,
    },

    /// Import quotes from a .json or .csv file
    Import { file: PathBuf },

    /// Export quotes to a .json or .csv file
    Export { file: PathBuf },

    /// Fetch from the remote once and merge
    Sync,

    /// Sync periodically until Ctrl+C
    Watch {
        /// Interval in milliseconds (default: $QUOTE_SYNC_INTERVAL_MS or 60000)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Show recent sync events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    quote_sync::init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(url) = cli.remote_url {
        config.remote_url = url;
    }
    if let Some(format) = cli.format {
        config.remote_format = PayloadFormat::parse(&format)
            .with_context(|| format!("Unknown remote format {:?}", format))?;
    }

    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    match cli.command {
        Command::Add { text, category } => {
            let quote = Quote::local(&text, &category)?;
            if add_quote(store.as_ref(), quote)? {
                println!("✓ Added quote to {}", category.trim());
            } else {
                println!("⚠️  Quote already exists, nothing added");
            }
        }
        Command::Push { text, category } => {
            let quote = Quote::local(&text, &category)?;
            let source = remote_source(&config)?;
            match push_quote(store.as_ref(), &source, quote).await? {
                PushOutcome::Pushed(remote) => {
                    println!("✓ Added and posted (remote id {:?})", remote.id())
                }
                PushOutcome::LocalOnly(e) => {
                    println!("✓ Added locally");
                    println!("⚠️  Post failed: {}", e);
                }
                PushOutcome::Duplicate => println!("⚠️  Quote already exists, nothing added"),
            }
        }
        Command::List { category } => {
            let set = store.load()?;
            let quotes = set.filter_by_category(category.as_deref());
            for quote in &quotes {
                println!("\"{}\" — {} [{}]", quote.text(), quote.category(), quote.origin().as_str());
            }
            println!("\n{} of {} quotes", quotes.len(), set.len());
        }
        Command::Categories => {
            let set = store.load()?;
            for category in set.categories() {
                let count = set.filter_by_category(Some(category)).len();
                println!("{:<30} {:>5}", category, count);
            }
        }
        Command::Random { category } => {
            let set = store.load()?;
            match set.random_in_category(category.as_deref(), &mut rand::thread_rng()) {
                Some(quote) => println!("\"{}\"\n  — {}", quote.text(), quote.category()),
                None => println!("No quotes available. Add one or run `quote-sync sync`."),
            }
        }
        Command::Import { file } => {
            let imported = match extension(&file)? {
                FileKind::Json => read_json(&file)?,
                FileKind::Csv => read_csv(&file)?,
            };
            let (merged, report) = merge_import(&store.load()?, imported);
            store.save(&merged)?;
            println!("✓ {}", report.summary());
        }
        Command::Export { file } => {
            let set = store.load()?;
            match extension(&file)? {
                FileKind::Json => write_json(&set, &file)?,
                FileKind::Csv => write_csv(&set, &file)?,
            }
            println!("✓ Exported {} quotes to {}", set.len(), file.display());
        }
        Command::Sync => {
            let source = remote_source(&config)?;
            let result = sync_once(store.as_ref(), &source, &ReconciliationEngine::new()).await?;
            println!("✓ {}", result.summary());
            for overwrite in &result.overwrites {
                println!(
                    "  ↻ \"{}\": {} → {}",
                    overwrite.text,
                    overwrite.old.category(),
                    overwrite.new.category()
                );
            }
        }
        Command::Watch { interval_ms } => {
            let every = interval_ms
                .map(Duration::from_millis)
                .unwrap_or(config.sync_interval);
            let source = Arc::new(remote_source(&config)?);

            println!("🔄 Syncing with {} every {:?} (Ctrl+C to stop)", config.remote_url, every);

            let handle = schedule_store_sync(every, store.clone(), source, |outcome| match outcome {
                Ok(result) => println!("✓ {}", result.summary()),
                Err(e) => println!("⚠️  Sync failed, local quotes unchanged: {}", e),
            });

            tokio::signal::ctrl_c().await?;
            handle.shutdown().await;
            println!("\n✅ Sync stopped");
        }
        Command::Events { limit } => {
            for event in store.recent_events(limit)? {
                println!(
                    "{}  {:<14} {:<12} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.actor,
                    event.data
                );
            }
        }
    }

    Ok(())
}

fn remote_source(config: &Config) -> Result<HttpRemoteSource> {
    Ok(HttpRemoteSource::new(
        &config.remote_url,
        config.remote_format,
        config.request_timeout,
    )?)
}

enum FileKind {
    Json,
    Csv,
}

fn extension(path: &Path) -> Result<FileKind> {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "json" => Ok(FileKind::Json),
        Some(ext) if ext == "csv" => Ok(FileKind::Csv),
        _ => bail!("Expected a .json or .csv file, got {}", path.display()),
    }
}
