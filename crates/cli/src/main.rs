//! bloom-cache: inspect and prune the persisted cache stores.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bloom_core::{AppConfig, CacheDb, Error, Request};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bloom-cache")]
#[command(about = "Inspect and prune the bloom offline cache")]
#[command(version)]
struct Args {
    /// Cache database (default: `db_path` from configuration)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stores, oldest first
    Stores,
    /// List the entries of one store
    Entries { store: String },
    /// Show the cached response for a URL
    Show {
        /// Absolute URL or path relative to the configured origin
        url: String,
        /// Look only in this store
        #[arg(short, long)]
        store: Option<String>,
    },
    /// Delete a store and its entries
    Drop { store: String },
    /// Delete every store the current configuration does not retain
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load()?;
    let path = args.db.clone().unwrap_or_else(|| config.db_path.clone());
    let db = CacheDb::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let mut stdout = std::io::stdout().lock();
    execute(&args.command, args.json, &db, &config, &mut stdout).await
}

async fn execute(command: &Command, json: bool, db: &CacheDb, config: &AppConfig, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Stores => {
            let names = db.keys().await?;
            if json {
                writeln!(out, "{}", serde_json::to_string(&names)?)?;
            } else {
                for name in names {
                    let count = db.open_store(&name).await?.entries().await?.len();
                    writeln!(out, "{name}\t{count} entries")?;
                }
            }
        }
        Command::Entries { store } => {
            if !db.has_store(store).await? {
                return Err(Error::StoreNotFound(store.clone()).into());
            }
            let entries = db.open_store(store).await?.entries().await?;
            if json {
                writeln!(out, "{}", serde_json::to_string(&entries)?)?;
            } else {
                for entry in entries {
                    writeln!(out, "{}\t{}\t{}\t{}", entry.status, entry.size, entry.stored_at, entry.url)?;
                }
            }
        }
        Command::Show { url, store } => {
            let request = Request::get(config.resolve(url)?);
            let found = match store {
                Some(name) => db.match_in(name, &request).await?,
                None => db.match_request(&request).await?,
            };
            let Some(response) = found else {
                anyhow::bail!("not cached: {}", request.url);
            };
            if json {
                writeln!(out, "{}", serde_json::to_string(&response)?)?;
            } else {
                writeln!(out, "{} {}", response.status, response.url)?;
                for (name, value) in &response.headers {
                    writeln!(out, "{name}: {value}")?;
                }
                writeln!(out)?;
                writeln!(out, "{}", String::from_utf8_lossy(&response.body))?;
            }
        }
        Command::Drop { store } => {
            if !db.delete_store(store).await? {
                return Err(Error::StoreNotFound(store.clone()).into());
            }
            tracing::info!(store = %store, "dropped");
            writeln!(out, "dropped {store}")?;
        }
        Command::Prune => {
            let deleted = db.retain_stores(&config.cache_names.retained()).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string(&deleted)?)?;
            } else {
                for name in deleted {
                    writeln!(out, "deleted {name}")?;
                }
            }
        }
    }
    Ok(())
}
