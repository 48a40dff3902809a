use anyhow::Context;
use chestkeeper::config;
use chestkeeper::db::Db;
use chestkeeper::db::repo::{ItemRepo, ItemRepository};
use chestkeeper::models::item::NewItem;
use clap::Parser;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

// cargo run --bin import-items -- --file ./items_fr.json

#[derive(Debug, Parser)]
#[command(name = "import-items", version, about = "Import or refresh the item catalog from a JSON export")]
struct Args {
    /// JSON file holding `{"items": [...]}` or a bare array of items
    #[arg(long)]
    file: PathBuf,

    /// Override database URL (if omitted, use env/config)
    #[arg(long)]
    database_url: Option<String>,

    /// Number of upserts in flight
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Wrapped { items: Vec<serde_json::Value> },
    List(Vec<serde_json::Value>),
}

impl ImportFile {
    fn into_items(self) -> Vec<serde_json::Value> {
        match self {
            ImportFile::Wrapped { items } | ImportFile::List(items) => items,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let cfg = config::Config::from_env()?;

    // allow overriding the DSN from CLI
    let database_url = args
        .database_url
        .or(cfg.database_url)
        .context("no database: pass --database-url or set DATABASE_URL")?;

    let db = Arc::new(Db::new(&database_url)?);
    db.init().await.context("running migrations")?;
    let repo = ItemRepository::new(db);

    let raw = std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let file: ImportFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", args.file.display()))?;

    let mut skipped = 0usize;
    let mut items = Vec::new();
    for (idx, value) in file.into_items().into_iter().enumerate() {
        match serde_json::from_value::<NewItem>(value) {
            Ok(item) if !item.name.trim().is_empty() => items.push(item),
            Ok(_) => {
                tracing::warn!(idx, "item without a name, skipped");
                skipped += 1;
            }
            Err(e) => {
                tracing::warn!(idx, error = %e, "malformed item, skipped");
                skipped += 1;
            }
        }
    }

    let total = items.len();
    let results: Vec<_> = futures::stream::iter(items)
        .map(|item| {
            let repo = &repo;
            async move {
                let name = item.name.clone();
                repo.upsert(item).await.map_err(|e| (name, e))
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let mut upserted = 0usize;
    for result in results {
        match result {
            Ok(_) => upserted += 1,
            Err((name, e)) => tracing::error!(item = %name, error = %e, "upsert failed"),
        }
    }

    tracing::info!(total, upserted, skipped, failed = total - upserted, "import finished");
    println!("✅ Imported {upserted}/{total} items ({skipped} skipped)");

    if upserted < total {
        anyhow::bail!("{} items could not be imported", total - upserted);
    }
    Ok(())
}
