//! `argent` — runs the silver-layer flows over a local SQLite store.
//!
//! Reads `argent.toml` (or the path given with `--config`), layered with
//! `ARGENT_*` environment variables.
//!
//! # Usage
//!
//! ```text
//! argent ingest products products.jsonl
//! argent run --once
//! argent show products --key 1
//! argent events --entity sales
//! argent refresh sales
//! ```

use std::{
  io::{BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argent_core::{
  Entity,
  row::parse_bronze_line,
  store::{BronzeLog, SilverStore},
};
use argent_pipeline::{Pipeline, PipelineConfig};
use argent_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Silver-layer ETL over a local bronze log")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "argent.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Process bronze rows into the silver tables.
  Run {
    /// Drain every flow once and exit instead of polling.
    #[arg(long)]
    once:     bool,
    /// Restrict to these flows (repeatable). Overrides the config file.
    #[arg(long = "entity", value_parser = Entity::parse)]
    entities: Vec<Entity>,
  },
  /// Append the rows of a JSON-lines file to an entity's bronze log.
  Ingest {
    #[arg(value_parser = Entity::parse)]
    entity: Entity,
    file:   PathBuf,
  },
  /// Print a silver table as JSON lines.
  Show {
    #[arg(value_parser = Entity::parse)]
    entity: Entity,
    /// Only rows with this surrogate key.
    #[arg(long)]
    key:    Option<i32>,
  },
  /// Print the flow event log, newest first.
  Events {
    #[arg(long, value_parser = Entity::parse)]
    entity: Option<Entity>,
    #[arg(long, default_value_t = 20)]
    limit:  usize,
  },
  /// Clear a silver table and rewind its checkpoint so the next run
  /// reprocesses the full bronze log.
  Refresh {
    #[arg(value_parser = Entity::parse)]
    entity: Entity,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let pipeline_cfg = load_config(&cli.config)?;

  let store_path = expand_tilde(&pipeline_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Run { once, entities } => run(store, pipeline_cfg, once, entities).await,
    Command::Ingest { entity, file } => ingest(&store, entity, &file).await,
    Command::Show { entity, key } => show(&store, entity, key).await,
    Command::Events { entity, limit } => events(&store, entity, limit).await,
    Command::Refresh { entity } => {
      store
        .reset(entity)
        .await
        .with_context(|| format!("failed to refresh {entity}"))?;
      tracing::info!(%entity, "silver table cleared; checkpoint rewound");
      Ok(())
    }
  }
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(
      config::Environment::with_prefix("ARGENT")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("entities"),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise PipelineConfig")
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn run(
  store: SqliteStore,
  mut cfg: PipelineConfig,
  once: bool,
  entities: Vec<Entity>,
) -> anyhow::Result<()> {
  if !entities.is_empty() {
    cfg.entities = entities;
  }
  let pipeline = Pipeline::new(Arc::new(store), cfg).context("invalid configuration")?;

  let report = if once {
    pipeline.run_once().await.context("update failed")?
  } else {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(forward_interrupt(tokio::signal::ctrl_c(), tx));
    pipeline.run_continuous(rx).await.context("update failed")?
  };

  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}

/// Flip `shutdown` once `signal` resolves. A signal that cannot be listened
/// for also stops the pipeline, after logging why.
async fn forward_interrupt<F>(signal: F, shutdown: watch::Sender<bool>)
where
  F: Future<Output = std::io::Result<()>>,
{
  match signal.await {
    Ok(()) => tracing::info!("interrupt received; finishing in-flight batches"),
    Err(e) => tracing::error!(error = %e, "cannot listen for interrupts; stopping"),
  }
  // The pipeline may already have stopped and dropped its receivers.
  shutdown.send(true).ok();
}

async fn ingest(store: &SqliteStore, entity: Entity, file: &Path) -> anyhow::Result<()> {
  let reader = BufReader::new(
    std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?,
  );

  let mut rows = Vec::new();
  for (i, line) in reader.lines().enumerate() {
    let line = line.with_context(|| format!("reading {}", file.display()))?;
    if line.trim().is_empty() {
      continue;
    }
    let row = parse_bronze_line(&line)
      .with_context(|| format!("{}:{}: invalid bronze row", file.display(), i + 1))?;
    rows.push(row);
  }

  let count = rows.len();
  let last = store
    .append(entity, rows)
    .await
    .with_context(|| format!("failed to append to {entity} bronze log"))?;
  tracing::info!(%entity, rows = count, last_offset = last, "ingested");
  Ok(())
}

async fn show(store: &SqliteStore, entity: Entity, key: Option<i32>) -> anyhow::Result<()> {
  let rows = match key {
    Some(k) => store.get(entity, k).await?,
    None => store.scan(entity).await?,
  };

  let mut out = std::io::stdout().lock();
  for row in rows {
    writeln!(out, "{}", row.to_json())?;
  }
  Ok(())
}

async fn events(
  store: &SqliteStore,
  entity: Option<Entity>,
  limit: usize,
) -> anyhow::Result<()> {
  let events = store.events(entity, limit).await?;

  let mut out = std::io::stdout().lock();
  for event in events {
    writeln!(out, "{}", serde_json::to_string(&event)?)?;
  }
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
