//! plainmed-server binary.
//!
//! Reads `plainmed.toml` (or the path given with `--config`), opens the
//! configured store, and serves the JSON API over HTTP.
//!
//! # Loading reference topics
//!
//! The local SQLite backend starts with an empty topic table. Load a JSON
//! array of topics once before serving:
//!
//! ```
//! cargo run -p plainmed-server -- --import-topics medlineplus.json
//! ```
//!
//! # Static session tokens
//!
//! `auth.mode = "static"` compares bearer tokens by SHA-256 digest. Print the
//! digest for a token read from stdin with:
//!
//! ```
//! cargo run -p plainmed-server -- --hash-token
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use clap::Parser;
use plainmed_core::topic::MedicalTopic;
use plainmed_server::{ServerConfig, SessionGate, StoreSettings, auth::hash_token};
use plainmed_store_postgrest::PostgrestStore;
use plainmed_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "plainmed health-record server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "plainmed.toml")]
  config: PathBuf,

  /// Load reference topics from a JSON array file into the SQLite store and
  /// exit.
  #[arg(long, value_name = "FILE")]
  import_topics: Option<PathBuf>,

  /// Print the SHA-256 digest of a token entered on stdin and exit.
  #[arg(long)]
  hash_token: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_token {
    let token = read_token()?;
    println!("{}", hash_token(&token));
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(
      config::Environment::with_prefix("PLAINMED")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let app = match &server_cfg.store {
    StoreSettings::Sqlite { path } => {
      let store_path = expand_tilde(path);
      let store = SqliteStore::open(&store_path)
        .await
        .with_context(|| format!("failed to open store at {store_path:?}"))?;

      if let Some(file) = &cli.import_topics {
        let n = import_topics(&store, file).await?;
        tracing::info!(count = n, path = ?file, "topics imported");
        return Ok(());
      }

      let gate = SessionGate::from_settings(&server_cfg.auth, None)?;
      tracing::info!(path = ?store_path, "using sqlite store");
      plainmed_server::router(Arc::new(store), gate)
    }
    StoreSettings::Supabase { url, .. } => {
      if cli.import_topics.is_some() {
        bail!("--import-topics only applies to the sqlite backend");
      }
      let Some(pg) = server_cfg.store.postgrest() else {
        bail!("supabase backend selected without connection settings");
      };
      let store = PostgrestStore::new(&pg).context("failed to build supabase client")?;
      let gate = SessionGate::from_settings(&server_cfg.auth, Some(&store))?;
      tracing::info!(%url, "using supabase store");
      plainmed_server::router(Arc::new(store), gate)
    }
  };

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn import_topics(store: &SqliteStore, file: &Path) -> anyhow::Result<usize> {
  let raw = tokio::fs::read(file)
    .await
    .with_context(|| format!("failed to read {file:?}"))?;
  let topics: Vec<MedicalTopic> =
    serde_json::from_slice(&raw).with_context(|| format!("{file:?} is not a topic array"))?;
  Ok(store.import_topics(topics).await?)
}

/// Read one token line from stdin.
fn read_token() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  eprint!("Token: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
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
