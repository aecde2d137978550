//! `plainmed`: command-line client for a plainmed server.
//!
//! # Usage
//!
//! ```
//! plainmed search asthma --language Spanish -n 3
//! plainmed --user-id 6f1c3f5e-... personal-info set --age-range 25-34 --gender female --language English
//! plainmed --config ~/.config/plainmed/config.toml conditions add C0004096 Asthma
//! ```
//!
//! Every command prints the server's answer as JSON on stdout.

mod client;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use plainmed_core::survey::{Condition, PersonalInfo};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "plainmed", about = "Command-line client for the plainmed health-record API")]
struct Args {
  /// Path to a TOML config file (url, user_id, token).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the plainmed server (default: http://localhost:3000).
  #[arg(long, env = "PLAINMED_URL")]
  url: Option<String>,

  /// Account whose records are read or written.
  #[arg(long, env = "PLAINMED_USER_ID")]
  user_id: Option<Uuid>,

  /// Session token, when the server gates user routes.
  #[arg(long, env = "PLAINMED_TOKEN")]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search reference topics by title.
  Search {
    query:     String,
    #[arg(short, long)]
    language:  Option<String>,
    /// Maximum number of results.
    #[arg(short = 'n', long)]
    n_results: Option<u32>,
  },
  /// Show one reference topic in full.
  Topic { topic_id: i64 },
  /// List the languages reference topics exist in.
  Languages,
  /// Create the empty survey records for the account.
  Init {
    #[arg(long)]
    email: Option<String>,
  },
  /// Read or answer the personal-info survey.
  #[command(subcommand)]
  PersonalInfo(PersonalInfoCommand),
  /// Manage the conditions in the medical history.
  #[command(subcommand)]
  Conditions(ConditionsCommand),
}

#[derive(Subcommand, Debug)]
enum PersonalInfoCommand {
  Show,
  Set {
    #[arg(long)]
    age_range: String,
    #[arg(long)]
    gender:    String,
    #[arg(long)]
    language:  String,
  },
}

#[derive(Subcommand, Debug)]
enum ConditionsCommand {
  List,
  Add {
    concept_id: String,
    name:       String,
    /// Spanish name, if known.
    #[arg(long)]
    name_es:    Option<String>,
  },
  Remove {
    concept_id: String,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:     String,
  #[serde(default)]
  user_id: Option<Uuid>,
  #[serde(default)]
  token:   String,
}

/// Settings after flags, environment, and config file are merged.
#[derive(Debug)]
struct Settings {
  api:     ApiConfig,
  user_id: Option<Uuid>,
}

impl Settings {
  /// CLI flags override the config file, which overrides defaults.
  fn merge(args: &Args, file: ConfigFile) -> Self {
    let non_empty = |s: String| (!s.is_empty()).then_some(s);
    Settings {
      api:     ApiConfig {
        base_url: args
          .url
          .clone()
          .or_else(|| non_empty(file.url))
          .unwrap_or_else(|| "http://localhost:3000".to_string()),
        token:    args.token.clone().or_else(|| non_empty(file.token)),
      },
      user_id: args.user_id.or(file.user_id),
    }
  }

  fn user_id(&self) -> Result<Uuid> {
    match self.user_id {
      Some(id) => Ok(id),
      None => bail!("this command needs --user-id (or PLAINMED_USER_ID, or user_id in the config file)"),
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  let settings = Settings::merge(&args, file_cfg);
  let api = ApiClient::new(settings.api.clone())?;

  match args.command {
    Command::Search { query, language, n_results } => {
      print(&api.search(&query, language.as_deref(), n_results).await?)
    }
    Command::Topic { topic_id } => print(&api.topic(topic_id).await?),
    Command::Languages => print(&api.languages().await?),
    Command::Init { email } => {
      print(&api.initialize(settings.user_id()?, email.as_deref()).await?)
    }
    Command::PersonalInfo(PersonalInfoCommand::Show) => {
      print(&api.personal_info(settings.user_id()?).await?)
    }
    Command::PersonalInfo(PersonalInfoCommand::Set { age_range, gender, language }) => {
      let info = PersonalInfo { age_range, gender, language };
      print(&api.save_personal_info(settings.user_id()?, &info).await?)
    }
    Command::Conditions(ConditionsCommand::List) => {
      print(&api.conditions(settings.user_id()?).await?)
    }
    Command::Conditions(ConditionsCommand::Add { concept_id, name, name_es }) => {
      let condition = Condition { name_es, ..Condition::new(concept_id, name) };
      print(&api.add_conditions(settings.user_id()?, &[condition]).await?)
    }
    Command::Conditions(ConditionsCommand::Remove { concept_id }) => {
      print(&api.remove_condition(settings.user_id()?, &concept_id).await?)
    }
  }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["plainmed"];
    argv.extend_from_slice(extra);
    argv.push("languages");
    Args::try_parse_from(argv).unwrap()
  }

  #[test]
  fn flags_override_config_file() {
    let file: ConfigFile = toml::from_str(
      r#"
        url     = "https://health.example.org"
        user_id = "6f1c3f5e-2f7b-4c55-9d0e-6c3f1f0e9a11"
        token   = "from-file"
      "#,
    )
    .unwrap();

    let s = Settings::merge(&args(&["--token", "from-flag"]), file);
    assert_eq!(s.api.base_url, "https://health.example.org");
    assert_eq!(s.api.token.as_deref(), Some("from-flag"));
    assert_eq!(s.user_id().unwrap().to_string(), "6f1c3f5e-2f7b-4c55-9d0e-6c3f1f0e9a11");
  }

  #[test]
  fn defaults_without_config() {
    let s = Settings::merge(&args(&["--url", "http://127.0.0.1:9000"]), ConfigFile::default());
    assert_eq!(s.api.base_url, "http://127.0.0.1:9000");
    assert_eq!(s.api.token, None);
    assert!(s.user_id().is_err());
  }
}
