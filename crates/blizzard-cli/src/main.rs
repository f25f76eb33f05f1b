//! `blizzard`: load e-filed tax returns into SQLite.
//!
//! # Usage
//!
//! ```
//! blizzard init
//! blizzard process ./filings --workers 8
//! blizzard process a.xml b.xml --stop-on-error --json
//! blizzard check
//! ```
//!
//! Settings come from `config.toml` (or `--config`), then `BLIZZARD_*`
//! environment variables (`BLIZZARD_POOL__PATH` for nested keys), then flags.

mod report;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::Context as _;
use blizzard_etl::{Concordance, EtlConfig, InputDocument, Orchestrator, Pipeline};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Blizzard tax filing loader")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the database schema and exit.
  Init,

  /// Load filings from XML files or directories of them.
  Process {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Worker tasks; overrides `worker_count`.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Stop dispatching after the first failed document.
    #[arg(long)]
    stop_on_error: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
  },

  /// Print row counts for every table.
  Check {
    #[arg(long)]
    json: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut config = load_config(&cli.config)?;

  if let Command::Process { workers, stop_on_error, .. } = &cli.command {
    if let Some(workers) = workers {
      config.worker_count = *workers;
    }
    if *stop_on_error {
      config.continue_on_error = false;
    }
  }
  config.validate().context("invalid configuration")?;

  let store = config
    .open_store()
    .await
    .with_context(|| format!("failed to open store at {:?}", config.pool.path))?;

  let code = match cli.command {
    Command::Init => {
      tracing::info!(path = ?config.pool.path, "schema ready");
      ExitCode::SUCCESS
    }
    Command::Check { json } => {
      let counts = store.table_counts().await.context("failed to count rows")?;
      if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
      } else {
        print!("{}", report::render_counts(&counts));
      }
      ExitCode::SUCCESS
    }
    Command::Process { paths, json, .. } => {
      let files = collect_xml_files(&paths)?;
      tracing::info!(files = files.len(), "collected input files");

      let pipeline = match &config.concordance {
        Some(path) => {
          let concordance = Concordance::from_path(path)
            .with_context(|| format!("failed to read concordance {}", path.display()))?;
          Pipeline::seeded(store.clone(), config.detector, &concordance).await
        }
        None => Pipeline::open(store.clone(), config.detector).await,
      }
      .context("failed to load field definitions")?;
      let orchestrator = Orchestrator::new(pipeline, config.clone());

      let handle = orchestrator.shutdown_handle();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          tracing::warn!("interrupted, finishing in-flight documents");
          handle.shutdown();
        }
      });

      let report = orchestrator
        .run(files.into_iter().map(InputDocument::file).collect())
        .await;

      if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
      } else {
        print!("{}", report::render_report(&report));
      }
      if report.failed() > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
    }
  };

  store.close();
  Ok(code)
}

/// Layer the optional config file and the environment over the defaults.
fn load_config(path: &Path) -> anyhow::Result<EtlConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("BLIZZARD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut config: EtlConfig = settings
    .try_deserialize()
    .context("failed to deserialise EtlConfig")?;
  config.pool.path = expand_tilde(&config.pool.path);
  config.concordance = config.concordance.as_deref().map(expand_tilde);
  Ok(config)
}

/// Expand files and directories (recursively) into `*.xml` files, sorted
/// within each directory.
fn collect_xml_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  for path in paths {
    if path.is_dir() {
      walk(path, &mut files)?;
    } else {
      files.push(path.clone());
    }
  }
  Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
  let mut entries = std::fs::read_dir(dir)
    .with_context(|| format!("reading directory {}", dir.display()))?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("reading directory {}", dir.display()))?;
  entries.sort();

  for path in entries {
    if path.is_dir() {
      walk(&path, files)?;
    } else if path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
    {
      files.push(path);
    }
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
