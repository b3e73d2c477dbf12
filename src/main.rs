use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use qrcache::config::Config;
use qrcache::manifest::Manifest;
use qrcache::net::{Fetch, HttpFetcher};
use qrcache::{GenerationStore, LifecycleController, Phase, Request, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "qrcache")]
#[command(about = "Offline-first asset cache for the QR generator app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/qrcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the built-in manifest as a new generation
  Install,
  /// Promote the installed generation and prune old ones
  Activate,
  /// Install and activate in one step
  Update,
  /// Resolve one request through the cache
  Get {
    /// Resource path relative to the configured origin
    path: String,
    /// Treat the request as a top-level document navigation
    #[arg(long)]
    document: bool,
    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Show stored generations
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let origin = config.origin_url()?;

  let store = Arc::new(match &config.cache_dir {
    Some(dir) => SqliteStore::open(&dir.join("cache.db"))?,
    None => SqliteStore::open_default()?,
  });
  let fetcher = Arc::new(HttpFetcher::new()?);

  let manifest = Manifest::current();
  let mut controller = LifecycleController::resume(
    &manifest,
    &origin,
    Arc::clone(&store),
    fetcher,
    &config.fallback_document,
  )?;

  match args.command {
    Command::Install => install(&mut controller).await,
    Command::Activate => activate(&mut controller),
    Command::Update => {
      install(&mut controller).await?;
      activate(&mut controller)
    }
    Command::Get {
      path,
      document,
      output,
    } => get(&controller, &origin, &path, document, output.as_deref()).await,
    Command::Status => status(store.as_ref()),
  }
}

async fn install<S: GenerationStore, F: Fetch>(
  controller: &mut LifecycleController<S, F>,
) -> Result<()> {
  match controller.phase() {
    Phase::Installing => {
      controller.install().await?;
      println!("installed generation {}", controller.label());
      Ok(())
    }
    _ => {
      println!("generation {} is already installed", controller.label());
      Ok(())
    }
  }
}

fn activate<S: GenerationStore, F: Fetch>(
  controller: &mut LifecycleController<S, F>,
) -> Result<()> {
  match controller.phase() {
    Phase::Waiting => {
      controller.activate()?;
      println!("generation {} is now active", controller.label());
      Ok(())
    }
    Phase::Active => {
      println!("generation {} is already active", controller.label());
      Ok(())
    }
    _ => Err(eyre!(
      "generation {} is not installed yet; run `qrcache install` first",
      controller.label()
    )),
  }
}

async fn get<S: GenerationStore, F: Fetch>(
  controller: &LifecycleController<S, F>,
  origin: &Url,
  path: &str,
  document: bool,
  output: Option<&Path>,
) -> Result<()> {
  let url = origin
    .join(path)
    .map_err(|e| eyre!("Invalid path {}: {}", path, e))?;
  let request = if document {
    Request::navigation(url)
  } else {
    Request::get(url)
  };

  let resolved = controller.intercept(&request).await?;
  eprintln!(
    "{} {} ({:?})",
    resolved.snapshot.status, path, resolved.served_from
  );

  match output {
    Some(file) => std::fs::write(file, &resolved.snapshot.body)?,
    None => std::io::stdout().write_all(&resolved.snapshot.body)?,
  }

  Ok(())
}

fn status(store: &SqliteStore) -> Result<()> {
  let generations = store.describe()?;
  if generations.is_empty() {
    println!("no generations installed");
    return Ok(());
  }

  for info in generations {
    println!(
      "{}  {} entries  created {}",
      info.label,
      info.entries,
      info.created_at.format("%Y-%m-%d %H:%M:%S")
    );
  }

  Ok(())
}
