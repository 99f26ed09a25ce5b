use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use spese_sync::app::{App, Command};
use spese_sync::config::Config;
use spese_sync::db::Database;
use spese_sync::logging;

#[derive(Parser, Debug)]
#[command(name = "spese")]
#[command(about = "Offline cache and pending-sync agent for the spese expense tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/spese-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Logs live next to the database
  let db_path = match &config.storage.path {
    Some(path) => path.clone(),
    None => Database::default_path()?,
  };
  let log_dir = db_path
    .parent()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."));
  let log_dir = match std::fs::create_dir_all(&log_dir) {
    Ok(()) => log_dir,
    Err(e) => {
      eprintln!("Cannot create {}: {}, logging to the temp dir", log_dir.display(), e);
      std::env::temp_dir()
    }
  };
  logging::init(&log_dir, args.verbose);

  let app = App::new(config).await?;
  app.run(args.command).await?;

  Ok(())
}
