//! Logging setup: a log file in the data directory, plus stderr when verbose.

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging.
///
/// The file layer always writes `spese-sync.log` under `log_dir`. The stderr
/// layer is only added when `verbose` is set, so command output on stdout
/// stays clean. Both layers honour RUST_LOG and default to "info".
pub fn init(log_dir: &Path, verbose: bool) {
  let file_appender = tracing_appender::rolling::never(log_dir, "spese-sync.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let stderr_layer = verbose.then(|| {
    tracing_subscriber::fmt::layer()
      .with_writer(std::io::stderr)
      .with_filter(env_filter())
  });

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter()),
    )
    .with(stderr_layer)
    .init();

  // Keep guard alive for the program lifetime
  std::mem::forget(guard);
}
