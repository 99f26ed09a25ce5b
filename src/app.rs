use crate::api::{ExpenseClient, Fetched, Mutation, Period, TransactionInput, TransactionType};
use crate::cache::{CacheManager, NoopStorage, ResponseStore, ServeSource, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::net::{Method, ReqwestTransport, RequestDescriptor, Transport};
use crate::sync::{
  reachable, Connectivity, ConnectivityObserver, ConnectivityProbe, DrainOutcome, DurableQueue,
  OfflineWriter, SqliteQueue, StatusHandle, SyncStatus, Syncer, UnavailableQueue, WriteOutcome,
};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

type Store = Box<dyn ResponseStore>;

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// GET an arbitrary path through the offline cache
  Get { path: String },
  /// Send a mutation, queueing it if the API is unreachable
  Send {
    /// HTTP method (POST, PUT, DELETE, ...)
    method: String,
    path: String,
    /// JSON request body
    #[arg(long)]
    body: Option<String>,
  },
  /// Show the current balance
  Balance,
  /// List transactions
  Transactions,
  /// List categories
  Categories,
  /// Show income/expense statistics
  Stats {
    #[arg(long, value_enum, default_value_t = Period::Month)]
    period: Period,
  },
  /// Record a new transaction
  AddTransaction {
    description: String,
    #[arg(allow_hyphen_values = true)]
    amount: f64,
    #[arg(long = "type", value_enum, default_value_t = TransactionType::Expense)]
    kind: TransactionType,
    #[arg(long)]
    category: Option<i64>,
    /// Date (YYYY-MM-DD), defaults to today on the server
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Replay pending writes now
  Sync,
  /// Show connectivity and pending-sync status
  Status,
  /// Stay running: sync on reconnect and print status changes
  Watch,
  /// Precache the app shell and evict stale cache versions
  Install,
}

/// Main application state
pub struct App {
  config: Config,
  transport: Arc<dyn Transport>,
  cache: CacheManager<Store>,
  queue: Arc<dyn DurableQueue>,
  status: StatusHandle,
  syncer: Syncer,
  client: ExpenseClient<Store>,
}

impl App {
  /// Build the app. An offline database that cannot be opened is logged and
  /// the app runs without a cache or pending queue.
  pub async fn new(config: Config) -> Result<Self> {
    let db = match Database::open(config.storage.path.as_deref()) {
      Ok(db) => Some(db),
      Err(e) => {
        tracing::error!(error = %e, "offline database unavailable, running without cache or pending queue");
        None
      }
    };
    let transport = Arc::new(ReqwestTransport::new(config.api.timeout())?);
    Self::with_parts(config, db, transport).await
  }

  /// Wire the components around an optional database and a transport.
  pub async fn with_parts(
    config: Config,
    db: Option<Database>,
    transport: Arc<dyn Transport>,
  ) -> Result<Self> {
    let base_url = config.api.base_url()?;

    let storage: Store = match &db {
      Some(db) if config.cache.enabled => Box::new(SqliteStorage::new(db.clone())),
      _ => {
        tracing::info!("response cache disabled");
        Box::new(NoopStorage)
      }
    };
    let cache = CacheManager::new(storage, transport.clone(), base_url.clone(), &config.cache.version)
      .with_static_assets(config.cache.static_assets.clone());

    let queue: Arc<dyn DurableQueue> = match db {
      Some(db) => Arc::new(SqliteQueue::new(db)),
      None => Arc::new(UnavailableQueue::new("offline database unavailable")),
    };
    let status = StatusHandle::restore(queue.as_ref(), true).await;
    let syncer = Syncer::new(queue.clone(), transport.clone(), status.clone());
    let writer = OfflineWriter::new(transport.clone(), queue.clone(), status.clone());
    let client = ExpenseClient::new(base_url, cache.clone(), writer);

    Ok(Self {
      config,
      transport,
      cache,
      queue,
      status,
      syncer,
      client,
    })
  }

  pub fn status(&self) -> SyncStatus {
    self.status.snapshot()
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Get { path } => {
        let (response, source) = self.client.get_raw(&path).await?;
        println!("HTTP {} ({})", response.status, source_label(source));
        println!("{}", response.body_text());
      }
      Command::Send { method, path, body } => {
        let method = Method::from(method);
        if method.is_get() {
          return Err(eyre!("Use `get` for GET requests"));
        }
        match self.client.send_raw(method, &path, body).await? {
          WriteOutcome::Applied(response) => {
            println!("HTTP {}", response.status);
            println!("{}", response.body_text());
          }
          WriteOutcome::Rejected(response) => {
            return Err(eyre!("HTTP {}: {}", response.status, response.body_text()));
          }
          WriteOutcome::Queued(id) => println!("Offline: queued as {}", id),
          WriteOutcome::Dropped(reason) => return Err(eyre!("Could not queue request: {}", reason)),
        }
      }
      Command::Balance => print_fetched(&self.client.balance().await?)?,
      Command::Transactions => print_fetched(&self.client.transactions().await?)?,
      Command::Categories => print_fetched(&self.client.categories().await?)?,
      Command::Stats { period } => print_fetched(&self.client.statistics(period).await?)?,
      Command::AddTransaction {
        description,
        amount,
        kind,
        category,
        date,
        notes,
      } => {
        let input = TransactionInput {
          description,
          amount,
          kind,
          category_id: category,
          date,
          notes,
        };
        match self.client.create_transaction(&input).await? {
          Mutation::Applied(tx) => print_json(&tx)?,
          Mutation::Queued(id) => println!("Offline: transaction queued as {}", id),
        }
      }
      Command::Sync => {
        let outcome = self.sync_now().await?;
        println!("{}", describe_outcome(&outcome));
      }
      Command::Status => self.print_status().await?,
      Command::Watch => self.watch().await?,
      Command::Install => {
        let cached = self.cache.install().await?;
        let evicted = self.cache.activate()?;
        println!(
          "Cached {}/{} assets into {}",
          cached,
          self.config.cache.static_assets.len(),
          self.cache.partitions().static_name
        );
        for name in evicted {
          println!("Deleted stale cache {}", name);
        }
      }
    }
    Ok(())
  }

  /// Check the health endpoint, then drain if the API is reachable.
  ///
  /// Returns `None` when offline, matching the observer's rule that manual
  /// syncs are ignored without connectivity.
  pub async fn sync_now(&self) -> Result<Option<DrainOutcome>> {
    let health = RequestDescriptor::get(self.config.health_url()?);
    let connectivity = reachable(self.transport.as_ref(), &health).await;
    self.status.set_online(connectivity.is_online());

    if !connectivity.is_online() {
      tracing::info!("offline, not syncing");
      return Ok(None);
    }
    Ok(Some(self.syncer.drain().await))
  }

  async fn print_status(&self) -> Result<()> {
    let health = RequestDescriptor::get(self.config.health_url()?);
    let connectivity = reachable(self.transport.as_ref(), &health).await;
    self.status.set_online(connectivity.is_online());
    println!("{}", describe_status(&self.status.snapshot()));

    let entries = match self.queue.entries().await {
      Ok(entries) => entries,
      Err(e) => {
        tracing::error!(error = %e, "failed to read pending queue, treating as empty");
        Vec::new()
      }
    };
    for entry in entries {
      println!(
        "  {}  {} {}  {}",
        entry.id,
        entry.request.method,
        entry.request.path(),
        entry.enqueued_at.format("%Y-%m-%d %H:%M:%S")
      );
    }
    Ok(())
  }

  /// Run the observer and probe until Ctrl-C.
  async fn watch(&self) -> Result<()> {
    for name in self.cache.activate()? {
      tracing::info!(partition = %name, "evicted stale cache partition");
    }

    let (observer, handle) = ConnectivityObserver::new(self.syncer.clone(), Connectivity::Online);
    let observer_task = tokio::spawn(observer.run());
    handle.schedule_startup_sync(self.config.sync.initial_delay());

    let probe = ConnectivityProbe::new(
      self.transport.clone(),
      self.config.health_url()?,
      self.config.sync.probe_interval(),
      handle.clone(),
    );
    let probe_task = tokio::spawn(probe.run());

    let mut updates = self.status.subscribe();
    println!("{}", describe_status(&updates.borrow_and_update()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
      tokio::select! {
        _ = &mut ctrl_c => break,
        changed = updates.changed() => {
          if changed.is_err() {
            break;
          }
          println!("{}", describe_status(&updates.borrow_and_update()));
        }
      }
    }

    probe_task.abort();
    observer_task.abort();

    // Let an in-flight replay finish rather than cutting it off
    while self.syncer.is_running() {
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
  }
}

fn source_label(source: ServeSource) -> &'static str {
  match source {
    ServeSource::Network => "network",
    ServeSource::Cache => "cached",
    ServeSource::OfflineDefault => "offline default",
    ServeSource::Unavailable => "unavailable",
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text = serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to format output: {}", e))?;
  println!("{}", text);
  Ok(())
}

fn print_fetched<T: Serialize>(fetched: &Fetched<T>) -> Result<()> {
  if fetched.source != ServeSource::Network {
    eprintln!("({})", source_label(fetched.source));
  }
  print_json(&fetched.data)
}

fn describe_status(status: &SyncStatus) -> String {
  let last = status
    .last_sync
    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    .unwrap_or_else(|| "never".to_string());
  format!(
    "{}{} | pending: {} | last sync: {}",
    if status.online { "online" } else { "offline" },
    if status.in_progress { " (syncing)" } else { "" },
    status.pending,
    last
  )
}

fn describe_outcome(outcome: &Option<DrainOutcome>) -> String {
  match outcome {
    None => "Offline: nothing synced".to_string(),
    Some(DrainOutcome::AlreadyRunning) => "A sync is already running".to_string(),
    Some(DrainOutcome::Completed { replayed }) => format!("Synced {} pending change(s)", replayed),
    Some(DrainOutcome::Stopped {
      replayed,
      remaining,
      reason,
    }) => format!(
      "Synced {}, stopped with {} still pending: {}",
      replayed, remaining, reason
    ),
  }
}
