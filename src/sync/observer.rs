//! Connectivity state machine that decides when to drain.

use std::time::Duration;
use tokio::sync::mpsc;

use super::drain::{DrainOutcome, Syncer};

/// Network reachability as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

impl Connectivity {
  pub fn from_online(online: bool) -> Self {
    if online {
      Connectivity::Online
    } else {
      Connectivity::Offline
    }
  }

  pub fn is_online(self) -> bool {
    self == Connectivity::Online
  }
}

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  Reconnect,
  Startup,
  Manual,
}

#[derive(Debug)]
enum ObserverEvent {
  Connectivity(Connectivity),
  SyncRequested(Trigger),
}

/// Cheap handle used to feed the observer.
#[derive(Clone)]
pub struct ObserverHandle {
  tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl ObserverHandle {
  /// Report the current connectivity. Repeats of the current state are ignored.
  pub fn report(&self, connectivity: Connectivity) {
    let _ = self.tx.send(ObserverEvent::Connectivity(connectivity));
  }

  /// Ask for a drain now (settings "sync now" action).
  pub fn request_sync(&self) {
    let _ = self.tx.send(ObserverEvent::SyncRequested(Trigger::Manual));
  }

  /// Request one drain after `delay`, so startup work can settle first.
  pub fn schedule_startup_sync(&self, delay: Duration) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = tx.send(ObserverEvent::SyncRequested(Trigger::Startup));
    });
  }
}

/// Event loop owning connectivity state.
///
/// - Offline -> Online starts a drain.
/// - Online -> Offline only updates status.
/// - A trigger while a drain runs schedules exactly one follow-up pass.
/// - Triggers while offline are ignored.
pub struct ConnectivityObserver {
  syncer: Syncer,
  state: Connectivity,
  draining: bool,
  rerun: Option<Trigger>,
  events: mpsc::UnboundedReceiver<ObserverEvent>,
  finished_tx: mpsc::UnboundedSender<DrainOutcome>,
  finished_rx: mpsc::UnboundedReceiver<DrainOutcome>,
}

impl ConnectivityObserver {
  pub fn new(syncer: Syncer, initial: Connectivity) -> (Self, ObserverHandle) {
    let (tx, events) = mpsc::unbounded_channel();
    let (finished_tx, finished_rx) = mpsc::unbounded_channel();
    syncer.status().set_online(initial.is_online());

    let observer = Self {
      syncer,
      state: initial,
      draining: false,
      rerun: None,
      events,
      finished_tx,
      finished_rx,
    };
    (observer, ObserverHandle { tx })
  }

  /// Run until every [`ObserverHandle`] is dropped. A drain in flight at that
  /// point still runs to completion on its own task.
  pub async fn run(mut self) {
    loop {
      tokio::select! {
        event = self.events.recv() => match event {
          Some(event) => self.handle(event),
          None => break,
        },
        Some(outcome) = self.finished_rx.recv() => self.on_drain_finished(outcome),
      }
    }
    tracing::debug!("connectivity observer stopped");
  }

  fn handle(&mut self, event: ObserverEvent) {
    match event {
      ObserverEvent::Connectivity(next) => {
        if next == self.state {
          return;
        }
        tracing::info!(from = ?self.state, to = ?next, "connectivity changed");
        self.state = next;
        self.syncer.status().set_online(next.is_online());
        if next.is_online() {
          self.trigger(Trigger::Reconnect);
        }
      }
      ObserverEvent::SyncRequested(trigger) => self.trigger(trigger),
    }
  }

  fn trigger(&mut self, trigger: Trigger) {
    if !self.state.is_online() {
      tracing::info!(?trigger, "offline, not draining");
      return;
    }
    if self.draining {
      tracing::debug!(?trigger, "drain in flight, scheduling follow-up");
      self.rerun = Some(trigger);
      return;
    }

    tracing::debug!(?trigger, "starting drain");
    self.draining = true;
    let syncer = self.syncer.clone();
    let finished = self.finished_tx.clone();
    tokio::spawn(async move {
      let outcome = syncer.drain().await;
      let _ = finished.send(outcome);
    });
  }

  fn on_drain_finished(&mut self, outcome: DrainOutcome) {
    tracing::debug!(?outcome, "drain finished");
    self.draining = false;
    if let Some(trigger) = self.rerun.take() {
      self.trigger(trigger);
    }
  }
}
