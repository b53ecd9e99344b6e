// 🔄 Sync Orchestration - fetch, reconcile, persist, repeat until cancelled
//
// Cycles are strictly serialized: the next fetch does not start until the
// previous callback has returned. Cancelling never interrupts a cycle that
// is already running; it only prevents the next one from being dispatched.

use crate::quote::{Quote, RecordSet};
use crate::reconciliation::{MergeResult, ReconciliationEngine};
use crate::remote::{fetch_remote, FetchError, RemoteSource};
use crate::store::{Store, SyncEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a `schedule_sync` callback receives after each attempt
pub type SyncOutcome = Result<MergeResult, FetchError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

// ============================================================================
// SINGLE CYCLE (store-backed)
// ============================================================================

/// Load, fetch, reconcile, and save when something changed.
///
/// A fetch failure returns before anything is written.
pub async fn sync_once(
    store: &dyn Store,
    source: &dyn RemoteSource,
    engine: &ReconciliationEngine,
) -> Result<MergeResult, SyncError> {
    let local = store.load().map_err(SyncError::Store)?;

    let remote = match fetch_remote(source).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(source = source.name(), "sync fetch failed, local quotes untouched: {}", e);
            return Err(e.into());
        }
    };

    let result = engine.reconcile(&local, &remote);

    if result.had_changes {
        store.save(&result.merged).map_err(SyncError::Store)?;
        store
            .record_event(&SyncEvent::new(
                "sync_merged",
                serde_json::json!({
                    "source": source.name(),
                    "additions": result.additions.len(),
                    "overwrites": result.overwrites.iter().map(|o| &o.text).collect::<Vec<_>>(),
                    "total": result.merged.len(),
                }),
                "sync",
            ))
            .map_err(SyncError::Store)?;
        info!("{}", result.summary());
    } else {
        debug!(total = result.merged.len(), "sync found no changes");
    }

    Ok(result)
}

/// Add a quote to the local set. Returns false when the text already exists.
pub fn add_quote(store: &dyn Store, quote: Quote) -> anyhow::Result<bool> {
    let mut local = store.load()?;
    let text = quote.text().to_string();

    if !local.insert(quote) {
        debug!(text = %text, "quote already present, not added");
        return Ok(false);
    }

    store.save(&local)?;
    store.record_event(&SyncEvent::new(
        "quote_added",
        serde_json::json!({ "text": text }),
        "local",
    ))?;
    Ok(true)
}

#[derive(Debug)]
pub enum PushOutcome {
    /// Saved locally and accepted upstream
    Pushed(Quote),

    /// Saved locally; the upstream post failed and can be retried by the next sync
    LocalOnly(FetchError),

    /// Text already present locally; nothing saved or posted
    Duplicate,
}

/// Push-on-add: save locally first, then post upstream.
pub async fn push_quote(
    store: &dyn Store,
    source: &dyn RemoteSource,
    quote: Quote,
) -> Result<PushOutcome, SyncError> {
    if !add_quote(store, quote.clone()).map_err(SyncError::Store)? {
        return Ok(PushOutcome::Duplicate);
    }

    match source.post(&quote).await {
        Ok(accepted) => {
            info!(text = accepted.text(), id = ?accepted.id(), "quote pushed to remote");
            Ok(PushOutcome::Pushed(accepted))
        }
        Err(e) => {
            warn!(text = quote.text(), "quote kept locally, push failed: {}", e);
            Ok(PushOutcome::LocalOnly(e))
        }
    }
}

// ============================================================================
// SCHEDULED SYNC
// ============================================================================

/// Handle to a running sync loop. Dropping it cancels the loop.
pub struct SyncHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop dispatching new cycles. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Cancel and wait for any in-flight cycle to finish
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            warn!("sync task ended abnormally: {}", e);
        }
    }
}

#[async_trait]
trait Cycle: Send {
    async fn run(&mut self, number: u64);
}

struct SnapshotCycle<L, F> {
    source: Arc<dyn RemoteSource>,
    engine: ReconciliationEngine,
    local: L,
    on_result: F,
}

#[async_trait]
impl<L, F> Cycle for SnapshotCycle<L, F>
where
    L: FnMut() -> RecordSet + Send,
    F: FnMut(SyncOutcome) + Send,
{
    async fn run(&mut self, number: u64) {
        let local = (self.local)();
        let outcome = fetch_remote(self.source.as_ref())
            .await
            .map(|remote| self.engine.reconcile(&local, &remote));

        match &outcome {
            Ok(result) => debug!(cycle = number, "{}", result.summary()),
            Err(e) => warn!(cycle = number, "sync cycle failed: {}", e),
        }

        (self.on_result)(outcome);
    }
}

struct StoreCycle<F> {
    store: Arc<dyn Store>,
    source: Arc<dyn RemoteSource>,
    engine: ReconciliationEngine,
    on_result: F,
}

#[async_trait]
impl<F> Cycle for StoreCycle<F>
where
    F: FnMut(Result<MergeResult, SyncError>) + Send,
{
    async fn run(&mut self, number: u64) {
        debug!(cycle = number, "store sync cycle starting");
        let outcome = sync_once(self.store.as_ref(), self.source.as_ref(), &self.engine).await;
        (self.on_result)(outcome);
    }
}

/// Repeatedly fetch from `source` and reconcile against the snapshot
/// returned by `local`, handing every outcome to `on_result`.
///
/// The first cycle runs immediately. Must be called inside a tokio runtime.
pub fn schedule_sync<L, F>(
    every: Duration,
    source: Arc<dyn RemoteSource>,
    local: L,
    on_result: F,
) -> SyncHandle
where
    L: FnMut() -> RecordSet + Send + 'static,
    F: FnMut(SyncOutcome) + Send + 'static,
{
    spawn_loop(
        every,
        Box::new(SnapshotCycle {
            source,
            engine: ReconciliationEngine::new(),
            local,
            on_result,
        }),
    )
}

/// Like `schedule_sync`, but each cycle is a full `sync_once` against `store`.
pub fn schedule_store_sync<F>(
    every: Duration,
    store: Arc<dyn Store>,
    source: Arc<dyn RemoteSource>,
    on_result: F,
) -> SyncHandle
where
    F: FnMut(Result<MergeResult, SyncError>) + Send + 'static,
{
    spawn_loop(
        every,
        Box::new(StoreCycle {
            store,
            source,
            engine: ReconciliationEngine::new(),
            on_result,
        }),
    )
}

fn spawn_loop(every: Duration, mut cycle: Box<dyn Cycle>) -> SyncHandle {
    let (cancel, mut cancelled) = watch::channel(false);
    // tokio's interval panics on a zero period
    let period = every.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut number: u64 = 0;

        info!(period_ms = period.as_millis() as u64, "sync loop started");

        loop {
            tokio::select! {
                biased;
                changed = cancelled.changed() => {
                    // Err means the handle was dropped
                    if changed.is_err() || *cancelled.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if *cancelled.borrow() {
                break;
            }

            number += 1;
            cycle.run(number).await;
        }

        info!(cycles = number, "sync loop stopped");
    });

    SyncHandle { cancel, task }
}

// ============================================================================
// TESTS
// ============================================================================
