//! Sync orchestrator
//!
//! The [`SyncEngine`] ties the collectors and the executor together around
//! one synchronized root:
//!
//! ```text
//!              ┌────────────┐   notify    ┌────────────┐
//!   journal ──►│ watch loop │────────────►│ drain loop │──► executor
//!   deltas  ──►│ (poll)     │             │ (pop next) │
//!              └────────────┘             └────────────┘
//!                    ▲                          ▲
//!                one-shot build (rescan + full remote listing)
//! ```
//!
//! `start()` spawns the watch and drain loops on a shared cancellation
//! token; `run_once()` is the synchronous variant used by one-shot callers
//! and tests: build if needed, collect once, drain once, no watching.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docsync_core::config::{IgnoreList, SyncConfig};
use docsync_core::ports::{
    IChangeJournal, IConflictArbiter, IDocumentStore, IItemCatalog, ILocalFileSystem,
};

use crate::executor::OperationExecutor;
use crate::journal::JournalCollector;
use crate::remote::DeltaCollector;
use crate::scan::RescanCollector;

/// How long `stop()` waits for the loops before aborting them
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Orchestrator for one synchronized root
pub struct SyncEngine {
    catalog: Arc<dyn IItemCatalog>,
    store: Arc<dyn IDocumentStore>,
    journal: Arc<dyn IChangeJournal>,
    filesystem: Arc<dyn ILocalFileSystem>,
    arbiter: Option<Arc<dyn IConflictArbiter>>,
    config: SyncConfig,
    root: PathBuf,
    cancel: CancellationToken,
    /// Preempts the watch loop's poll interval
    wake: Notify,
    /// Wakes the drain loop after a collection recorded changes
    drain_signal: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Creates an engine for the given root
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate.
    pub fn new(
        catalog: Arc<dyn IItemCatalog>,
        store: Arc<dyn IDocumentStore>,
        journal: Arc<dyn IChangeJournal>,
        filesystem: Arc<dyn ILocalFileSystem>,
        arbiter: Option<Arc<dyn IConflictArbiter>>,
        config: SyncConfig,
        root: PathBuf,
    ) -> anyhow::Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("Invalid configuration: {joined}");
        }

        Ok(Self {
            catalog,
            store,
            journal,
            filesystem,
            arbiter,
            config,
            root,
            cancel: CancellationToken::new(),
            wake: Notify::new(),
            drain_signal: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the watch and drain loops; returns immediately
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Engine already running");
            return;
        }

        let watcher = self.clone();
        tasks.push(tokio::spawn(async move { watcher.watch_loop().await }));
        let drainer = self.clone();
        tasks.push(tokio::spawn(async move { drainer.drain_loop().await }));

        info!(root = %self.root.display(), "Engine started");
    }

    /// Cancels the loops and waits for them within a bounded grace period
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.wake.notify_waiters();
        self.drain_signal.notify_waiters();

        let mut tasks = self.tasks.lock().await;
        for mut handle in tasks.drain(..) {
            if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
                warn!("Loop did not stop within the grace period, aborting");
                handle.abort();
            }
        }
        info!(root = %self.root.display(), "Engine stopped");
    }

    /// Requests an immediate poll, bypassing the watch interval
    pub fn request_sync(&self) {
        debug!("Immediate sync requested");
        self.wake.notify_one();
    }

    /// One full synchronous cycle: build if needed, collect, drain
    pub async fn run_once(&self) -> anyhow::Result<u64> {
        self.build_if_needed().await?;
        self.journal_collector().run().await?;
        self.delta_collector().collect().await?;
        self.drain_pass().await
    }

    /// Pops and executes eligible items until none remain
    ///
    /// Returns the number of processed items. In-flight tags are always
    /// released at the end of the pass, even when it fails part-way.
    pub async fn drain_pass(&self) -> anyhow::Result<u64> {
        let executor = self.executor();
        let ignore = self.config.ignore_list();
        let result = self.drain_items(&executor, &ignore).await;
        self.catalog.reset_postponed().await?;
        result
    }

    async fn drain_items(
        &self,
        executor: &OperationExecutor,
        ignore: &IgnoreList,
    ) -> anyhow::Result<u64> {
        let mut processed = 0;
        while let Some(item) = self.catalog.next_to_process().await? {
            if self.cancel.is_cancelled() {
                break;
            }
            if ignore.matches(item.name()) || ignore.matches(&item.relative_path()) {
                debug!(path = %item.relative_path(), "Ignored item, skipping");
                self.catalog.mark_in_flight(item.id()).await?;
                continue;
            }
            executor.process(item).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Runs the initial build when the built flag is unset
    ///
    /// The journal cursor starts at the journal's current end; everything
    /// before that point is covered by the rescan and the remote listing.
    async fn build_if_needed(&self) -> anyhow::Result<bool> {
        if self.catalog.catalog_built().await? {
            return Ok(false);
        }

        info!(root = %self.root.display(), "Building catalog");
        let end = self.journal.cursor_state().await?;
        self.catalog.set_journal_cursor(end).await?;

        self.rescan_collector().run().await?;
        self.delta_collector().full_listing().await?;
        self.catalog.set_catalog_built(true).await?;

        info!(root = %self.root.display(), "Catalog built");
        Ok(true)
    }

    async fn watch_loop(self: Arc<Self>) {
        let poll = Duration::from_secs(self.config.poll_interval);
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.collect_changes().await {
                Ok(true) => self.drain_signal.notify_one(),
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Change collection failed");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
                _ = self.wake.notified() => {
                    debug!("Watch loop woken early");
                }
            }
        }
        info!("Watch loop stopped");
    }

    // Drains before parking so a backlog left over from a previous run is
    // processed without waiting for a new change to arrive.
    async fn drain_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.drain_pass().await {
                Ok(processed) if processed > 0 => {
                    info!(processed, "Drain pass complete");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Drain pass failed");
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.drain_signal.notified() => {}
            }
        }
        info!("Drain loop stopped");
    }

    /// One collection round: build, journal, deltas
    ///
    /// A failing collector is logged and skipped; its cursor stays put and
    /// the next round replays the batch.
    async fn collect_changes(&self) -> anyhow::Result<bool> {
        let mut changed = self.build_if_needed().await?;

        match self.journal_collector().run().await {
            Ok(c) => changed |= c,
            Err(e) => warn!(error = %format!("{e:#}"), "Journal collection failed"),
        }
        match self.delta_collector().collect().await {
            Ok(c) => changed |= c,
            Err(e) => warn!(error = %format!("{e:#}"), "Delta collection failed"),
        }

        Ok(changed)
    }

    fn rescan_collector(&self) -> RescanCollector {
        RescanCollector::new(
            self.catalog.clone(),
            self.filesystem.clone(),
            self.root.clone(),
            self.config.ignore_list(),
            self.config.scan_workers,
        )
    }

    fn journal_collector(&self) -> JournalCollector {
        JournalCollector::new(
            self.catalog.clone(),
            self.journal.clone(),
            self.filesystem.clone(),
            self.arbiter.clone(),
            self.root.clone(),
            self.config.ignore_list(),
            self.config.conflict_policy,
        )
    }

    fn delta_collector(&self) -> DeltaCollector {
        DeltaCollector::new(
            self.catalog.clone(),
            self.store.clone(),
            self.filesystem.clone(),
            self.arbiter.clone(),
            self.root.clone(),
            self.config.ignore_list(),
            self.config.conflict_policy,
        )
    }

    fn executor(&self) -> OperationExecutor {
        OperationExecutor::new(
            self.catalog.clone(),
            self.store.clone(),
            self.filesystem.clone(),
            self.root.clone(),
            self.config.direction,
            self.config.headers_only,
        )
    }
}
