//! Optimistic query cache and mutation coordinator.
//!
//! # Responsibility
//! - Serve the best-known value per `QueryKey`, fetching on first access
//!   and after invalidation.
//! - Apply mutations to the cache synchronously, persist them in the
//!   background and roll back on failure.
//!
//! # Invariants
//! - Cache reads and writes happen under one lock; no caller observes a
//!   half-applied edit.
//! - A fetch in flight when a mutation starts is aborted and its
//!   generation retired, so a late result is discarded.
//! - No fetch starts while a mutation for the same key is unsettled.
//! - Backend failures become cache transitions plus one queued
//!   `SyncError`; they never propagate to `mutate` callers.
//! - Values are never expired by time; only settlement or `invalidate`
//!   marks a key stale.
//!
//! `read` and `mutate` spawn onto the ambient tokio runtime and must be
//! called from within one.

use crate::sync::backend::{BackendError, QueryBackend, QueryKey, SyncError};
use crate::sync::config::{ConflictPolicy, SyncConfig};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Merge applied by `mutate`: `(cached, submitted) -> new cached value`.
pub type EditFn<T> = Arc<dyn Fn(Option<&T>, T) -> T + Send + Sync>;

/// Identifier of one `mutate` call, unique per engine.
pub type MutationId = u64;

/// Edit function where the submitted value supersedes the cached one.
pub fn replace_edit<T: 'static>() -> EditFn<T> {
    Arc::new(replace::<T>)
}

fn replace<T>(_cached: Option<&T>, submitted: T) -> T {
    submitted
}

/// Snapshot returned by `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadState<T> {
    Ready(T),
    /// No value yet; a fetch is in flight or about to start.
    Pending,
    /// The last fetch failed and no value was ever loaded.
    Unavailable(SyncError),
}

impl<T> ReadState<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Final state of one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Backend accepted the value.
    Committed,
    /// Backend rejected the value and the cache was restored.
    RolledBack(SyncError),
    /// Backend rejected the value but a later queued edit stays visible.
    Superseded(SyncError),
    /// The persist task ended without reporting, e.g. runtime shutdown.
    Abandoned,
}

/// Handle to a mutation's background persist.
#[derive(Debug)]
pub struct MutationTicket {
    id: MutationId,
    key: QueryKey,
    outcome: oneshot::Receiver<MutationOutcome>,
}

impl MutationTicket {
    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Waits until the backend call settles and the cache has been updated.
    pub async fn settled(self) -> MutationOutcome {
        self.outcome.await.unwrap_or(MutationOutcome::Abandoned)
    }
}

struct InFlightFetch {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Entry<T> {
    value: Option<T>,
    fetch_error: Option<SyncError>,
    stale: bool,
    fetch: Option<InFlightFetch>,
    fetch_generation: u64,
    pending: VecDeque<MutationId>,
    /// Last value known to match the backend while mutations are queued.
    baseline: Option<T>,
    /// Completion signal of the newest queued persist.
    persist_tail: Option<oneshot::Receiver<()>>,
    revision: watch::Sender<u64>,
}

impl<T: Clone> Entry<T> {
    fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            value: None,
            fetch_error: None,
            stale: true,
            fetch: None,
            fetch_generation: 0,
            pending: VecDeque::new(),
            baseline: None,
            persist_tail: None,
            revision,
        }
    }

    fn read_state(&self) -> ReadState<T> {
        match (&self.value, &self.fetch_error) {
            (Some(value), _) => ReadState::Ready(value.clone()),
            (None, Some(err)) => ReadState::Unavailable(err.clone()),
            (None, None) => ReadState::Pending,
        }
    }

    fn needs_fetch(&self) -> bool {
        self.stale && self.fetch.is_none() && self.pending.is_empty()
    }

    fn cancel_fetch(&mut self) -> Option<u64> {
        let fetch = self.fetch.take()?;
        fetch.handle.abort();
        Some(fetch.generation)
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

struct EngineState<T> {
    entries: HashMap<QueryKey, Entry<T>>,
    errors: VecDeque<SyncError>,
    next_mutation_id: MutationId,
    closed: bool,
}

impl<T: Clone> EngineState<T> {
    fn entry(&mut self, key: &QueryKey) -> &mut Entry<T> {
        self.entries.entry(key.clone()).or_insert_with(Entry::new)
    }
}

struct Shared<T, B> {
    backend: B,
    config: SyncConfig,
    edit_fn: EditFn<T>,
    state: Mutex<EngineState<T>>,
}

/// Optimistic cache over a `QueryBackend`.
///
/// Create one per mounted view and call `shutdown` when the view goes
/// away. Clones share the same cache.
pub struct SyncEngine<T, B> {
    shared: Arc<Shared<T, B>>,
}

impl<T, B> Clone for SyncEngine<T, B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, B> SyncEngine<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: QueryBackend<T>,
{
    /// Creates an engine whose mutations replace the cached value.
    pub fn new(backend: B, config: SyncConfig) -> Self {
        Self::with_edit_fn(backend, config, replace_edit())
    }

    /// Creates an engine with a custom merge for `mutate`.
    pub fn with_edit_fn(backend: B, config: SyncConfig, edit_fn: EditFn<T>) -> Self {
        info!(
            "event=sync_engine_init module=sync status=ok policy={:?}",
            config.conflict_policy
        );
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                edit_fn,
                state: Mutex::new(EngineState {
                    entries: HashMap::new(),
                    errors: VecDeque::new(),
                    next_mutation_id: 1,
                    closed: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Returns the best-known value and starts a fetch when the key has
    /// never been loaded, was invalidated, or its last fetch failed.
    pub fn read(&self, key: &QueryKey) -> ReadState<T> {
        let mut guard = self.shared.state.lock();
        if guard.closed {
            return ReadState::Pending;
        }
        let entry = guard.entry(key);
        let current = entry.read_state();
        if entry.needs_fetch() {
            Shared::start_fetch(&self.shared, entry, key);
        }
        current
    }

    /// Returns the cached state without triggering a fetch.
    pub fn peek(&self, key: &QueryKey) -> ReadState<T> {
        self.shared
            .state
            .lock()
            .entries
            .get(key)
            .map_or(ReadState::Pending, Entry::read_state)
    }

    /// Applies `new_value` to the cache now and persists it in the
    /// background.
    ///
    /// Any in-flight fetch for `key` is cancelled first. The returned ticket
    /// may be dropped; settlement happens regardless.
    ///
    /// After `shutdown` the value is still persisted, but the cache is not
    /// touched and a failure has nothing to roll back.
    pub fn mutate(&self, key: &QueryKey, new_value: T) -> MutationTicket {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let id = state.next_mutation_id;
        state.next_mutation_id += 1;

        if state.closed {
            return self.persist_detached(key, id, new_value);
        }

        let entry = state.entry(key);
        if let Some(generation) = entry.cancel_fetch() {
            debug!(
                "event=fetch_cancel module=sync status=ok key={} generation={} mutation_id={}",
                key, generation, id
            );
        }

        let snapshot = entry.value.clone();
        let next = (self.shared.edit_fn)(snapshot.as_ref(), new_value);
        entry.value = Some(next.clone());
        entry.fetch_error = None;
        entry.touch();

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();

        match self.shared.config.conflict_policy {
            ConflictPolicy::SerializePerKey => {
                if entry.pending.is_empty() {
                    entry.baseline = snapshot;
                }
                entry.pending.push_back(id);
                let previous = entry.persist_tail.take();
                let (done_tx, done_rx) = oneshot::channel();
                entry.persist_tail = Some(done_rx);

                tokio::spawn(async move {
                    if let Some(previous) = previous {
                        // Err only means the previous task died; proceed.
                        let _ = previous.await;
                    }
                    let result = shared.backend.persist(&task_key, next.clone()).await;
                    let outcome = shared.settle_serialized(&task_key, id, next, result);
                    let _ = done_tx.send(());
                    let _ = outcome_tx.send(outcome);
                });
            }
            ConflictPolicy::Independent => {
                entry.pending.push_back(id);

                tokio::spawn(async move {
                    let result = shared.backend.persist(&task_key, next).await;
                    let outcome = shared.settle_independent(&task_key, id, snapshot, result);
                    let _ = outcome_tx.send(outcome);
                });
            }
        }

        debug!(
            "event=mutation_start module=sync status=ok key={} mutation_id={} queued={}",
            key,
            id,
            entry.pending.len()
        );

        MutationTicket {
            id,
            key: key.clone(),
            outcome: outcome_rx,
        }
    }

    /// Marks `key` stale; the next `read` re-fetches.
    pub fn invalidate(&self, key: &QueryKey) {
        let mut guard = self.shared.state.lock();
        if let Some(entry) = guard.entries.get_mut(key) {
            entry.stale = true;
            entry.touch();
        }
    }

    /// Subscribes to cache transitions of `key`.
    ///
    /// The watched number increases on every change; consumers re-read on
    /// notification. After `shutdown` the receiver is already closed.
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<u64> {
        let mut guard = self.shared.state.lock();
        if guard.closed {
            return watch::channel(0).1;
        }
        guard.entry(key).revision.subscribe()
    }

    /// Number of unsettled mutations for `key`.
    pub fn pending_mutations(&self, key: &QueryKey) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.pending.len())
    }

    /// Takes all errors reported since the last call.
    pub fn drain_errors(&self) -> Vec<SyncError> {
        self.shared.state.lock().errors.drain(..).collect()
    }

    /// Tears the cache down: aborts fetches and drops cached values.
    ///
    /// Persists already issued run to completion; their outcomes are still
    /// delivered to tickets. Reads after shutdown stay pending and never
    /// recreate cache entries.
    pub fn shutdown(&self) {
        let mut guard = self.shared.state.lock();
        guard.closed = true;
        for entry in guard.entries.values_mut() {
            entry.cancel_fetch();
        }
        let dropped = guard.entries.len();
        guard.entries.clear();
        info!(
            "event=sync_engine_shutdown module=sync status=ok dropped_keys={}",
            dropped
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().closed
    }

    fn persist_detached(&self, key: &QueryKey, id: MutationId, new_value: T) -> MutationTicket {
        let next = (self.shared.edit_fn)(None, new_value);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();

        tokio::spawn(async move {
            let result = shared.backend.persist(&task_key, next).await;
            let outcome = shared.settle_independent(&task_key, id, None, result);
            let _ = outcome_tx.send(outcome);
        });
        debug!(
            "event=mutation_start module=sync status=ok key={} mutation_id={} cache=closed",
            key, id
        );

        MutationTicket {
            id,
            key: key.clone(),
            outcome: outcome_rx,
        }
    }
}

impl<T, B> Shared<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: QueryBackend<T>,
{
    fn start_fetch(shared: &Arc<Self>, entry: &mut Entry<T>, key: &QueryKey) {
        entry.fetch_generation += 1;
        let generation = entry.fetch_generation;
        let task_shared = Arc::clone(shared);
        let task_key = key.clone();

        // The caller holds the state lock, so the task cannot complete
        // before `entry.fetch` is recorded.
        let handle = tokio::spawn(async move {
            let result = task_shared.backend.fetch(&task_key).await;
            task_shared.complete_fetch(&task_key, generation, result);
        });
        entry.fetch = Some(InFlightFetch { generation, handle });
        debug!(
            "event=fetch_start module=sync status=ok key={} generation={}",
            key, generation
        );
    }

    fn complete_fetch(&self, key: &QueryKey, generation: u64, result: Result<T, BackendError>) {
        let mut guard = self.state.lock();
        let EngineState {
            entries, errors, ..
        } = &mut *guard;

        let Some(entry) = entries.get_mut(key) else {
            debug!(
                "event=fetch_discard module=sync status=ok key={} generation={} reason=torn_down",
                key, generation
            );
            return;
        };
        if entry.fetch.as_ref().map(|fetch| fetch.generation) != Some(generation) {
            debug!(
                "event=fetch_discard module=sync status=ok key={} generation={} reason=superseded",
                key, generation
            );
            return;
        }
        entry.fetch = None;

        match result {
            Ok(value) => {
                entry.value = Some(value);
                entry.fetch_error = None;
                entry.stale = false;
                debug!(
                    "event=fetch module=sync status=ok key={} generation={}",
                    key, generation
                );
            }
            Err(source) => {
                let err = SyncError::Fetch {
                    key: key.clone(),
                    source,
                };
                error!("event=fetch module=sync status=error key={} error={}", key, err);
                entry.fetch_error = Some(err.clone());
                errors.push_back(err);
            }
        }
        entry.touch();
    }

    fn settle_serialized(
        &self,
        key: &QueryKey,
        id: MutationId,
        value: T,
        result: Result<(), BackendError>,
    ) -> MutationOutcome {
        let mut guard = self.state.lock();
        let EngineState {
            entries, errors, ..
        } = &mut *guard;
        let failure = record_persist_failure(errors, key, id, result);

        let Some(entry) = entries.get_mut(key) else {
            return failure.map_or(MutationOutcome::Committed, MutationOutcome::RolledBack);
        };
        entry.pending.retain(|pending| *pending != id);

        let outcome = match failure {
            None => {
                entry.baseline = Some(value);
                MutationOutcome::Committed
            }
            Some(err) if entry.pending.is_empty() => {
                entry.value = entry.baseline.clone();
                info!(
                    "event=mutation_rollback module=sync status=ok key={} mutation_id={}",
                    key, id
                );
                MutationOutcome::RolledBack(err)
            }
            Some(err) => {
                debug!(
                    "event=mutation_superseded module=sync status=ok key={} mutation_id={} queued={}",
                    key,
                    id,
                    entry.pending.len()
                );
                MutationOutcome::Superseded(err)
            }
        };

        if entry.pending.is_empty() {
            entry.baseline = None;
            entry.persist_tail = None;
        }
        entry.stale = true;
        entry.touch();
        outcome
    }

    fn settle_independent(
        &self,
        key: &QueryKey,
        id: MutationId,
        snapshot: Option<T>,
        result: Result<(), BackendError>,
    ) -> MutationOutcome {
        let mut guard = self.state.lock();
        let EngineState {
            entries, errors, ..
        } = &mut *guard;
        let failure = record_persist_failure(errors, key, id, result);

        let Some(entry) = entries.get_mut(key) else {
            return failure.map_or(MutationOutcome::Committed, MutationOutcome::RolledBack);
        };
        entry.pending.retain(|pending| *pending != id);

        let outcome = match failure {
            None => MutationOutcome::Committed,
            Some(err) => {
                entry.value = snapshot;
                info!(
                    "event=mutation_rollback module=sync status=ok key={} mutation_id={}",
                    key, id
                );
                MutationOutcome::RolledBack(err)
            }
        };
        entry.stale = true;
        entry.touch();
        outcome
    }
}

fn record_persist_failure(
    errors: &mut VecDeque<SyncError>,
    key: &QueryKey,
    id: MutationId,
    result: Result<(), BackendError>,
) -> Option<SyncError> {
    match result {
        Ok(()) => {
            debug!(
                "event=persist module=sync status=ok key={} mutation_id={}",
                key, id
            );
            None
        }
        Err(source) => {
            let err = SyncError::Persist {
                key: key.clone(),
                source,
            };
            warn!(
                "event=persist module=sync status=error key={} mutation_id={} error={}",
                key, id, err
            );
            errors.push_back(err.clone());
            Some(err)
        }
    }
}
