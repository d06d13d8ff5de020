#![allow(dead_code)]

use async_trait::async_trait;
use liha_core::{BackendError, QueryBackend, QueryKey};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

struct PersistStep {
    gate: Option<oneshot::Receiver<()>>,
    fail: bool,
}

struct Inner<T> {
    stored: Mutex<HashMap<QueryKey, T>>,
    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    persist_steps: Mutex<VecDeque<PersistStep>>,
    fetch_calls: AtomicUsize,
    persist_calls: AtomicUsize,
}

/// In-memory backend whose calls can be held open and made to fail.
///
/// Persist steps are consumed in call order; calls without a scripted step
/// succeed immediately.
pub struct ScriptedBackend<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ScriptedBackend<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ScriptedBackend<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stored: Mutex::new(HashMap::new()),
                fetch_gates: Mutex::new(VecDeque::new()),
                persist_steps: Mutex::new(VecDeque::new()),
                fetch_calls: AtomicUsize::new(0),
                persist_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn store(&self, key: &str, value: T) {
        self.inner.stored.lock().insert(QueryKey::from(key), value);
    }

    pub fn stored(&self, key: &str) -> Option<T> {
        self.inner.stored.lock().get(&QueryKey::from(key)).cloned()
    }

    /// Holds the next fetch until the returned sender fires.
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.fetch_gates.lock().push_back(rx);
        tx
    }

    /// Holds the next unscripted persist until the sender fires, then
    /// succeeds or fails.
    pub fn hold_persist(&self, fail: bool) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.persist_steps.lock().push_back(PersistStep {
            gate: Some(rx),
            fail,
        });
        tx
    }

    /// Makes the next unscripted persist fail immediately.
    pub fn fail_persist(&self) {
        self.inner
            .persist_steps
            .lock()
            .push_back(PersistStep { gate: None, fail: true });
    }

    /// Makes the next unscripted persist succeed immediately.
    pub fn pass_persist(&self) {
        self.inner
            .persist_steps
            .lock()
            .push_back(PersistStep {
                gate: None,
                fail: false,
            });
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.inner.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> QueryBackend<T> for ScriptedBackend<T> {
    async fn fetch(&self, key: &QueryKey) -> Result<T, BackendError> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.inner.fetch_gates.lock().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner
            .stored
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.clone()))
    }

    async fn persist(&self, key: &QueryKey, value: T) -> Result<(), BackendError> {
        self.inner.persist_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.inner.persist_steps.lock().pop_front();
        let fail = match step {
            Some(PersistStep { gate, fail }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                fail
            }
            None => false,
        };
        if fail {
            return Err(BackendError::Storage("scripted failure".to_string()));
        }
        self.inner.stored.lock().insert(key.clone(), value);
        Ok(())
    }
}

/// Lets spawned tasks on the current-thread test runtime run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
