//! Sync backend over the SQLite object repository.
//!
//! # Responsibility
//! - Serve `fetch`/`persist` for `ObjectInstance` keys from local storage.
//!
//! # Invariants
//! - SQLite calls run on tokio's blocking pool, never on async workers.
//! - A missing object is `BackendError::NotFound`, never an empty document.
//! - `persist` refuses a document whose id differs from its key.

use crate::model::object::ObjectInstance;
use crate::repo::object_repo::{ObjectRepository, SqliteObjectRepository};
use crate::sync::backend::{BackendError, QueryBackend, QueryKey};
use async_trait::async_trait;
use log::error;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::task::JoinError;

/// Shares one SQLite connection between the sync engine's tasks.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    conn: Arc<Mutex<Connection>>,
}

impl ObjectStoreBackend {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut Connection) -> R) -> R {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

#[async_trait]
impl QueryBackend<ObjectInstance> for ObjectStoreBackend {
    async fn fetch(&self, key: &QueryKey) -> Result<ObjectInstance, BackendError> {
        let conn = Arc::clone(&self.conn);
        let task_key = key.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            SqliteObjectRepository::new(&conn).get_object(task_key.as_str())
        })
        .await
        .map_err(|err| storage_task_failed("object_fetch", key, err))?;

        match loaded {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(BackendError::NotFound(key.clone())),
            Err(err) => {
                error!(
                    "event=object_fetch module=service status=error object_id={} error={}",
                    key, err
                );
                Err(BackendError::Storage(err.to_string()))
            }
        }
    }

    async fn persist(&self, key: &QueryKey, value: ObjectInstance) -> Result<(), BackendError> {
        if value.id != key.as_str() {
            return Err(BackendError::Storage(format!(
                "document `{}` cannot be stored under key `{key}`",
                value.id
            )));
        }

        let conn = Arc::clone(&self.conn);
        let saved = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            SqliteObjectRepository::new(&conn).save_object(&value)
        })
        .await
        .map_err(|err| storage_task_failed("object_persist", key, err))?;

        saved.map_err(|err| {
            error!(
                "event=object_persist module=service status=error object_id={} error={}",
                key, err
            );
            BackendError::Storage(err.to_string())
        })
    }
}

fn storage_task_failed(event: &str, key: &QueryKey, err: JoinError) -> BackendError {
    error!(
        "event={} module=service status=error object_id={} error={}",
        event, key, err
    );
    BackendError::Storage(format!("storage task failed: {err}"))
}
