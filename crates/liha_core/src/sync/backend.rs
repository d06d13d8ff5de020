//! Backend contract consumed by the sync engine.
//!
//! # Responsibility
//! - Define the two suspension points of the engine: `fetch` and `persist`.
//! - Define the error values the engine turns into cache transitions.
//!
//! # Invariants
//! - `fetch` returns the authoritative stored value or an error; a missing
//!   value is an error, never an empty default.
//! - `persist` is not assumed idempotent; the engine never retries it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable cache scope identifier, e.g. an object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No stored value exists for the key.
    NotFound(QueryKey),
    /// Storage or transport failure, with a diagnostic message.
    Storage(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "no stored value for `{key}`"),
            Self::Storage(message) => write!(f, "backend storage failure: {message}"),
        }
    }
}

impl Error for BackendError {}

/// Engine-level failure, tagged with the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Fetch { key: QueryKey, source: BackendError },
    Persist { key: QueryKey, source: BackendError },
}

impl SyncError {
    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Fetch { key, .. } | Self::Persist { key, .. } => key,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch { key, source } => write!(f, "fetch failed for `{key}`: {source}"),
            Self::Persist { key, source } => write!(f, "persist failed for `{key}`: {source}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch { source, .. } | Self::Persist { source, .. } => Some(source),
        }
    }
}

/// Authoritative store behind the optimistic cache.
#[async_trait]
pub trait QueryBackend<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Loads the stored value for `key`.
    async fn fetch(&self, key: &QueryKey) -> Result<T, BackendError>;

    /// Stores `value` as the new state for `key`.
    async fn persist(&self, key: &QueryKey, value: T) -> Result<(), BackendError>;
}
