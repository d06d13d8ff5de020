//! Optimistic local-state synchronization.
//!
//! # Responsibility
//! - Cache authoritative backend values per query key.
//! - Apply local edits immediately and reconcile them with the backend.
//!
//! # Invariants
//! - The engine is an explicit object owned by a view; there is no global
//!   cache.
//! - Backend errors are converted to cache transitions at this boundary.

pub mod backend;
pub mod config;
pub mod engine;
