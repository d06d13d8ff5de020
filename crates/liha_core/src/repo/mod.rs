//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep SQL and JSON encoding details away from services and the sync
//!   engine.
//!
//! # Invariants
//! - Repository writes validate their input before persistence.
//! - Missing rows are reported as `None` or `NotFound`, never as defaults.

pub mod object_repo;
pub mod object_type_repo;
