//! Canvas domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep edits value-based so any earlier version stays usable for
//!   rollback.
//!
//! # Invariants
//! - Documents are identified by a stable `ObjectId`.
//! - Content blocks are never deleted by structural merges.

pub mod object;
pub mod object_type;
