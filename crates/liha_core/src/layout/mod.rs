//! Layout reconciliation between the grid collaborator and the document
//! model.
//!
//! The grid engine's own layout math stays outside this crate; only its
//! events and its input projection cross this boundary.

pub mod reconciler;
