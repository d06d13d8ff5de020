//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repositories, the sync engine and the layout reconciler
//!   into view-level entry points.
//! - Keep UI layers decoupled from storage details.

pub mod canvas_session;
pub mod object_backend;
pub mod object_type_service;
