//! Chat transcript consumed by the chat panel.
//!
//! Decoupled from the document model except for optional references.

pub mod channel;
pub mod preview;
