//! Per-view canvas session.
//!
//! # Responsibility
//! - Own the lifecycle of one opened object: mount reads through the sync
//!   engine, unmount tears the engine down.
//! - Route grid events to the layout reconciler against the current cached
//!   document.
//!
//! # Invariants
//! - Grid events are only applied to a loaded document; a pending or
//!   unavailable document rejects them.

use crate::chat::channel::MessageReference;
use crate::layout::reconciler::{DropEvent, GridBlock, LayoutReconciler, ReconcileOutcome};
use crate::model::object::{DocumentError, LayoutEntry, ObjectId, ObjectInstance};
use crate::sync::backend::{QueryBackend, QueryKey};
use crate::sync::engine::{ReadState, SyncEngine};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The document has not been loaded yet or could not be loaded.
    NotLoaded(QueryKey),
    Document(DocumentError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotLoaded(key) => write!(f, "object `{key}` is not loaded"),
            Self::Document(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Document(err) => Some(err),
            Self::NotLoaded(_) => None,
        }
    }
}

impl From<DocumentError> for SessionError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

/// One opened object view.
pub struct CanvasSession<B> {
    key: QueryKey,
    reconciler: LayoutReconciler<B>,
}

impl<B> CanvasSession<B>
where
    B: QueryBackend<ObjectInstance>,
{
    /// Mounts a view for `object_id` and starts loading it.
    pub fn open(engine: SyncEngine<ObjectInstance, B>, object_id: impl Into<ObjectId>) -> Self {
        Self::with_reconciler(LayoutReconciler::new(engine), object_id)
    }

    pub fn with_reconciler(
        reconciler: LayoutReconciler<B>,
        object_id: impl Into<ObjectId>,
    ) -> Self {
        let key = QueryKey::new(object_id);
        reconciler.engine().read(&key);
        info!("event=canvas_open module=service status=ok object_id={}", key);
        Self { key, reconciler }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn engine(&self) -> &SyncEngine<ObjectInstance, B> {
        self.reconciler.engine()
    }

    /// Current best-known document.
    pub fn current(&self) -> ReadState<ObjectInstance> {
        self.engine().read(&self.key)
    }

    pub fn drop_block(&self, event: &DropEvent) -> Result<ReconcileOutcome, SessionError> {
        let object = self.loaded()?;
        Ok(self.reconciler.on_drop(&object, event)?)
    }

    pub fn layout_changed(&self, frame: &[LayoutEntry]) -> Result<ReconcileOutcome, SessionError> {
        let object = self.loaded()?;
        Ok(self.reconciler.on_layout_change(&object, frame))
    }

    /// Blocks to hand to the grid; empty until the document is loaded.
    pub fn blocks(&self) -> Vec<GridBlock> {
        match self.engine().peek(&self.key) {
            ReadState::Ready(object) => self.reconciler.project(&object),
            _ => Vec::new(),
        }
    }

    /// Reference to this object for a chat message.
    pub fn reference(&self) -> Result<MessageReference, SessionError> {
        Ok(MessageReference::to_object(&self.loaded()?))
    }

    /// Unmounts the view and tears the cache down.
    pub fn close(self) {
        self.engine().shutdown();
        info!(
            "event=canvas_close module=service status=ok object_id={}",
            self.key
        );
    }

    fn loaded(&self) -> Result<ObjectInstance, SessionError> {
        self.engine()
            .peek(&self.key)
            .ready()
            .ok_or_else(|| SessionError::NotLoaded(self.key.clone()))
    }
}
