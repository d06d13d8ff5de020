//! Grid layout event reconciliation.
//!
//! # Responsibility
//! - Turn drop and layout-change events from the grid collaborator into
//!   document edits and hand them to the sync engine.
//! - Project renderable blocks into the grid's input list.
//!
//! # Invariants
//! - This type is the only place that decides whether a layout event
//!   becomes a mutation. A layout change that alters nothing never calls
//!   `mutate`, which breaks the mutate → re-render → layout-change loop.
//! - Blocks of non-renderable kinds stay in the document but are omitted
//!   from the projection.

use crate::model::object::{
    ContentId, ContentItem, ContentKind, DocumentError, LayoutEntry, ObjectInstance, Placement,
};
use crate::sync::backend::{QueryBackend, QueryKey};
use crate::sync::engine::{MutationTicket, SyncEngine};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Source of fresh content ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ContentId;
}

/// Random v4 uuids; collisions are not expected in practice.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> ContentId {
        Uuid::new_v4().to_string()
    }
}

/// A block dropped onto the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEvent {
    pub x: u32,
    pub y: u32,
    /// Block type carried by the drag transfer.
    pub payload_type: String,
}

impl DropEvent {
    pub fn new(x: u32, y: u32, payload_type: impl Into<String>) -> Self {
        Self {
            x,
            y,
            payload_type: payload_type.into(),
        }
    }
}

/// Set of block kinds the grid can currently render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFilter {
    renderable: BTreeSet<String>,
}

impl Default for RenderFilter {
    fn default() -> Self {
        Self::only([ContentKind::Text])
    }
}

impl RenderFilter {
    pub fn only(kinds: impl IntoIterator<Item = ContentKind>) -> Self {
        Self {
            renderable: kinds.into_iter().map(String::from).collect(),
        }
    }

    pub fn is_renderable(&self, kind: &ContentKind) -> bool {
        self.renderable.contains(kind.as_str())
    }
}

/// One positioned block handed to the grid for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridBlock {
    pub key: ContentId,
    pub placement: Placement,
    pub item: Arc<ContentItem>,
}

/// Result of handling one grid event.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The event changed nothing; no mutation was issued.
    Unchanged,
    /// A new document version was pushed to the sync engine.
    Mutated {
        object: ObjectInstance,
        ticket: MutationTicket,
    },
}

impl ReconcileOutcome {
    pub fn is_mutated(&self) -> bool {
        matches!(self, Self::Mutated { .. })
    }

    pub fn object(&self) -> Option<&ObjectInstance> {
        match self {
            Self::Mutated { object, .. } => Some(object),
            Self::Unchanged => None,
        }
    }

    pub fn into_ticket(self) -> Option<MutationTicket> {
        match self {
            Self::Mutated { ticket, .. } => Some(ticket),
            Self::Unchanged => None,
        }
    }
}

/// Bridges the grid collaborator and the object sync engine.
pub struct LayoutReconciler<B> {
    engine: SyncEngine<ObjectInstance, B>,
    ids: Arc<dyn IdGenerator>,
    filter: RenderFilter,
}

impl<B> LayoutReconciler<B>
where
    B: QueryBackend<ObjectInstance>,
{
    pub fn new(engine: SyncEngine<ObjectInstance, B>) -> Self {
        Self {
            engine,
            ids: Arc::new(UuidGenerator),
            filter: RenderFilter::default(),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_filter(mut self, filter: RenderFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn engine(&self) -> &SyncEngine<ObjectInstance, B> {
        &self.engine
    }

    /// Places a new empty block at the drop position and mutates.
    ///
    /// # Errors
    /// - `DuplicateId` when the id generator repeats an existing id.
    pub fn on_drop(
        &self,
        object: &ObjectInstance,
        event: &DropEvent,
    ) -> Result<ReconcileOutcome, DocumentError> {
        let item = ContentItem::new(
            self.ids.next_id(),
            event.payload_type.as_str(),
            event.x,
            event.y,
        );
        let content_id = item.id.clone();
        let next = object.insert(item).map_err(|err| {
            error!(
                "event=layout_drop module=layout status=error object_id={} error={}",
                object.id, err
            );
            err
        })?;

        debug!(
            "event=layout_drop module=layout status=ok object_id={} content_id={} kind={}",
            object.id, content_id, event.payload_type
        );
        Ok(self.push(next))
    }

    /// Merges a layout frame; mutates only when a position or span changed.
    pub fn on_layout_change(
        &self,
        object: &ObjectInstance,
        frame: &[LayoutEntry],
    ) -> ReconcileOutcome {
        let next = object.resync(frame);
        if next.is_same_version(object) {
            debug!(
                "event=layout_change module=layout status=ok object_id={} result=unchanged",
                object.id
            );
            return ReconcileOutcome::Unchanged;
        }

        debug!(
            "event=layout_change module=layout status=ok object_id={} result=mutated version={}",
            object.id,
            next.version()
        );
        self.push(next)
    }

    /// Renderable blocks in visual order.
    pub fn project(&self, object: &ObjectInstance) -> Vec<GridBlock> {
        let mut blocks = Vec::with_capacity(object.len());
        for item in object.ordered_items() {
            if !self.filter.is_renderable(&item.kind) {
                continue;
            }
            if let Some(shared) = object.contents().get(&item.id) {
                blocks.push(GridBlock {
                    key: item.id.clone(),
                    placement: item.placement(),
                    item: Arc::clone(shared),
                });
            }
        }
        blocks
    }

    fn push(&self, next: ObjectInstance) -> ReconcileOutcome {
        let key = QueryKey::from(next.id.as_str());
        let ticket = self.engine.mutate(&key, next.clone());
        ReconcileOutcome::Mutated {
            object: next,
            ticket,
        }
    }
}
