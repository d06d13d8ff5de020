//! Core domain logic for the Liha object canvas.
//! This crate owns the document model, the optimistic sync engine and the
//! layout reconciliation protocol; UI layers only consume it.

pub mod chat;
pub mod db;
pub mod layout;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use chat::channel::{
    ChannelError, Message, MessageChannel, MessageId, MessageReference, Role, ViewNavigator,
};
pub use layout::reconciler::{
    DropEvent, GridBlock, IdGenerator, LayoutReconciler, ReconcileOutcome, RenderFilter,
    UuidGenerator,
};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig};
pub use model::object::{
    ContentId, ContentItem, ContentKind, DocumentError, LayoutEntry, ObjectId, ObjectInstance,
    Placement, DEFAULT_SPAN,
};
pub use model::object_type::{
    ObjectType, ObjectTypeId, ObjectTypeValidationError, PropertyType, PropertyValueType,
};
pub use repo::object_repo::{ObjectRepository, RepoError, RepoResult, SqliteObjectRepository};
pub use repo::object_type_repo::{ObjectTypeRepository, SqliteObjectTypeRepository};
pub use service::canvas_session::{CanvasSession, SessionError};
pub use service::object_backend::ObjectStoreBackend;
pub use service::object_type_service::ObjectTypeService;
pub use sync::backend::{BackendError, QueryBackend, QueryKey, SyncError};
pub use sync::config::{ConflictPolicy, SyncConfig};
pub use sync::engine::{
    replace_edit, EditFn, MutationId, MutationOutcome, MutationTicket, ReadState, SyncEngine,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
