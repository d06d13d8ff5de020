//! Object document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store each `ObjectInstance` as one JSON document keyed by object id.
//! - Define the repository error shared by all repositories.
//!
//! # Invariants
//! - Writes validate the document before touching storage.
//! - Reads reject stored documents that fail to decode or whose embedded
//!   id differs from the row id, instead of masking them.

use crate::db::DbError;
use crate::model::object::{DocumentError, ObjectId, ObjectInstance};
use crate::model::object_type::ObjectTypeValidationError;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Document(DocumentError),
    ObjectType(ObjectTypeValidationError),
    Db(DbError),
    Json(serde_json::Error),
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document(err) => write!(f, "{err}"),
            Self::ObjectType(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "document encoding failed: {err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Document(err) => Some(err),
            Self::ObjectType(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DocumentError> for RepoError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<ObjectTypeValidationError> for RepoError {
    fn from(value: ObjectTypeValidationError) -> Self {
        Self::ObjectType(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Repository interface for object documents.
pub trait ObjectRepository {
    /// Loads one document; `None` when no row exists.
    fn get_object(&self, id: &str) -> RepoResult<Option<ObjectInstance>>;
    /// Inserts or fully replaces one document.
    fn save_object(&self, object: &ObjectInstance) -> RepoResult<()>;
    /// Returns all stored object ids, most recently saved first.
    fn list_object_ids(&self) -> RepoResult<Vec<ObjectId>>;
}

/// SQLite-backed object repository.
pub struct SqliteObjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteObjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ObjectRepository for SqliteObjectRepository<'_> {
    fn get_object(&self, id: &str) -> RepoResult<Option<ObjectInstance>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM objects WHERE id = ?1;", [id], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(body) = body else {
            return Ok(None);
        };
        let object: ObjectInstance = serde_json::from_str(&body).map_err(|err| {
            RepoError::InvalidData(format!("object `{id}` does not decode: {err}"))
        })?;
        if object.id != id {
            return Err(RepoError::InvalidData(format!(
                "object row `{id}` holds document `{}`",
                object.id
            )));
        }
        Ok(Some(object))
    }

    fn save_object(&self, object: &ObjectInstance) -> RepoResult<()> {
        object.validate()?;
        let body = serde_json::to_string(object)?;

        self.conn.execute(
            "INSERT INTO objects (id, body) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![object.id.as_str(), body],
        )?;
        Ok(())
    }

    fn list_object_ids(&self) -> RepoResult<Vec<ObjectId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM objects ORDER BY updated_at DESC, id ASC;")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
