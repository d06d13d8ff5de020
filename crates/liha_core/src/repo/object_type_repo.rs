//! Object type repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist object types and their property types in separate tables.
//!
//! # Invariants
//! - `create_object_type` writes the type row and all property rows in
//!   one transaction.
//! - `get_object_type` returns the bare type; property types are loaded
//!   with `list_property_types` and joined by the service.

use crate::model::object_type::{
    ObjectType, ObjectTypeId, PropertyType, PropertyValueType,
};
use crate::repo::object_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

/// Repository interface for object types.
pub trait ObjectTypeRepository {
    /// Lists all object type ids sorted ascending.
    fn list_object_type_ids(&self) -> RepoResult<Vec<ObjectTypeId>>;
    /// Gets one object type without its property types.
    fn get_object_type(&self, id: &str) -> RepoResult<Option<ObjectType>>;
    /// Lists property types belonging to one object type.
    fn list_property_types(&self, object_type_id: &str) -> RepoResult<Vec<PropertyType>>;
    /// Creates an object type with all of its property types.
    fn create_object_type(&mut self, object_type: &ObjectType) -> RepoResult<()>;
    /// Updates name and icon of an existing object type.
    fn update_object_type(&self, object_type: &ObjectType) -> RepoResult<()>;
}

/// SQLite-backed object type repository.
pub struct SqliteObjectTypeRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteObjectTypeRepository<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl ObjectTypeRepository for SqliteObjectTypeRepository<'_> {
    fn list_object_type_ids(&self) -> RepoResult<Vec<ObjectTypeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM object_types ORDER BY id ASC;")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn get_object_type(&self, id: &str) -> RepoResult<Option<ObjectType>> {
        let object_type = self
            .conn
            .query_row(
                "SELECT id, name, icon FROM object_types WHERE id = ?1;",
                [id],
                |row| {
                    Ok(ObjectType {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        icon: row.get("icon")?,
                        property_types: BTreeMap::new(),
                    })
                },
            )
            .optional()?;
        Ok(object_type)
    }

    fn list_property_types(&self, object_type_id: &str) -> RepoResult<Vec<PropertyType>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, value_type
             FROM property_types
             WHERE object_type_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([object_type_id])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn create_object_type(&mut self, object_type: &ObjectType) -> RepoResult<()> {
        object_type.validate()?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO object_types (id, name, icon) VALUES (?1, ?2, ?3);",
            params![
                object_type.id.as_str(),
                object_type.name.as_str(),
                object_type.icon.as_deref(),
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO property_types (id, object_type_id, name, value_type)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for property in object_type.property_types.values() {
                insert.execute(params![
                    property.id.as_str(),
                    object_type.id.as_str(),
                    property.name.as_str(),
                    property.value_type.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn update_object_type(&self, object_type: &ObjectType) -> RepoResult<()> {
        object_type.validate()?;

        let changed = self.conn.execute(
            "UPDATE object_types
             SET
                name = ?1,
                icon = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?3;",
            params![
                object_type.name.as_str(),
                object_type.icon.as_deref(),
                object_type.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(object_type.id.clone()));
        }
        Ok(())
    }
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<PropertyType> {
    let value_type_text: String = row.get("value_type")?;
    let value_type = PropertyValueType::parse(&value_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid value type `{value_type_text}` in property_types.value_type"
        ))
    })?;
    Ok(PropertyType {
        id: row.get("id")?,
        name: row.get("name")?,
        value_type,
    })
}
