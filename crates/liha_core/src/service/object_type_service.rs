//! Object type use-case service.
//!
//! # Responsibility
//! - List, load, create and update object types.
//! - Join property types onto the object type they belong to.
//!
//! # Invariants
//! - Every repository failure is logged here once and returned unchanged.

use crate::model::object_type::{ObjectType, ObjectTypeId};
use crate::repo::object_repo::RepoResult;
use crate::repo::object_type_repo::ObjectTypeRepository;
use log::error;

/// Object type facade over repository implementations.
pub struct ObjectTypeService<R: ObjectTypeRepository> {
    repo: R,
}

impl<R: ObjectTypeRepository> ObjectTypeService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list_object_type_ids(&self) -> RepoResult<Vec<ObjectTypeId>> {
        self.repo.list_object_type_ids().map_err(|err| {
            error!("event=object_type_list module=service status=error error={err}");
            err
        })
    }

    /// Loads an object type with its property types keyed by id.
    pub fn get_object_type(&self, id: &str) -> RepoResult<Option<ObjectType>> {
        let Some(mut object_type) = self.repo.get_object_type(id).map_err(|err| {
            error!(
                "event=object_type_get module=service status=error object_type_id={id} error={err}"
            );
            err
        })?
        else {
            return Ok(None);
        };

        let properties = self.repo.list_property_types(id).map_err(|err| {
            error!(
                "event=property_type_list module=service status=error object_type_id={id} error={err}"
            );
            err
        })?;
        object_type.property_types = properties
            .into_iter()
            .map(|property| (property.id.clone(), property))
            .collect();
        Ok(Some(object_type))
    }

    pub fn create_object_type(&mut self, object_type: &ObjectType) -> RepoResult<()> {
        self.repo.create_object_type(object_type).map_err(|err| {
            error!(
                "event=object_type_create module=service status=error object_type_id={} error={err}",
                object_type.id
            );
            err
        })
    }

    /// Updates name and icon; property types are left as stored.
    pub fn update_object_type(&self, object_type: &ObjectType) -> RepoResult<()> {
        self.repo.update_object_type(object_type).map_err(|err| {
            error!(
                "event=object_type_update module=service status=error object_type_id={} error={err}",
                object_type.id
            );
            err
        })
    }
}
