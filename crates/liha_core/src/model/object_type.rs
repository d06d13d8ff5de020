//! Object type model.
//!
//! # Responsibility
//! - Describe the schema an object is created from: a named type with a set
//!   of property types.
//!
//! # Invariants
//! - `name` is non-empty after trimming.
//! - Every key in `property_types` equals the `id` of its value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ObjectTypeId = String;
pub type PropertyTypeId = String;

/// Value domain of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValueType {
    Text,
    Number,
    Date,
    Checkbox,
    Select,
}

impl PropertyValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Select => "select",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "checkbox" => Some(Self::Checkbox),
            "select" => Some(Self::Select),
            _ => None,
        }
    }
}

/// One typed property slot of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    pub id: PropertyTypeId,
    pub name: String,
    pub value_type: PropertyValueType,
}

impl PropertyType {
    pub fn new(
        id: impl Into<PropertyTypeId>,
        name: impl Into<String>,
        value_type: PropertyValueType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value_type,
        }
    }
}

/// Validation errors for object types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectTypeValidationError {
    EmptyName,
    PropertyKeyMismatch {
        key: PropertyTypeId,
        id: PropertyTypeId,
    },
}

impl Display for ObjectTypeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "object type name cannot be empty"),
            Self::PropertyKeyMismatch { key, id } => {
                write!(f, "property type key `{key}` does not match id `{id}`")
            }
        }
    }
}

impl Error for ObjectTypeValidationError {}

/// Named schema for objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub id: ObjectTypeId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub property_types: BTreeMap<PropertyTypeId, PropertyType>,
}

impl ObjectType {
    /// Creates an object type with a generated id and no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            icon: None,
            property_types: BTreeMap::new(),
        }
    }

    /// Adds or replaces one property type, keyed by its id.
    pub fn with_property(mut self, property: PropertyType) -> Self {
        self.property_types.insert(property.id.clone(), property);
        self
    }

    pub fn validate(&self) -> Result<(), ObjectTypeValidationError> {
        if self.name.trim().is_empty() {
            return Err(ObjectTypeValidationError::EmptyName);
        }
        for (key, property) in &self.property_types {
            if key != &property.id {
                return Err(ObjectTypeValidationError::PropertyKeyMismatch {
                    key: key.clone(),
                    id: property.id.clone(),
                });
            }
        }
        Ok(())
    }
}
