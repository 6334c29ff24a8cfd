//! Declarative table definitions.
//!
//! A [`TableDefinition`] is the static, JSON-Schema-shaped description of one
//! entity: its name, required fields, typed properties, secondary indexes and the
//! roles allowed to list it. Definitions are built once at process start, either
//! through [`TableDefinition::builder`] or by deserializing JSON, and are never
//! mutated afterwards.
//!
//! # Example
//!
//! ```ignore
//! use tablelayer_core::schema::{IndexDeclaration, Property, TableDefinition};
//!
//! let user = TableDefinition::builder("user")
//!     .list_roles(["admin"])
//!     .required(["email", "first_name", "last_name", "role"])
//!     .property("email", Property::string())
//!     .property("first_name", Property::string())
//!     .property("last_name", Property::string())
//!     .property("role", Property::string().one_of(["admin", "user"]).with_default("admin"))
//!     .index(IndexDeclaration::builder("email_v1").ascending("email").build())
//!     .build();
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire name of the primary identifier.
pub const ID_FIELD: &str = "id";
/// Storage name of the primary identifier.
pub const STORAGE_ID_FIELD: &str = "_id";
pub const CREATED_DATE_FIELD: &str = "created_date";
pub const UPDATED_DATE_FIELD: &str = "updated_date";
pub const STATUS_FIELD: &str = "status";
/// Name of the default identifier index every collection carries.
pub const PRIMARY_INDEX: &str = "_id_";

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

/// JSON type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

/// String formats the validator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyFormat {
    /// RFC 3339 timestamp, e.g. `2024-01-02T03:04:05.000Z`.
    #[serde(rename = "date-time")]
    DateTime,
}

/// The declared shape of a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    /// Whitelist of allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Bson>>,
    /// Value applied on creation when the property is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PropertyFormat>,
    #[serde(rename = "readOnly", default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl Property {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            allowed: None,
            default: None,
            format: None,
            read_only: false,
        }
    }

    pub fn string() -> Self {
        Self::new(PropertyKind::String)
    }

    pub fn number() -> Self {
        Self::new(PropertyKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(PropertyKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(PropertyKind::Boolean)
    }

    pub fn object() -> Self {
        Self::new(PropertyKind::Object)
    }

    pub fn array() -> Self {
        Self::new(PropertyKind::Array)
    }

    /// A string property holding an RFC 3339 timestamp.
    pub fn date_time() -> Self {
        Self::string().with_format(PropertyFormat::DateTime)
    }

    /// Restricts the property to the given values.
    pub fn one_of<V: Into<Bson>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_format(mut self, format: PropertyFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// The required-field list and property map of an object.
///
/// This is the unit the validator compiles; a [`TableDefinition`] embeds one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectShape {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl ObjectShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }
}

/// Sort order or text marker of one indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKey {
    Ascending,
    Descending,
    Text,
}

impl From<IndexKey> for Bson {
    fn from(key: IndexKey) -> Self {
        match key {
            IndexKey::Ascending => Bson::Int32(1),
            IndexKey::Descending => Bson::Int32(-1),
            IndexKey::Text => Bson::String("text".to_string()),
        }
    }
}

impl IndexKey {
    /// Reads an index key value as stored in a key document (`1`, `-1` or `"text"`).
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::String(s) if s == "text" => Some(IndexKey::Text),
            Bson::Int32(n) if *n > 0 => Some(IndexKey::Ascending),
            Bson::Int64(n) if *n > 0 => Some(IndexKey::Ascending),
            Bson::Double(n) if *n > 0.0 => Some(IndexKey::Ascending),
            Bson::Int32(n) if *n < 0 => Some(IndexKey::Descending),
            Bson::Int64(n) if *n < 0 => Some(IndexKey::Descending),
            Bson::Double(n) if *n < 0.0 => Some(IndexKey::Descending),
            _ => None,
        }
    }
}

/// A named secondary index.
///
/// `keys` is an ordered field → order document in the store's native form, e.g.
/// `{ "email": 1 }` or `{ "first_name": "text", "last_name": "text" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub name: String,
    pub keys: Document,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexDeclaration {
    pub fn new(name: impl Into<String>, keys: Document) -> Self {
        Self {
            name: name.into(),
            keys,
            unique: false,
        }
    }

    pub fn builder(name: impl Into<String>) -> IndexDeclarationBuilder {
        IndexDeclarationBuilder::new(name)
    }

    /// Returns the fields indexed for full-text search.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|(_, value)| IndexKey::from_bson(value) == Some(IndexKey::Text))
            .map(|(field, _)| field.as_str())
    }

    pub fn is_text(&self) -> bool {
        self.text_fields().next().is_some()
    }
}

pub struct IndexDeclarationBuilder {
    name: String,
    keys: Document,
    unique: bool,
}

impl IndexDeclarationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Document::new(),
            unique: false,
        }
    }

    pub fn key(mut self, field: impl Into<String>, key: IndexKey) -> Self {
        self.keys.insert(field.into(), key);
        self
    }

    pub fn ascending(self, field: impl Into<String>) -> Self {
        self.key(field, IndexKey::Ascending)
    }

    pub fn descending(self, field: impl Into<String>) -> Self {
        self.key(field, IndexKey::Descending)
    }

    pub fn text(self, field: impl Into<String>) -> Self {
        self.key(field, IndexKey::Text)
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn build(self) -> IndexDeclaration {
        IndexDeclaration {
            name: self.name,
            keys: self.keys,
            unique: self.unique,
        }
    }
}

/// Static declaration of one table.
///
/// Besides the declared properties every table carries four reserved ones:
/// `id`, `created_date`, `updated_date` and `status` (`active` by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(flatten)]
    pub shape: ObjectShape,
    #[serde(default)]
    pub indexes: Vec<IndexDeclaration>,
    /// Roles allowed to enumerate this table. Consumed by the auth layer only.
    #[serde(default)]
    pub list_roles: Vec<String>,
}

impl TableDefinition {
    pub fn builder(name: impl Into<String>) -> TableDefinitionBuilder {
        TableDefinitionBuilder::new(name)
    }

    pub fn required(&self) -> &[String] {
        &self.shape.required
    }

    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.shape.properties
    }

    pub fn index(&self, name: &str) -> Option<&IndexDeclaration> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Adds any reserved property the declaration does not already define.
    pub(crate) fn ensure_reserved(&mut self) {
        let properties = &mut self.shape.properties;
        properties
            .entry(ID_FIELD.to_string())
            .or_insert_with(Property::string);
        properties
            .entry(CREATED_DATE_FIELD.to_string())
            .or_insert_with(|| Property::date_time().read_only());
        properties
            .entry(UPDATED_DATE_FIELD.to_string())
            .or_insert_with(|| Property::date_time().read_only());
        properties
            .entry(STATUS_FIELD.to_string())
            .or_insert_with(|| {
                Property::string()
                    .one_of([STATUS_ACTIVE, STATUS_INACTIVE])
                    .with_default(STATUS_ACTIVE)
            });
    }
}

pub struct TableDefinitionBuilder {
    definition: TableDefinition,
}

impl TableDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: TableDefinition {
                name: name.into(),
                shape: ObjectShape::default(),
                indexes: Vec::new(),
                list_roles: Vec::new(),
            },
        }
    }

    pub fn required<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.definition.shape.required = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.definition
            .shape
            .properties
            .insert(name.into(), property);
        self
    }

    pub fn index(mut self, index: IndexDeclaration) -> Self {
        self.definition.indexes.push(index);
        self
    }

    pub fn list_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.definition.list_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(mut self) -> TableDefinition {
        self.definition.ensure_reserved();
        self.definition
    }
}
