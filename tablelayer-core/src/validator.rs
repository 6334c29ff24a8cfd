//! Record validation against a declared object shape.
//!
//! A [`Validator`] checks a record against an [`ObjectShape`]: required fields,
//! property types, enumerations and formats. The effective required set depends
//! on the [`Operation`]:
//!
//! - [`Operation::Create`] uses the declared required fields and fills in
//!   declared defaults.
//! - [`Operation::UpdateById`] only requires `id`.
//! - [`Operation::UpdateByFilter`] requires nothing, so partial patches pass.
//!
//! Null-valued fields are dropped before checking. Undeclared properties are
//! handled according to [`AdditionalProperties`]. The first violation is
//! reported as [`TableLayerError::Validation`]; no partial result is returned.

use bson::Bson;
use chrono::DateTime;

use crate::{
    codec::{IdentifierPolicy, stringify_ids},
    error::{TableLayerError, TableLayerResult},
    record::{Record, remove_nulls},
    schema::{ID_FIELD, ObjectShape, Property, PropertyFormat, PropertyKind, TableDefinition},
};

/// The kind of write a record is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    UpdateById,
    UpdateByFilter,
}

/// What to do with properties the shape does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalProperties {
    /// Silently strip them.
    Remove,
    /// Fail validation on the first one.
    Reject,
    /// Keep them unchecked.
    Allow,
}

#[derive(Debug, Clone)]
pub struct Validator<'a> {
    shape: &'a ObjectShape,
    additional: AdditionalProperties,
    identifiers: Option<&'a IdentifierPolicy>,
}

impl<'a> Validator<'a> {
    /// A lenient, general-purpose validator for arbitrary payloads.
    ///
    /// Extra properties are kept and no identifier encoding takes place.
    pub fn new(shape: &'a ObjectShape) -> Self {
        Self {
            shape,
            additional: AdditionalProperties::Allow,
            identifiers: None,
        }
    }

    /// The validator used on every table write.
    ///
    /// Undeclared properties are stripped. Identifiers are checked in their
    /// string form and handed back in native form for storage.
    pub fn for_table(table: &'a TableDefinition, identifiers: &'a IdentifierPolicy) -> Self {
        Self {
            shape: &table.shape,
            additional: AdditionalProperties::Remove,
            identifiers: Some(identifiers),
        }
    }

    pub fn additional_properties(mut self, additional: AdditionalProperties) -> Self {
        self.additional = additional;
        self
    }

    pub fn validate(&self, record: Record, operation: Operation) -> TableLayerResult<Record> {
        let record = match self.identifiers {
            Some(_) => stringify_ids(record),
            None => record,
        };
        let record = remove_nulls(record);

        let required: &[String] = match operation {
            Operation::Create => &self.shape.required,
            Operation::UpdateById | Operation::UpdateByFilter => &[],
        };
        if operation == Operation::UpdateById && !record.contains_key(ID_FIELD) {
            return Err(TableLayerError::validation(ID_FIELD, "is required"));
        }
        if let Some(missing) = required.iter().find(|field| !record.contains_key(field.as_str())) {
            return Err(TableLayerError::validation(missing.as_str(), "is required"));
        }

        let mut checked = Record::new();
        for (key, value) in record {
            match self.shape.properties.get(&key) {
                Some(property) => {
                    check_property(&key, &value, property)?;
                    checked.insert(key, value);
                }
                None => match self.additional {
                    AdditionalProperties::Remove => {}
                    AdditionalProperties::Reject => {
                        return Err(TableLayerError::validation(key, "is not an allowed property"));
                    }
                    AdditionalProperties::Allow => {
                        checked.insert(key, value);
                    }
                },
            }
        }

        if operation == Operation::Create {
            for (key, property) in &self.shape.properties {
                if let Some(default) = &property.default {
                    if !checked.contains_key(key) {
                        checked.insert(key.clone(), default.clone());
                    }
                }
            }
        }

        match self.identifiers {
            Some(policy) => policy.encode(checked),
            None => Ok(checked),
        }
    }
}

fn check_property(path: &str, value: &Bson, property: &Property) -> TableLayerResult<()> {
    if !matches_kind(value, property.kind) {
        return Err(TableLayerError::validation(
            path,
            format!("must be {}", kind_name(property.kind)),
        ));
    }

    if let Some(allowed) = &property.allowed {
        if !allowed.iter().any(|candidate| values_equal(candidate, value)) {
            return Err(TableLayerError::validation(
                path,
                "must be equal to one of the allowed values",
            ));
        }
    }

    if let (Some(PropertyFormat::DateTime), Bson::String(s)) = (property.format, value) {
        if DateTime::parse_from_rfc3339(s).is_err() {
            return Err(TableLayerError::validation(path, "must match format \"date-time\""));
        }
    }

    Ok(())
}

fn matches_kind(value: &Bson, kind: PropertyKind) -> bool {
    match kind {
        PropertyKind::String => matches!(value, Bson::String(_)),
        PropertyKind::Number => as_f64(value).is_some(),
        PropertyKind::Integer => as_f64(value).is_some_and(|n| n.fract() == 0.0),
        PropertyKind::Boolean => matches!(value, Bson::Boolean(_)),
        PropertyKind::Object => matches!(value, Bson::Document(_)),
        PropertyKind::Array => matches!(value, Bson::Array(_)),
    }
}

fn kind_name(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::String => "string",
        PropertyKind::Number => "number",
        PropertyKind::Integer => "integer",
        PropertyKind::Boolean => "boolean",
        PropertyKind::Object => "object",
        PropertyKind::Array => "array",
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CREATED_DATE_FIELD, STATUS_FIELD};
    use bson::{doc, oid::ObjectId};

    fn user() -> TableDefinition {
        TableDefinition::builder("user")
            .required(["email", "first_name", "last_name", "role"])
            .property("email", Property::string())
            .property("first_name", Property::string())
            .property("last_name", Property::string())
            .property("role", Property::string().one_of(["admin", "user"]).with_default("admin"))
            .property("age", Property::integer())
            .property("owner_id", Property::string())
            .build()
    }

    fn valid_user() -> Record {
        doc! { "email": "a@b.com", "first_name": "A", "last_name": "B", "role": "user" }
    }

    #[test]
    fn create_requires_declared_fields_in_order() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let err = Validator::for_table(&table, &policy)
            .validate(doc! { "email": "a@b.com" }, Operation::Create)
            .unwrap_err();

        assert!(matches!(
            err,
            TableLayerError::Validation { path, .. } if path == "first_name"
        ));
    }

    #[test]
    fn create_strips_unknown_and_applies_defaults() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let mut record = valid_user();
        record.insert("nickname", "ab");

        let validated = Validator::for_table(&table, &policy)
            .validate(record, Operation::Create)
            .unwrap();

        assert!(!validated.contains_key("nickname"));
        assert_eq!(validated.get_str(STATUS_FIELD).unwrap(), "active");
    }

    #[test]
    fn nulls_count_as_absent() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let mut record = valid_user();
        record.insert("age", Bson::Null);

        let validated = Validator::for_table(&table, &policy)
            .validate(record, Operation::Create)
            .unwrap();
        assert!(!validated.contains_key("age"));

        let mut record = valid_user();
        record.insert("last_name", Bson::Null);
        let err = Validator::for_table(&table, &policy)
            .validate(record, Operation::Create)
            .unwrap_err();
        assert!(matches!(err, TableLayerError::Validation { path, .. } if path == "last_name"));
    }

    #[test]
    fn type_and_enum_violations_name_the_field() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let validator = Validator::for_table(&table, &policy);

        let mut record = valid_user();
        record.insert("role", "owner");
        assert!(matches!(
            validator.validate(record, Operation::Create),
            Err(TableLayerError::Validation { path, .. }) if path == "role"
        ));

        let mut record = valid_user();
        record.insert("age", 1.5);
        assert!(matches!(
            validator.validate(record, Operation::Create),
            Err(TableLayerError::Validation { path, message }) if path == "age" && message == "must be integer"
        ));
    }

    #[test]
    fn date_time_format_is_enforced() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let validator = Validator::for_table(&table, &policy);

        let mut record = valid_user();
        record.insert(CREATED_DATE_FIELD, "yesterday");
        assert!(validator.validate(record, Operation::Create).is_err());

        let mut record = valid_user();
        record.insert(CREATED_DATE_FIELD, "2024-01-02T03:04:05.678Z");
        assert!(validator.validate(record, Operation::Create).is_ok());
    }

    #[test]
    fn update_by_id_requires_only_the_identifier() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let validator = Validator::for_table(&table, &policy);

        assert!(matches!(
            validator.validate(doc! { "first_name": "C" }, Operation::UpdateById),
            Err(TableLayerError::Validation { path, .. }) if path == "id"
        ));

        let patch = validator
            .validate(doc! { "id": ObjectId::new().to_hex(), "first_name": "C" }, Operation::UpdateById)
            .unwrap();
        assert_eq!(patch.get_str("first_name").unwrap(), "C");
        // defaults are a creation concern only
        assert!(!patch.contains_key(STATUS_FIELD));
    }

    #[test]
    fn update_by_filter_accepts_partial_patches() {
        let table = user();
        let policy = IdentifierPolicy::default();

        let patch = Validator::for_table(&table, &policy)
            .validate(doc! { "last_name": "Z" }, Operation::UpdateByFilter)
            .unwrap();

        assert_eq!(patch, doc! { "last_name": "Z" });
    }

    #[test]
    fn identifier_fields_are_stored_natively() {
        let table = user();
        let policy = IdentifierPolicy::default();
        let owner = ObjectId::new();
        let mut record = valid_user();
        record.insert("owner_id", owner);

        let validated = Validator::for_table(&table, &policy)
            .validate(record, Operation::Create)
            .unwrap();

        assert_eq!(validated.get_object_id("owner_id").unwrap(), owner);
    }

    #[test]
    fn reject_mode_fails_on_extra_properties() {
        let shape = ObjectShape::new()
            .required(["type"])
            .property("type", Property::string());

        let err = Validator::new(&shape)
            .additional_properties(AdditionalProperties::Reject)
            .validate(doc! { "type": "reset", "extra": 1 }, Operation::Create)
            .unwrap_err();

        assert!(matches!(err, TableLayerError::Validation { path, .. } if path == "extra"));
    }

    #[test]
    fn general_validator_keeps_extra_properties() {
        let shape = ObjectShape::new()
            .required(["email"])
            .property("email", Property::string());

        let payload = Validator::new(&shape)
            .validate(doc! { "email": "a@b.com", "password": "x" }, Operation::Create)
            .unwrap();

        assert_eq!(payload.get_str("password").unwrap(), "x");
    }
}
