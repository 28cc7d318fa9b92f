//! Input validation for facade operations
//!
//! Everything that crosses the facade boundary is checked here before it is
//! handed to the driver:
//! - Collection names (no system collections, no `$`)
//! - Field names (no operator injection through keys)
//! - Filters (no server-side JavaScript operators)
//! - Record shapes against an optional per-collection [`Schema`]

use crate::{Record, Result};
use bson::Bson;
use docstore_common::DocStoreError;
use std::collections::BTreeMap;
use tracing::warn;

/// Longest accepted collection name (the server allows 255)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Operators that run JavaScript on the server
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Update operators accepted in patches
pub(crate) const UPDATE_OPERATORS: &[&str] = &[
    "$set", "$unset", "$inc", "$mul", "$rename", "$setOnInsert",
    "$min", "$max", "$currentDate", "$addToSet", "$pop", "$pull",
    "$push", "$pullAll",
];

/// Logical operators accepted at the top level of a filter
pub(crate) const LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];

fn invalid(message: String) -> DocStoreError {
    DocStoreError::Validation(message)
}

/// A collection name that is safe to hand to the driver.
///
/// Non-empty, at most 120 characters, no null bytes or `$`, and not one of
/// the server's `system.*` collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName(String);

impl ValidatedCollectionName {
    pub fn new(name: &str) -> Result<Self> {
        let problem = match name {
            "" => "cannot be empty",
            n if n.len() > MAX_COLLECTION_NAME_LENGTH => "exceeds the maximum length of 120 characters",
            n if n.contains('\0') => "cannot contain null bytes",
            n if n.starts_with("system.") => "cannot start with 'system.' (reserved)",
            n if n.contains('$') => "cannot contain '$'",
            n => {
                if n.contains("..") || n.contains("//") {
                    warn!(collection = n, "Collection name contains suspicious pattern");
                }
                return Ok(Self(n.to_string()));
            }
        };
        Err(invalid(format!("Collection name {}: '{}'", problem, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a record or filter key.
///
/// Keys starting with `$` are rejected so operators cannot be smuggled in
/// through record data.
pub fn validate_field_name(name: &str) -> Result<()> {
    let problem = match name {
        "" => "cannot be empty",
        n if n.len() > MAX_FIELD_NAME_LENGTH => "exceeds the maximum length of 1024 characters",
        n if n.contains('\0') => "cannot contain null bytes",
        n if n.starts_with('$') => "cannot start with '$' (reserved for operators)",
        _ => return Ok(()),
    };
    Err(invalid(format!("Field name {}: '{}'", problem, name)))
}

/// Reject filters that use a server-side JavaScript operator at any depth
pub fn validate_query(query: &Bson) -> Result<()> {
    match query {
        Bson::Document(doc) => {
            if let Some(key) = doc.keys().find(|k| DANGEROUS_OPERATORS.contains(&k.as_str())) {
                return Err(invalid(format!("Dangerous operator '{}' is not allowed", key)));
            }
            doc.values().try_for_each(validate_query)
        }
        Bson::Array(items) => items.iter().try_for_each(validate_query),
        _ => Ok(()),
    }
}

/// Length bounds for string fields (counted in characters)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl StringConstraints {
    pub fn max_length(max: usize) -> Self {
        Self {
            min_length: None,
            max_length: Some(max),
        }
    }

    fn check(&self, field_path: &str, value: &str) -> Result<()> {
        let len = value.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(DocStoreError::Validation(format!(
                    "field '{}' must be at least {} characters, got {}",
                    field_path, min, len
                )));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(DocStoreError::Validation(format!(
                    "field '{}' must be at most {} characters, got {}",
                    field_path, max, len
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive bounds for numeric fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericConstraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl NumericConstraints {
    pub fn range(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    fn check(&self, field_path: &str, value: f64) -> Result<()> {
        if let Some(min) = self.minimum {
            if value < min {
                return Err(DocStoreError::Validation(format!(
                    "field '{}' must be >= {}, got {}",
                    field_path, min, value
                )));
            }
        }
        if let Some(max) = self.maximum {
            if value > max {
                return Err(DocStoreError::Validation(format!(
                    "field '{}' must be <= {}, got {}",
                    field_path, max, value
                )));
            }
        }
        Ok(())
    }
}

/// Expected BSON type of a field
///
/// Each variant can optionally include constraints for field-level validation.
#[derive(Debug, Clone, PartialEq)]
pub enum BsonTypeDescriptor {
    /// String type with optional length constraints
    String { constraints: StringConstraints },
    /// Integer (int32 or int64) with optional min/max constraints
    Int64 { constraints: NumericConstraints },
    /// Double-precision float with optional min/max constraints
    Double { constraints: NumericConstraints },
    Bool,
    Null,
    Binary,
    DateTime,
    /// Decimal128 with optional min/max constraints
    Decimal128 { constraints: NumericConstraints },
    ObjectId,
    /// Array with items of a specific type
    Array { items: Box<BsonTypeDescriptor> },
    /// Embedded document with its own field types
    Object { schema: BTreeMap<String, BsonTypeDescriptor> },
    /// Value can be null or the inner type
    Optional { inner: Box<BsonTypeDescriptor> },
    /// Any type (no validation)
    Any,
}

impl BsonTypeDescriptor {
    /// Unconstrained string
    pub fn string() -> Self {
        BsonTypeDescriptor::String {
            constraints: StringConstraints::default(),
        }
    }

    /// Unconstrained integer
    pub fn int64() -> Self {
        BsonTypeDescriptor::Int64 {
            constraints: NumericConstraints::default(),
        }
    }

    /// Unconstrained double
    pub fn double() -> Self {
        BsonTypeDescriptor::Double {
            constraints: NumericConstraints::default(),
        }
    }

    /// Get the human-readable type name
    pub fn type_name(&self) -> String {
        match self {
            BsonTypeDescriptor::String { .. } => "string".to_string(),
            BsonTypeDescriptor::Int64 { .. } => "int64".to_string(),
            BsonTypeDescriptor::Double { .. } => "double".to_string(),
            BsonTypeDescriptor::Bool => "bool".to_string(),
            BsonTypeDescriptor::Null => "null".to_string(),
            BsonTypeDescriptor::Binary => "binary".to_string(),
            BsonTypeDescriptor::DateTime => "datetime".to_string(),
            BsonTypeDescriptor::Decimal128 { .. } => "decimal128".to_string(),
            BsonTypeDescriptor::ObjectId => "objectid".to_string(),
            BsonTypeDescriptor::Array { items } => format!("array<{}>", items.type_name()),
            BsonTypeDescriptor::Object { .. } => "object".to_string(),
            BsonTypeDescriptor::Optional { inner } => format!("optional<{}>", inner.type_name()),
            BsonTypeDescriptor::Any => "any".to_string(),
        }
    }
}

/// Get the BSON type name for error messages
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal128",
        _ => "unknown",
    }
}

fn type_mismatch(field_path: &str, expected: &BsonTypeDescriptor, value: &Bson) -> DocStoreError {
    DocStoreError::Validation(format!(
        "field '{}' expected type '{}', got '{}'",
        field_path,
        expected.type_name(),
        bson_type_name(value)
    ))
}

/// Validate a field value against its expected type
///
/// # Arguments
/// * `field_path` - Dot-notation path to the field (e.g., "address.city")
/// * `value` - The BSON value to validate
/// * `expected` - The expected type descriptor
pub fn validate_field(field_path: &str, value: &Bson, expected: &BsonTypeDescriptor) -> Result<()> {
    match (expected, value) {
        (BsonTypeDescriptor::Any, _) => Ok(()),

        (BsonTypeDescriptor::Optional { .. }, Bson::Null) => Ok(()),
        (BsonTypeDescriptor::Optional { inner }, _) => validate_field(field_path, value, inner),

        (BsonTypeDescriptor::String { constraints }, Bson::String(s)) => {
            constraints.check(field_path, s)
        }

        (BsonTypeDescriptor::Int64 { constraints }, Bson::Int64(n)) => {
            constraints.check(field_path, *n as f64)
        }
        (BsonTypeDescriptor::Int64 { constraints }, Bson::Int32(n)) => {
            constraints.check(field_path, *n as f64)
        }

        (BsonTypeDescriptor::Double { constraints }, Bson::Double(n)) => {
            constraints.check(field_path, *n)
        }

        (BsonTypeDescriptor::Decimal128 { constraints }, Bson::Decimal128(d)) => {
            // Decimal128 has no numeric accessors; compare through its string form
            match d.to_string().parse::<f64>() {
                Ok(n) => constraints.check(field_path, n),
                Err(_) => Ok(()),
            }
        }

        (BsonTypeDescriptor::Bool, Bson::Boolean(_))
        | (BsonTypeDescriptor::Null, Bson::Null)
        | (BsonTypeDescriptor::Binary, Bson::Binary(_))
        | (BsonTypeDescriptor::DateTime, Bson::DateTime(_))
        | (BsonTypeDescriptor::ObjectId, Bson::ObjectId(_)) => Ok(()),

        (BsonTypeDescriptor::Array { items }, Bson::Array(arr)) => {
            for (index, item) in arr.iter().enumerate() {
                let item_path = format!("{}[{}]", field_path, index);
                validate_field(&item_path, item, items)?;
            }
            Ok(())
        }

        (BsonTypeDescriptor::Object { schema }, Bson::Document(doc)) => {
            for (field_name, field_type) in schema {
                if let Some(field_value) = doc.get(field_name) {
                    let nested_path = format!("{}.{}", field_path, field_name);
                    validate_field(&nested_path, field_value, field_type)?;
                }
            }
            Ok(())
        }

        _ => Err(type_mismatch(field_path, expected, value)),
    }
}

/// Pluggable record check registered per collection on a
/// [`ConnectionHandle`](crate::ConnectionHandle)
pub trait RecordValidator: Send + Sync {
    /// Check a full record before it is inserted
    fn validate(&self, record: &Record) -> Result<()>;

    /// Check the fields a patch will `$set`; missing fields are fine here
    fn validate_patch(&self, _patch: &Record) -> Result<()> {
        Ok(())
    }
}

/// A single field of a [`Schema`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub ty: BsonTypeDescriptor,
    pub required: bool,
}

/// Declared shape of the records in one collection
///
/// ```ignore
/// let schema = Schema::new()
///     .required("title", BsonTypeDescriptor::String { constraints: StringConstraints::max_length(200) })
///     .field("views", BsonTypeDescriptor::int64());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    allow_extra: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            allow_extra: true,
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an optional field
    pub fn field(mut self, name: impl Into<String>, ty: BsonTypeDescriptor) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: false });
        self
    }

    /// Declare a field that must be present and non-null
    pub fn required(mut self, name: impl Into<String>, ty: BsonTypeDescriptor) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: true });
        self
    }

    /// Reject fields that are not declared (`_id` is always allowed)
    pub fn deny_extra(mut self) -> Self {
        self.allow_extra = false;
        self
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldSpec> {
        &self.fields
    }

    fn check_extra(&self, key: &str) -> Result<()> {
        if !self.allow_extra && key != "_id" && !self.fields.contains_key(key) {
            return Err(DocStoreError::Validation(format!(
                "field '{}' is not declared in the schema",
                key
            )));
        }
        Ok(())
    }
}

impl RecordValidator for Schema {
    fn validate(&self, record: &Record) -> Result<()> {
        for (name, spec) in &self.fields {
            match record.get(name) {
                None | Some(Bson::Null) if spec.required => {
                    return Err(DocStoreError::Validation(format!(
                        "field '{}' is required",
                        name
                    )))
                }
                None | Some(Bson::Null) => {}
                Some(value) => validate_field(name, value, &spec.ty)?,
            }
        }
        for key in record.keys() {
            self.check_extra(key)?;
        }
        Ok(())
    }

    fn validate_patch(&self, patch: &Record) -> Result<()> {
        for (key, value) in patch {
            // Dotted paths reach into embedded documents; only top-level keys are checked
            if key.contains('.') {
                continue;
            }
            match self.fields.get(key) {
                Some(spec) if spec.required && matches!(value, Bson::Null) => {
                    return Err(DocStoreError::Validation(format!(
                        "field '{}' is required",
                        key
                    )))
                }
                Some(_) if matches!(value, Bson::Null) => {}
                Some(spec) => validate_field(key, value, &spec.ty)?,
                None => self.check_extra(key)?,
            }
        }
        Ok(())
    }
}
