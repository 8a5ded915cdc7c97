//! Recursive data types for agent inputs and outputs.
//!
//! A [`DataType`] describes one named field.  Object fields carry their
//! children in an [`OrderedRecord`], array fields carry an item type.  The
//! same structure is used three ways:
//!
//! 1. built from a compact plain schema via [`schema_to_data_type`],
//! 2. projected to JSON Schema for schema-constrained model calls via
//!    [`to_json_schema`] / [`outputs_to_json_schema`],
//! 3. checked against runtime values via [`validate_value`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::record::{Identified, OrderedRecord};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single typed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    /// Stable id, unique within the enclosing record.
    pub id: String,
    /// Field name used in runtime values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human readable description, forwarded to JSON Schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the runtime value must be present and non-null.
    #[serde(default)]
    pub required: bool,
    /// The variant-specific part.
    #[serde(flatten)]
    pub kind: DataKind,
}

/// The type discriminator plus nested structure for composite types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataKind {
    String,
    Number,
    Boolean,
    Object {
        #[serde(default)]
        properties: OrderedRecord<DataType>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<DataType>>,
    },
}

impl DataKind {
    /// The discriminator string as it appears in schemas.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object { .. } => "object",
            Self::Array { .. } => "array",
        }
    }
}

impl Identified for DataType {
    fn id(&self) -> &str {
        &self.id
    }
}

impl DataType {
    /// Create a field with a fresh id.
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: Some(name.into()),
            description: None,
            required: false,
            kind,
        }
    }

    /// Builder: mark the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder: set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder: attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The key used for this field in runtime values: the name, or the id
    /// when the field is unnamed.
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Plain schema conversion
// ---------------------------------------------------------------------------

/// Convert a plain nested schema into typed fields.
///
/// The input maps field names to nodes of the form
/// `{ "type": ..., "description"?, "required"?, "properties"?, "items"? }`.
/// Every produced field gets a fresh UUID v7 id.
pub fn schema_to_data_type(schema: &Value) -> Result<OrderedRecord<DataType>> {
    let fields = schema.as_object().ok_or_else(|| CoreError::InvalidSchema {
        reason: "schema root must be an object of fields".into(),
    })?;
    convert_fields(fields)
}

fn convert_fields(fields: &Map<String, Value>) -> Result<OrderedRecord<DataType>> {
    let mut record = OrderedRecord::new();
    for (name, node) in fields {
        record.push(convert_node(Some(name), name, node)?)?;
    }
    Ok(record)
}

fn convert_node(name: Option<&str>, path: &str, node: &Value) -> Result<DataType> {
    let node = node.as_object().ok_or_else(|| CoreError::InvalidSchema {
        reason: format!("field `{path}` must be an object"),
    })?;
    let type_name = node.get("type").and_then(Value::as_str).unwrap_or_default();

    let kind = match type_name {
        "string" => DataKind::String,
        "number" => DataKind::Number,
        "boolean" => DataKind::Boolean,
        "object" => {
            let properties = match node.get("properties") {
                Some(Value::Object(props)) => convert_fields(props)?,
                Some(Value::Null) | None => OrderedRecord::new(),
                Some(_) => {
                    return Err(CoreError::InvalidSchema {
                        reason: format!("`{path}.properties` must be an object"),
                    });
                }
            };
            DataKind::Object { properties }
        }
        "array" => {
            let items = match node.get("items") {
                Some(Value::Null) | None => None,
                Some(items) => Some(Box::new(convert_node(None, &format!("{path}[]"), items)?)),
            };
            DataKind::Array { items }
        }
        other => {
            return Err(CoreError::UnknownDataType {
                field: path.to_owned(),
                type_name: other.to_owned(),
            });
        }
    };

    Ok(DataType {
        id: Uuid::now_v7().to_string(),
        name: name.map(str::to_owned),
        description: node
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned),
        required: node
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        kind,
    })
}

// ---------------------------------------------------------------------------
// JSON Schema projection
// ---------------------------------------------------------------------------

/// Project a field to JSON Schema.
///
/// Objects are closed (`additionalProperties: false`) and list their
/// required children; arrays recurse into their items.  Absent optional
/// attributes are left out rather than emitted as `null`.
pub fn to_json_schema(data_type: &DataType) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), json!(data_type.kind.type_name()));
    if let Some(description) = &data_type.description {
        schema.insert("description".into(), json!(description));
    }

    match &data_type.kind {
        DataKind::Object { properties } => {
            let (props, required) = object_members(properties.iter());
            schema.insert("properties".into(), Value::Object(props));
            schema.insert("required".into(), json!(required));
            schema.insert("additionalProperties".into(), json!(false));
        }
        DataKind::Array { items: Some(items) } => {
            schema.insert("items".into(), to_json_schema(items));
        }
        _ => {}
    }

    Value::Object(schema)
}

/// Build the top-level object schema for a set of structured outputs.
pub fn outputs_to_json_schema<'a>(outputs: impl IntoIterator<Item = &'a DataType>) -> Value {
    let (props, required) = object_members(outputs);
    json!({
        "type": "object",
        "properties": props,
        "required": required,
        "additionalProperties": false,
    })
}

fn object_members<'a>(
    children: impl IntoIterator<Item = &'a DataType>,
) -> (Map<String, Value>, Vec<String>) {
    let mut props = Map::new();
    let mut required = Vec::new();
    for child in children {
        let key = child.key().to_owned();
        if child.required {
            required.push(key.clone());
        }
        props.insert(key, to_json_schema(child));
    }
    (props, required)
}

// ---------------------------------------------------------------------------
// Runtime validation
// ---------------------------------------------------------------------------

/// Check a name-keyed value object against declared fields.
///
/// Required fields must be present and non-null; any present value must
/// match its declared type.  Keys that are not declared are ignored.
pub fn validate_value(fields: &OrderedRecord<DataType>, value: &Map<String, Value>) -> Result<()> {
    validate_fields(fields, value, "")
}

fn validate_fields(
    fields: &OrderedRecord<DataType>,
    value: &Map<String, Value>,
    prefix: &str,
) -> Result<()> {
    for field in fields {
        let path = format!("{prefix}{}", field.key());
        match value.get(field.key()) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(CoreError::ValidationFailed {
                        field: path,
                        reason: "required value is missing".into(),
                    });
                }
            }
            Some(v) => validate_one(field, v, &path)?,
        }
    }
    Ok(())
}

fn validate_one(field: &DataType, value: &Value, path: &str) -> Result<()> {
    let mismatch = || CoreError::ValidationFailed {
        field: path.to_owned(),
        reason: format!("expected {}", field.kind.type_name()),
    };

    match (&field.kind, value) {
        (DataKind::String, Value::String(_))
        | (DataKind::Number, Value::Number(_))
        | (DataKind::Boolean, Value::Bool(_)) => Ok(()),
        (DataKind::Object { properties }, Value::Object(map)) => {
            validate_fields(properties, map, &format!("{path}."))
        }
        (DataKind::Array { items }, Value::Array(values)) => {
            let Some(items) = items else {
                return Ok(());
            };
            for (index, item) in values.iter().enumerate() {
                let item_path = format!("{path}[{index}]");
                if item.is_null() {
                    if items.required {
                        return Err(CoreError::ValidationFailed {
                            field: item_path,
                            reason: "required value is missing".into(),
                        });
                    }
                    continue;
                }
                validate_one(items, item, &item_path)?;
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
