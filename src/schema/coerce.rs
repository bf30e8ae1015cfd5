//! Storage coercion
//!
//! `coerce_for_storage` converts a read-form value into the form the document
//! store holds; `coerce_from_storage` converts back. Null passes through both.
//!
//! | Kind        | Storage form                         | Read form                |
//! |-------------|--------------------------------------|--------------------------|
//! | ObjectId    | 12 raw bytes                         | 24-char hex string       |
//! | Date        | datetime at midnight UTC             | date, truncated in UTC   |
//! | IntDict     | string keys                          | integer keys             |
//! | Geo*        | `{type, coordinates}`                | bare coordinates         |
//! | Vector/Array| compressed array blob                | dense numeric array      |
//! | Embedded    | dict with `_cls`                     | document                 |

use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};

use super::array::{ArrayData, NumericArray};
use super::embedded::EmbeddedDocumentField;
use super::errors::{SchemaError, SchemaResult};
use super::field::{DictFlavor, Field, FieldKind};
use super::types::GeoKind;
use super::validator::{to_float, to_int};
use super::value::{object_id_hex, parse_object_id, Document, Value};
use uuid::Uuid;

impl Field {
    /// Converts a read-form value to its storage form
    pub fn coerce_for_storage(&self, value: &Value) -> SchemaResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let path = self.path().unwrap_or(self.name());

        match self.kind() {
            FieldKind::ObjectId => match value {
                Value::String(s) => parse_object_id(s)
                    .map(Value::ObjectId)
                    .ok_or_else(|| invalid(path, format!("'{}' is not a valid ObjectId", s))),
                other => Ok(other.clone()),
            },

            FieldKind::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s)
                    .map(Value::Uuid)
                    .map_err(|_| invalid(path, format!("Could not convert '{}' to UUID", s))),
                other => Ok(other.clone()),
            },

            FieldKind::Int | FieldKind::FrameNumber => {
                to_int(value).map(Value::Int).map_err(|rule| invalid(path, rule))
            }

            FieldKind::Float { .. } => {
                to_float(value).map(Value::Float).map_err(|rule| invalid(path, rule))
            }

            FieldKind::Date => match value {
                Value::Date(date) => {
                    let midnight = date.and_time(NaiveTime::MIN);
                    let offset = FixedOffset::east_opt(0)
                        .ok_or_else(|| SchemaError::Codec("UTC offset unavailable".into()))?;
                    Ok(Value::DateTime(Utc.from_utc_datetime(&midnight).with_timezone(&offset)))
                }
                other => Ok(other.clone()),
            },

            FieldKind::List { field: element, .. } => match (value, element) {
                (Value::List(items), Some(element)) => Ok(Value::List(
                    items
                        .iter()
                        .map(|item| element.coerce_for_storage(item))
                        .collect::<SchemaResult<Vec<_>>>()?,
                )),
                (other, _) => Ok(other.clone()),
            },

            FieldKind::Dict { flavor, field: element } => match value {
                Value::Dict(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (key, item) in entries {
                        let key = match (flavor, key) {
                            (DictFlavor::IntKeys | DictFlavor::Targets, Value::Int(i)) => {
                                Value::String(i.to_string())
                            }
                            (_, other) => other.clone(),
                        };
                        let item = match element {
                            Some(element) => element.coerce_for_storage(item)?,
                            None => item.clone(),
                        };
                        out.push((key, item));
                    }
                    Ok(Value::Dict(out))
                }
                other => Ok(other.clone()),
            },

            FieldKind::Geo(kind) => Ok(geo_for_storage(*kind, value)),

            FieldKind::Vector | FieldKind::Array => match value {
                Value::Array(array) => Ok(Value::Binary(array.to_bytes()?)),
                Value::List(items) => {
                    let array = array_from_values(items).map_err(|rule| invalid(path, rule))?;
                    Ok(Value::Binary(array.to_bytes()?))
                }
                other => Ok(other.clone()),
            },

            FieldKind::EmbeddedDocument(embedded) => match value {
                Value::Document(doc) => document_for_storage(embedded, doc),
                other => Ok(other.clone()),
            },

            FieldKind::Boolean | FieldKind::String | FieldKind::DateTime => Ok(value.clone()),
        }
    }

    /// Converts a storage-form value to its read form
    pub fn coerce_from_storage(&self, value: &Value) -> SchemaResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self.kind() {
            FieldKind::ObjectId => match value {
                Value::ObjectId(oid) => Ok(Value::String(object_id_hex(oid))),
                other => Ok(other.clone()),
            },

            FieldKind::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s)
                    .map(Value::Uuid)
                    .map_err(|e| SchemaError::Codec(format!("Stored UUID '{}' is invalid: {}", s, e))),
                other => Ok(other.clone()),
            },

            FieldKind::Int | FieldKind::FrameNumber => match value {
                Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Int(*f as i64)),
                other => Ok(other.clone()),
            },

            FieldKind::Float { .. } => match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                other => Ok(other.clone()),
            },

            // Always through UTC: the stored instant is midnight UTC whatever
            // offset it was loaded with
            FieldKind::Date => match value {
                Value::DateTime(dt) => Ok(Value::Date(dt.with_timezone(&Utc).date_naive())),
                other => Ok(other.clone()),
            },

            FieldKind::List { field: element, .. } => match (value, element) {
                (Value::List(items), Some(element)) => Ok(Value::List(
                    items
                        .iter()
                        .map(|item| element.coerce_from_storage(item))
                        .collect::<SchemaResult<Vec<_>>>()?,
                )),
                (other, _) => Ok(other.clone()),
            },

            FieldKind::Dict { flavor, field: element } => match value {
                Value::Dict(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (key, item) in entries {
                        let key = match (flavor, key) {
                            (DictFlavor::IntKeys | DictFlavor::Targets, Value::String(s)) => {
                                Value::Int(s.parse::<i64>().map_err(|_| {
                                    SchemaError::Codec(format!("Stored int dict key '{}' is not an integer", s))
                                })?)
                            }
                            (_, other) => other.clone(),
                        };
                        let item = match element {
                            Some(element) => element.coerce_from_storage(item)?,
                            None => item.clone(),
                        };
                        out.push((key, item));
                    }
                    Ok(Value::Dict(out))
                }
                other => Ok(other.clone()),
            },

            FieldKind::Geo(_) => match value {
                Value::Dict(_) => value.get("coordinates").cloned().ok_or_else(|| {
                    SchemaError::Codec("Stored geometry has no coordinates".into())
                }),
                other => Ok(other.clone()),
            },

            FieldKind::Vector | FieldKind::Array => match value {
                Value::Binary(bytes) => Ok(Value::Array(NumericArray::from_bytes(bytes)?)),
                Value::List(items) => array_from_values(items)
                    .map(Value::Array)
                    .map_err(SchemaError::Codec),
                other => Ok(other.clone()),
            },

            FieldKind::EmbeddedDocument(embedded) => match value {
                Value::Dict(entries) => document_from_storage(embedded, entries),
                other => Ok(other.clone()),
            },

            FieldKind::Boolean | FieldKind::String | FieldKind::DateTime => Ok(value.clone()),
        }
    }
}

fn invalid(path: &str, rule: impl Into<String>) -> SchemaError {
    SchemaError::validation(rule).at_path(path)
}

fn geo_for_storage(kind: GeoKind, value: &Value) -> Value {
    if matches!(value, Value::Dict(_)) {
        return value.clone();
    }
    Value::str_dict([
        ("type", Value::string(kind.geojson_type())),
        ("coordinates", value.clone()),
    ])
}

fn document_for_storage(embedded: &EmbeddedDocumentField, doc: &Document) -> SchemaResult<Value> {
    let mut entries = Vec::with_capacity(doc.fields.len() + 1);
    entries.push((Value::string("_cls"), Value::string(doc.doc_type.name())));
    for (name, item) in &doc.fields {
        let stored = match embedded.fields().get(name) {
            Some(field) => field.coerce_for_storage(item)?,
            None => item.clone(),
        };
        entries.push((Value::String(name.clone()), stored));
    }
    Ok(Value::Dict(entries))
}

fn document_from_storage(
    embedded: &EmbeddedDocumentField,
    entries: &[(Value, Value)],
) -> SchemaResult<Value> {
    let mut doc = Document::new(embedded.document_type().clone());
    for (key, item) in entries {
        let Value::String(name) = key else {
            return Err(SchemaError::Codec(format!(
                "Stored document keys must be strings, found {}",
                key.type_name()
            )));
        };
        if name == "_cls" {
            continue;
        }
        let read = match embedded.fields().get(name) {
            Some(field) => field.coerce_from_storage(item)?,
            None => item.clone(),
        };
        doc.fields.insert(name.clone(), read);
    }
    Ok(Value::Document(doc))
}

/// Builds a 1-D array from a numeric sequence. Any float makes the array
/// float; otherwise all-bool stays bool and ints stay ints.
fn array_from_values(items: &[Value]) -> Result<NumericArray, String> {
    if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Bool(_))) {
        let values = items.iter().map(|v| matches!(v, Value::Bool(true))).collect::<Vec<_>>();
        return NumericArray::new(vec![values.len()], ArrayData::Bool(values)).map_err(|e| e.to_string());
    }

    let mut has_float = false;
    for item in items {
        match item {
            Value::Float(_) => has_float = true,
            Value::Int(_) | Value::Bool(_) => {}
            other => {
                return Err(format!(
                    "Vector fields only accept numeric sequences; found {}",
                    other.type_name()
                ))
            }
        }
    }

    if has_float {
        let values = items
            .iter()
            .map(|v| match v {
                Value::Float(f) => *f,
                Value::Int(i) => *i as f64,
                Value::Bool(b) => *b as i64 as f64,
                _ => 0.0,
            })
            .collect();
        Ok(NumericArray::from_f64(values))
    } else {
        let values = items
            .iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                Value::Bool(b) => *b as i64,
                _ => 0,
            })
            .collect();
        Ok(NumericArray::from_i64(values))
    }
}
