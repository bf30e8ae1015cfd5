//! Document values
//!
//! [`Value`] is the in-memory representation of a document slot, both in its
//! read form (what callers see) and its storage form (what the document store
//! holds). Field coercion converts between the two.
//!
//! Dict keys are values, not strings: integer-keyed dicts keep `Int` keys in
//! read form and `String` keys in storage form.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use uuid::Uuid;

use super::array::NumericArray;
use super::document::DocumentType;
use super::errors::{SchemaError, SchemaResult};

/// A document value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ObjectId([u8; 12]),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Binary(Vec<u8>),
    Array(NumericArray),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Document(Document),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Builds a dict with string keys
    pub fn str_dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), v))
                .collect(),
        )
    }

    /// Builds a list of `[x, y]` float pairs
    pub fn points(points: &[[f64; 2]]) -> Self {
        Value::List(
            points
                .iter()
                .map(|[x, y]| Value::List(vec![Value::Float(*x), Value::Float(*y)]))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Looks up a string key in a dict value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
                Value::String(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Returns the value kind for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::ObjectId(_) => "objectid",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Document(_) => "document",
        }
    }

    /// Converts to the JSON exchange form used by the document store.
    ///
    /// Binary-like values become `{"$binary": base64}`, datetimes
    /// `{"$date": rfc3339}`, object ids `{"$oid": hex}` and UUIDs
    /// `{"$uuid": hyphenated}`. Dict keys are rendered as strings.
    pub fn to_json(&self) -> SchemaResult<JsonValue> {
        Ok(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| SchemaError::Codec(format!("{} has no JSON representation", f)))?,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::ObjectId(oid) => tagged("$oid", JsonValue::String(object_id_hex(oid))),
            Value::Uuid(u) => tagged("$uuid", JsonValue::String(u.hyphenated().to_string())),
            Value::Date(d) => tagged(
                "$date",
                JsonValue::String(format!("{}T00:00:00+00:00", d.format("%Y-%m-%d"))),
            ),
            Value::DateTime(dt) => tagged("$date", JsonValue::String(dt.to_rfc3339())),
            Value::Binary(bytes) => tagged("$binary", JsonValue::String(BASE64.encode(bytes))),
            Value::Array(array) => tagged("$binary", JsonValue::String(BASE64.encode(array.to_bytes()?))),
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<SchemaResult<Vec<_>>>()?,
            ),
            Value::Dict(entries) => {
                let mut map = JsonMap::new();
                for (k, v) in entries {
                    map.insert(key_string(k)?, v.to_json()?);
                }
                JsonValue::Object(map)
            }
            Value::Document(doc) => {
                let mut map = JsonMap::new();
                map.insert("_cls".into(), JsonValue::String(doc.doc_type.name().to_string()));
                for (k, v) in &doc.fields {
                    map.insert(k.clone(), v.to_json()?);
                }
                JsonValue::Object(map)
            }
        })
    }

    /// Parses the JSON exchange form. Documents come back as string-keyed dicts.
    pub fn from_json(json: &JsonValue) -> SchemaResult<Self> {
        Ok(match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(
                    n.as_f64()
                        .ok_or_else(|| SchemaError::Codec(format!("Unrepresentable number {}", n)))?,
                ),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<SchemaResult<Vec<_>>>()?,
            ),
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some(value) = parse_tagged(map)? {
                        return Ok(value);
                    }
                }
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    entries.push((Value::String(k.clone()), Value::from_json(v)?));
                }
                Value::Dict(entries)
            }
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NumericArray> for Value {
    fn from(v: NumericArray) -> Self {
        Value::Array(v)
    }
}

/// An instance of an embedded document type
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_type: Arc<DocumentType>,
    pub fields: IndexMap<String, Value>,
}

impl Document {
    pub fn new(doc_type: Arc<DocumentType>) -> Self {
        Self {
            doc_type,
            fields: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.doc_type.name() == other.doc_type.name() && self.fields == other.fields
    }
}

/// Renders a 12-byte object id as lowercase hex
pub fn object_id_hex(oid: &[u8; 12]) -> String {
    oid.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parses a 24-character hex object id
pub fn parse_object_id(s: &str) -> Option<[u8; 12]> {
    if s.len() != 24 || !s.is_ascii() {
        return None;
    }
    let mut out = [0u8; 12];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

fn tagged(tag: &str, value: JsonValue) -> JsonValue {
    let mut map = JsonMap::new();
    map.insert(tag.to_string(), value);
    JsonValue::Object(map)
}

fn parse_tagged(map: &JsonMap<String, JsonValue>) -> SchemaResult<Option<Value>> {
    let Some((tag, JsonValue::String(s))) = map.iter().next() else {
        return Ok(None);
    };
    let value = match tag.as_str() {
        "$binary" => Value::Binary(
            BASE64
                .decode(s)
                .map_err(|e| SchemaError::Codec(format!("Invalid base64 payload: {}", e)))?,
        ),
        "$date" => Value::DateTime(
            DateTime::parse_from_rfc3339(s)
                .map_err(|e| SchemaError::Codec(format!("Invalid date '{}': {}", s, e)))?,
        ),
        "$oid" => Value::ObjectId(
            parse_object_id(s).ok_or_else(|| SchemaError::Codec(format!("Invalid object id '{}'", s)))?,
        ),
        "$uuid" => Value::Uuid(
            Uuid::parse_str(s).map_err(|e| SchemaError::Codec(format!("Invalid uuid '{}': {}", s, e)))?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn key_string(key: &Value) -> SchemaResult<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        other => Err(SchemaError::Codec(format!(
            "Dict keys must be strings or integers, found {}",
            other.type_name()
        ))),
    }
}
