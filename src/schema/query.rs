//! Schema query options
//!
//! [`SchemaQuery`] is the typed option set accepted by every schema-returning
//! accessor. [`SchemaQueryConfig`] is its serde form, naming field types and
//! document types by string, for callers that receive options as JSON.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::document::{DocumentType, DocumentTypeRegistry};
use super::errors::{SchemaError, SchemaResult};
use super::types::FieldType;

/// When constraints apply relative to flattening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlattenMode {
    /// Filter top-level fields, then flatten what survives
    Before,
    /// Flatten everything, then filter the flat paths
    #[default]
    After,
    Both,
}

impl FlattenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlattenMode::Before => "before",
            FlattenMode::After => "after",
            FlattenMode::Both => "both",
        }
    }

    pub fn filters_before(&self) -> bool {
        matches!(self, FlattenMode::Before | FlattenMode::Both)
    }

    pub fn filters_after(&self) -> bool {
        matches!(self, FlattenMode::After | FlattenMode::Both)
    }
}

impl fmt::Display for FlattenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlattenMode {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(FlattenMode::Before),
            "after" => Ok(FlattenMode::After),
            "both" => Ok(FlattenMode::Both),
            other => Err(SchemaError::constraint(
                "mode",
                format!(
                    "Invalid mode={}. Supported modes are (\"before\", \"after\", \"both\")",
                    other
                ),
            )),
        }
    }
}

/// Type constraints. Every supplied constraint must hold for a field to match.
#[derive(Debug, Clone, Default)]
pub struct TypeConstraints {
    /// Field must be one of these types (or a subtype)
    pub ftype: Option<Vec<FieldType>>,
    /// Embedded field's document type must derive from one of these
    pub embedded_doc_type: Option<Vec<Arc<DocumentType>>>,
    /// Virtuality must equal this exactly
    pub is_virtual: Option<bool>,
}

impl TypeConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ftype(mut self, ftype: FieldType) -> Self {
        self.ftype.get_or_insert_with(Vec::new).push(ftype);
        self
    }

    pub fn embedded_doc_type(mut self, doc_type: &Arc<DocumentType>) -> Self {
        self.embedded_doc_type
            .get_or_insert_with(Vec::new)
            .push(Arc::clone(doc_type));
        self
    }

    pub fn is_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = Some(is_virtual);
        self
    }

    /// True when no constraint was supplied
    pub fn is_empty(&self) -> bool {
        self.ftype.is_none() && self.embedded_doc_type.is_none() && self.is_virtual.is_none()
    }
}

/// Options for schema-returning accessors
#[derive(Debug, Clone, Default)]
pub struct SchemaQuery {
    pub constraints: TypeConstraints,
    /// Keep `_`-prefixed fields
    pub include_private: bool,
    /// Return dotted paths for everything nested
    pub flat: bool,
    /// Only consulted when `flat` is set; defaults to [`FlattenMode::After`]
    pub mode: Option<FlattenMode>,
}

impl SchemaQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constraints(mut self, constraints: TypeConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn ftype(mut self, ftype: FieldType) -> Self {
        self.constraints = self.constraints.ftype(ftype);
        self
    }

    pub fn embedded_doc_type(mut self, doc_type: &Arc<DocumentType>) -> Self {
        self.constraints = self.constraints.embedded_doc_type(doc_type);
        self
    }

    pub fn is_virtual(mut self, is_virtual: bool) -> Self {
        self.constraints = self.constraints.is_virtual(is_virtual);
        self
    }

    pub fn include_private(mut self, include_private: bool) -> Self {
        self.include_private = include_private;
        self
    }

    pub fn flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    pub fn mode(mut self, mode: FlattenMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// A single name or a list of names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn names(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(name) => vec![name.as_str()],
            OneOrMany::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Serde form of [`SchemaQuery`].
///
/// ```json
/// {"ftype": "EmbeddedDocumentField", "embedded_doc_type": ["Detection"],
///  "virtual": false, "include_private": false, "flat": true, "mode": "before"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaQueryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftype: Option<OneOrMany>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_doc_type: Option<OneOrMany>,

    #[serde(default, rename = "virtual", skip_serializing_if = "Option::is_none")]
    pub is_virtual: Option<bool>,

    #[serde(default = "default_include_private")]
    pub include_private: bool,

    #[serde(default = "default_flat")]
    pub flat: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

fn default_include_private() -> bool {
    false
}

fn default_flat() -> bool {
    false
}

impl SchemaQueryConfig {
    /// Parses the JSON form
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SchemaError::constraint("query", format!("Malformed query options: {}", e)))
    }

    /// Resolves names against `registry`.
    ///
    /// `mode` is parsed only when `flat` is set; otherwise it is ignored.
    pub fn resolve(&self, registry: &DocumentTypeRegistry) -> SchemaResult<SchemaQuery> {
        let ftype = match &self.ftype {
            Some(names) => Some(
                names
                    .names()
                    .into_iter()
                    .map(FieldType::from_str)
                    .collect::<SchemaResult<Vec<_>>>()?,
            ),
            None => None,
        };

        let embedded_doc_type = match &self.embedded_doc_type {
            Some(names) => Some(
                names
                    .names()
                    .into_iter()
                    .map(|name| registry.resolve(name))
                    .collect::<SchemaResult<Vec<_>>>()?,
            ),
            None => None,
        };

        let mode = match (&self.mode, self.flat) {
            (Some(mode), true) => Some(mode.parse()?),
            _ => None,
        };

        Ok(SchemaQuery {
            constraints: TypeConstraints {
                ftype,
                embedded_doc_type,
                is_virtual: self.is_virtual,
            },
            include_private: self.include_private,
            flat: self.flat,
            mode,
        })
    }
}
