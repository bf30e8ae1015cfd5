//! Persisted field records
//!
//! A [`FieldRecord`] is the shape a field takes in the dataset's schema
//! document. It carries the kind tag and kind parameters, the shared metadata,
//! and the source form of a virtual expression. Compiled stages, bindings and
//! view overlays are never recorded.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::document::DocumentTypeRegistry;
use super::embedded::EmbeddedDocumentField;
use super::errors::{SchemaError, SchemaResult};
use super::field::{DictFlavor, Field, FieldKind, ListFlavor};
use super::types::{FieldType, GeoKind};

fn default_nullable() -> bool {
    true
}

/// Serialised form of a [`Field`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,

    /// Type name, e.g. `"ListField"`
    pub ftype: String,

    /// Element record for list and dict kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfield: Option<Box<FieldRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_doc_type: Option<String>,

    /// Declared nested fields of an embedded document field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldRecord>>,

    /// Document type defaults that no longer hold their default slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displaced_defaults: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub info: Option<JsonMap<String, JsonValue>>,

    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<JsonValue>,
}

impl FieldRecord {
    /// Records a field
    pub fn from_field(field: &Field) -> Self {
        let embedded = field.as_embedded();
        let (min_value, max_value) = match field.kind() {
            FieldKind::Float { min_value, max_value } => (*min_value, *max_value),
            _ => (None, None),
        };

        Self {
            name: field.name().to_string(),
            ftype: field.field_type().type_name().to_string(),
            subfield: field.element_field().map(|e| Box::new(Self::from_field(e))),
            embedded_doc_type: embedded.map(|e| e.document_type().name().to_string()),
            fields: embedded.map(|e| e.declared_fields().into_iter().map(Self::from_field).collect()),
            displaced_defaults: embedded
                .map(|e| e.displaced_defaults().to_vec())
                .filter(|names| !names.is_empty()),
            min_value,
            max_value,
            description: field.description().map(str::to_string),
            info: field.info().cloned(),
            required: field.required(),
            nullable: field.nullable(),
            expr: field.virtual_expr().map(|e| e.source().clone()),
        }
    }

    /// Rebuilds a detached field, resolving document types through `registry`
    pub fn to_field(&self, registry: &DocumentTypeRegistry) -> SchemaResult<Field> {
        let ftype: FieldType = self.ftype.parse()?;
        let element = self
            .subfield
            .as_ref()
            .map(|record| record.to_field(registry))
            .transpose()?
            .map(|f| Box::new(f.renamed(&self.name)));

        let kind = match ftype {
            FieldType::ObjectId => FieldKind::ObjectId,
            FieldType::Uuid => FieldKind::Uuid,
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Int => FieldKind::Int,
            FieldType::FrameNumber => FieldKind::FrameNumber,
            FieldType::Float => FieldKind::Float {
                min_value: self.min_value,
                max_value: self.max_value,
            },
            FieldType::String => FieldKind::String,
            FieldType::Date => FieldKind::Date,
            FieldType::DateTime => FieldKind::DateTime,
            FieldType::List => list(ListFlavor::Plain, element),
            FieldType::HeatmapRange => list(ListFlavor::HeatmapRange, element),
            FieldType::Keypoints => list(ListFlavor::Keypoints, element),
            FieldType::PolylinePoints => list(ListFlavor::PolylinePoints, element),
            FieldType::FrameSupport => list(ListFlavor::FrameSupport, element),
            FieldType::Classes => list(ListFlavor::Classes, element),
            FieldType::EmbeddedDocumentList => list(ListFlavor::EmbeddedDocuments, element),
            FieldType::Dict => dict(DictFlavor::Plain, element),
            FieldType::IntDict => dict(DictFlavor::IntKeys, element),
            FieldType::Targets => dict(DictFlavor::Targets, element),
            FieldType::GeoPoint => FieldKind::Geo(GeoKind::Point),
            FieldType::GeoLineString => FieldKind::Geo(GeoKind::LineString),
            FieldType::GeoPolygon => FieldKind::Geo(GeoKind::Polygon),
            FieldType::GeoMultiPoint => FieldKind::Geo(GeoKind::MultiPoint),
            FieldType::GeoMultiLineString => FieldKind::Geo(GeoKind::MultiLineString),
            FieldType::GeoMultiPolygon => FieldKind::Geo(GeoKind::MultiPolygon),
            FieldType::Vector => FieldKind::Vector,
            FieldType::Array => FieldKind::Array,
            FieldType::EmbeddedDocument => {
                let doc_name = self.embedded_doc_type.as_deref().ok_or_else(|| {
                    SchemaError::Codec(format!(
                        "Record for '{}' has no embedded document type",
                        self.name
                    ))
                })?;
                let document_type = registry.resolve(doc_name)?;
                let fields = self
                    .fields
                    .iter()
                    .flatten()
                    .map(|record| record.to_field(registry))
                    .collect::<SchemaResult<Vec<_>>>()?;
                let displaced = self.displaced_defaults.clone().unwrap_or_default();
                FieldKind::EmbeddedDocument(EmbeddedDocumentField::with_fields_excluding(
                    document_type,
                    fields,
                    displaced,
                ))
            }
            FieldType::Field | FieldType::Geo => {
                return Err(SchemaError::Codec(format!(
                    "Record for '{}' has abstract type {}",
                    self.name, ftype
                )))
            }
        };

        let mut field = Field::new(self.name.clone(), kind)
            .with_required(self.required)
            .with_nullable(self.nullable);
        field.set_description(self.description.clone());
        field.set_info(self.info.clone());
        if let Some(expr) = &self.expr {
            field = field.with_expr(expr.clone());
        }
        Ok(field)
    }

    pub fn to_json(&self) -> SchemaResult<JsonValue> {
        serde_json::to_value(self).map_err(|e| SchemaError::Codec(format!("Failed to encode field record: {}", e)))
    }

    pub fn from_json(json: &JsonValue) -> SchemaResult<Self> {
        Self::deserialize(json).map_err(|e| SchemaError::Codec(format!("Failed to decode field record: {}", e)))
    }
}

fn list(flavor: ListFlavor, field: Option<Box<Field>>) -> FieldKind {
    FieldKind::List { flavor, field }
}

fn dict(flavor: DictFlavor, field: Option<Box<Field>>) -> FieldKind {
    FieldKind::Dict { flavor, field }
}
