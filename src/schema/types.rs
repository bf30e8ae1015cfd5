//! Field type tags
//!
//! A [`FieldType`] names a field kind without its payload. Constraints
//! (`ftype=...`) are expressed in tags, and tags form a small subtype lattice
//! so that e.g. a `KeypointsField` satisfies an `ftype=ListField` constraint.
//!
//! Lattice (child -> parent):
//! - every tag -> `Field`
//! - `FrameNumber` -> `Int`
//! - `HeatmapRange`, `Keypoints`, `PolylinePoints`, `FrameSupport`,
//!   `Classes`, `EmbeddedDocumentList` -> `List`
//! - `IntDict` -> `Dict`, `Targets` -> `IntDict`
//! - `GeoPoint` .. `GeoMultiPolygon` -> `Geo`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::SchemaError;

/// Field kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Root of the lattice; matches every field
    Field,
    ObjectId,
    Uuid,
    Boolean,
    Int,
    FrameNumber,
    Float,
    String,
    Date,
    DateTime,
    List,
    HeatmapRange,
    Keypoints,
    PolylinePoints,
    FrameSupport,
    Classes,
    EmbeddedDocumentList,
    Dict,
    IntDict,
    Targets,
    Geo,
    GeoPoint,
    GeoLineString,
    GeoPolygon,
    GeoMultiPoint,
    GeoMultiLineString,
    GeoMultiPolygon,
    Vector,
    Array,
    EmbeddedDocument,
}

/// All tags, in declaration order
pub const ALL_FIELD_TYPES: [FieldType; 30] = [
    FieldType::Field,
    FieldType::ObjectId,
    FieldType::Uuid,
    FieldType::Boolean,
    FieldType::Int,
    FieldType::FrameNumber,
    FieldType::Float,
    FieldType::String,
    FieldType::Date,
    FieldType::DateTime,
    FieldType::List,
    FieldType::HeatmapRange,
    FieldType::Keypoints,
    FieldType::PolylinePoints,
    FieldType::FrameSupport,
    FieldType::Classes,
    FieldType::EmbeddedDocumentList,
    FieldType::Dict,
    FieldType::IntDict,
    FieldType::Targets,
    FieldType::Geo,
    FieldType::GeoPoint,
    FieldType::GeoLineString,
    FieldType::GeoPolygon,
    FieldType::GeoMultiPoint,
    FieldType::GeoMultiLineString,
    FieldType::GeoMultiPolygon,
    FieldType::Vector,
    FieldType::Array,
    FieldType::EmbeddedDocument,
];

impl FieldType {
    /// Returns the type name used in messages and persisted records
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Field => "Field",
            FieldType::ObjectId => "ObjectIdField",
            FieldType::Uuid => "UUIDField",
            FieldType::Boolean => "BooleanField",
            FieldType::Int => "IntField",
            FieldType::FrameNumber => "FrameNumberField",
            FieldType::Float => "FloatField",
            FieldType::String => "StringField",
            FieldType::Date => "DateField",
            FieldType::DateTime => "DateTimeField",
            FieldType::List => "ListField",
            FieldType::HeatmapRange => "HeatmapRangeField",
            FieldType::Keypoints => "KeypointsField",
            FieldType::PolylinePoints => "PolylinePointsField",
            FieldType::FrameSupport => "FrameSupportField",
            FieldType::Classes => "ClassesField",
            FieldType::EmbeddedDocumentList => "EmbeddedDocumentListField",
            FieldType::Dict => "DictField",
            FieldType::IntDict => "IntDictField",
            FieldType::Targets => "TargetsField",
            FieldType::Geo => "GeoField",
            FieldType::GeoPoint => "GeoPointField",
            FieldType::GeoLineString => "GeoLineStringField",
            FieldType::GeoPolygon => "GeoPolygonField",
            FieldType::GeoMultiPoint => "GeoMultiPointField",
            FieldType::GeoMultiLineString => "GeoMultiLineStringField",
            FieldType::GeoMultiPolygon => "GeoMultiPolygonField",
            FieldType::Vector => "VectorField",
            FieldType::Array => "ArrayField",
            FieldType::EmbeddedDocument => "EmbeddedDocumentField",
        }
    }

    /// Immediate parent in the lattice, `None` for the root
    pub fn parent(&self) -> Option<FieldType> {
        match self {
            FieldType::Field => None,
            FieldType::FrameNumber => Some(FieldType::Int),
            FieldType::HeatmapRange
            | FieldType::Keypoints
            | FieldType::PolylinePoints
            | FieldType::FrameSupport
            | FieldType::Classes
            | FieldType::EmbeddedDocumentList => Some(FieldType::List),
            FieldType::IntDict => Some(FieldType::Dict),
            FieldType::Targets => Some(FieldType::IntDict),
            FieldType::GeoPoint
            | FieldType::GeoLineString
            | FieldType::GeoPolygon
            | FieldType::GeoMultiPoint
            | FieldType::GeoMultiLineString
            | FieldType::GeoMultiPolygon => Some(FieldType::Geo),
            _ => Some(FieldType::Field),
        }
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn is_subtype_of(&self, other: FieldType) -> bool {
        let mut current = Some(*self);
        while let Some(tag) = current {
            if tag == other {
                return true;
            }
            current = tag.parent();
        }
        false
    }

    /// Whether fields of this tag are embedded document fields.
    ///
    /// `embedded_doc_type` constraints are only legal alongside such tags.
    pub fn admits_embedded(&self) -> bool {
        self.is_subtype_of(FieldType::EmbeddedDocument)
    }

    /// Whether this is a container tag (its fields wrap an element field)
    pub fn is_container(&self) -> bool {
        self.is_subtype_of(FieldType::List) || self.is_subtype_of(FieldType::Dict)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    /// Accepts the type name (`"IntField"`) or the bare tag (`"Int"`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_FIELD_TYPES
            .iter()
            .copied()
            .find(|tag| tag.type_name() == s || format!("{:?}", tag) == s)
            .ok_or_else(|| SchemaError::constraint("ftype", format!("unknown field type '{}'", s)))
    }
}

/// GeoJSON geometry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeoKind {
    /// The GeoJSON `type` member written to storage
    pub fn geojson_type(&self) -> &'static str {
        match self {
            GeoKind::Point => "Point",
            GeoKind::LineString => "LineString",
            GeoKind::Polygon => "Polygon",
            GeoKind::MultiPoint => "MultiPoint",
            GeoKind::MultiLineString => "MultiLineString",
            GeoKind::MultiPolygon => "MultiPolygon",
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            GeoKind::Point => FieldType::GeoPoint,
            GeoKind::LineString => FieldType::GeoLineString,
            GeoKind::Polygon => FieldType::GeoPolygon,
            GeoKind::MultiPoint => FieldType::GeoMultiPoint,
            GeoKind::MultiLineString => FieldType::GeoMultiLineString,
            GeoKind::MultiPolygon => FieldType::GeoMultiPolygon,
        }
    }
}
