//! Per-kind value validation
//!
//! Validation semantics:
//! - Null passes unless the field is required
//! - Every kind checks the value's shape; containers recurse into elements
//! - Fixed-shape list helpers (keypoints, polylines) check only the first
//!   element of each nesting level
//! - Embedded documents check their type and every present nested value
//!
//! Validation never mutates. Errors name the innermost failing path.

use super::errors::{SchemaError, SchemaResult};
use super::field::{DictFlavor, Field, FieldKind, ListFlavor};
use super::types::GeoKind;
use super::value::{parse_object_id, Value};
use uuid::Uuid;

impl Field {
    /// Validates `value` against this field, reporting errors at the field's
    /// path (or name when detached)
    pub fn validate(&self, value: &Value) -> SchemaResult<()> {
        let path = self.path().unwrap_or(self.name()).to_string();
        self.validate_at(value, &path)
    }

    /// Validates `value`, reporting errors at `path`
    pub fn validate_at(&self, value: &Value, path: &str) -> SchemaResult<()> {
        if value.is_null() {
            if self.required() {
                return Err(fail(path, "Field is required"));
            }
            return Ok(());
        }

        validate_value(self, value, path)
    }
}

fn validate_value(field: &Field, value: &Value, path: &str) -> SchemaResult<()> {
    match field.kind() {
        FieldKind::ObjectId => match value {
            Value::ObjectId(_) => Ok(()),
            Value::String(s) if parse_object_id(s).is_some() => Ok(()),
            other => Err(fail(
                path,
                format!("{} is not a valid ObjectId", describe(other)),
            )),
        },

        FieldKind::Uuid => match value {
            Value::Uuid(_) => Ok(()),
            Value::String(s) if Uuid::parse_str(s).is_ok() => Ok(()),
            other => Err(fail(path, format!("Could not convert {} to UUID", describe(other)))),
        },

        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(fail(path, "Boolean fields only accept boolean values")),
        },

        FieldKind::Int => to_int(value).map(|_| ()).map_err(|rule| fail(path, rule)),

        FieldKind::FrameNumber => match value {
            Value::Int(n) if *n >= 1 => Ok(()),
            Value::Int(n) => Err(fail(
                path,
                format!("Frame numbers must be 1-based integers; found {}", n),
            )),
            other => Err(fail(
                path,
                format!("Frame numbers must be integers; found {}", other.type_name()),
            )),
        },

        FieldKind::Float { min_value, max_value } => {
            let v = to_float(value).map_err(|rule| fail(path, rule))?;
            if let Some(min) = min_value {
                if v < *min {
                    return Err(fail(path, "Float value is too small"));
                }
            }
            if let Some(max) = max_value {
                if v > *max {
                    return Err(fail(path, "Float value is too large"));
                }
            }
            Ok(())
        }

        FieldKind::String => match value {
            Value::String(_) => Ok(()),
            _ => Err(fail(path, "String fields only accept string values")),
        },

        FieldKind::Date => match value {
            Value::Date(_) => Ok(()),
            _ => Err(fail(path, "Date fields must have `date` values")),
        },

        FieldKind::DateTime => match value {
            Value::DateTime(_) => Ok(()),
            _ => Err(fail(path, "Datetime fields must have `datetime` values")),
        },

        FieldKind::List { flavor, field: element } => {
            validate_list(*flavor, element.as_deref(), value, path)
        }

        FieldKind::Dict { flavor, field: element } => {
            validate_dict(*flavor, element.as_deref(), value, path)
        }

        FieldKind::Geo(kind) => validate_geo(*kind, value).map_err(|rule| fail(path, rule)),

        FieldKind::Vector => match value {
            Value::Array(array) if array.ndim() > 1 => {
                Err(fail(path, "Only 1D arrays may be used in a vector field"))
            }
            Value::Array(_) | Value::Binary(_) => Ok(()),
            Value::List(items) => {
                if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))) {
                    Ok(())
                } else {
                    Err(fail(path, "Vector fields only accept numeric sequences"))
                }
            }
            _ => Err(fail(
                path,
                "Only numeric arrays, lists, and tuples may be used in a vector field",
            )),
        },

        FieldKind::Array => match value {
            Value::Array(_) | Value::Binary(_) => Ok(()),
            _ => Err(fail(path, "Only numeric arrays may be used in an array field")),
        },

        FieldKind::EmbeddedDocument(embedded) => {
            let Value::Document(doc) = value else {
                return Err(fail(
                    path,
                    format!(
                        "Expected {}; found {}",
                        embedded.document_type().name(),
                        value.type_name()
                    ),
                ));
            };

            if !doc.doc_type.is_subclass_of(embedded.document_type()) {
                return Err(fail(
                    path,
                    format!(
                        "Expected {}; found {}",
                        embedded.document_type().name(),
                        doc.doc_type.name()
                    ),
                ));
            }

            for (name, nested) in embedded.fields() {
                let nested_path = make_path(path, name);
                match doc.get(name) {
                    Some(v) if !v.is_null() => validate_value(nested, v, &nested_path)?,
                    _ if nested.required() => return Err(fail(&nested_path, "Field is required")),
                    _ => {}
                }
            }
            Ok(())
        }
    }
}

fn validate_list(
    flavor: ListFlavor,
    element: Option<&Field>,
    value: &Value,
    path: &str,
) -> SchemaResult<()> {
    match flavor {
        ListFlavor::HeatmapRange => match pair(value) {
            Some((lo, hi)) if lo <= hi => Ok(()),
            _ => Err(fail(path, "Heatmap range fields must contain `[min, max]` ranges")),
        },

        ListFlavor::FrameSupport => match pair(value) {
            Some((first, last)) if 1.0 <= first && first <= last => Ok(()),
            _ => Err(fail(
                path,
                "Frame support fields must contain `[first, last]` frame numbers",
            )),
        },

        ListFlavor::Keypoints => {
            // Only the first point is checked
            let ok = match value {
                Value::List(points) => points.first().map_or(true, is_coordinate_pair),
                Value::Array(array) => array.ndim() == 2 && array.shape()[1] == 2,
                _ => false,
            };
            if ok {
                Ok(())
            } else {
                Err(fail(path, "Keypoints fields must contain a list of (x, y) pairs"))
            }
        }

        ListFlavor::PolylinePoints => {
            // Only the first point of the first shape is checked
            let ok = match value {
                Value::List(shapes) => match shapes.first() {
                    None => true,
                    Some(Value::List(points)) => points.first().map_or(true, is_coordinate_pair),
                    Some(_) => false,
                },
                _ => false,
            };
            if ok {
                Ok(())
            } else {
                Err(fail(
                    path,
                    "Polyline points fields must contain a list of lists of (x, y) pairs",
                ))
            }
        }

        ListFlavor::Plain | ListFlavor::Classes | ListFlavor::EmbeddedDocuments => {
            let Value::List(items) = value else {
                return Err(fail(path, "Only lists and tuples may be used in a list field"));
            };
            if let Some(element) = element {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_null() {
                        validate_value(element, item, &format!("{}[{}]", path, i))?;
                    }
                }
            }
            Ok(())
        }
    }
}

fn validate_dict(
    flavor: DictFlavor,
    element: Option<&Field>,
    value: &Value,
    path: &str,
) -> SchemaResult<()> {
    let Value::Dict(entries) = value else {
        return Err(fail(path, "Value must be a dict"));
    };

    match flavor {
        DictFlavor::Plain => {
            if !entries.iter().all(|(k, _)| matches!(k, Value::String(_))) {
                return Err(fail(path, "Dict fields must have string keys"));
            }
        }
        DictFlavor::IntKeys | DictFlavor::Targets => {
            if !entries.iter().all(|(k, _)| matches!(k, Value::Int(_))) {
                return Err(fail(path, "Int dict fields must have integer keys"));
            }
        }
    }

    if let Some(element) = element {
        for (key, item) in entries {
            if !item.is_null() {
                validate_value(element, item, &make_path(path, &key_label(key)))?;
            }
        }
    }
    Ok(())
}

fn validate_geo(kind: GeoKind, value: &Value) -> Result<(), String> {
    if matches!(value, Value::Dict(_)) {
        return Err("Geo fields expect coordinate lists, but found dict".into());
    }

    match kind {
        GeoKind::Point => geo_point(value),
        GeoKind::LineString => geo_line(value),
        GeoKind::Polygon => geo_polygon(value),
        GeoKind::MultiPoint => each(value, "MultiPoint", geo_point),
        GeoKind::MultiLineString => each(value, "MultiLineString", geo_line),
        GeoKind::MultiPolygon => each(value, "MultiPolygon", geo_polygon),
    }
}

fn geo_point(value: &Value) -> Result<(), String> {
    let Some(coords) = value.as_list() else {
        return Err(format!("Points must be lists of [x, y]; found {}", value.type_name()));
    };
    if coords.len() != 2 {
        return Err(format!(
            "Points must be two-dimensional; found {} coordinates",
            coords.len()
        ));
    }
    if !coords.iter().all(Value::is_number) {
        return Err("Both values in a point must be float or int".into());
    }
    Ok(())
}

fn geo_line(value: &Value) -> Result<(), String> {
    let Some(points) = value.as_list() else {
        return Err(format!("LineStrings must be lists of points; found {}", value.type_name()));
    };
    if points.len() < 2 {
        return Err("LineStrings must contain at least two points".into());
    }
    points.iter().try_for_each(geo_point)
}

fn geo_polygon(value: &Value) -> Result<(), String> {
    let Some(rings) = value.as_list() else {
        return Err(format!("Polygons must be lists of rings; found {}", value.type_name()));
    };
    if rings.is_empty() {
        return Err("Polygons must contain at least one ring".into());
    }
    for ring in rings {
        geo_line(ring)?;
        let points = ring.as_list().unwrap_or_default();
        if points.len() < 4 {
            return Err("Polygon rings must contain at least four points".into());
        }
        if points.first() != points.last() {
            return Err("Polygon rings must start and end at the same point".into());
        }
    }
    Ok(())
}

fn each(
    value: &Value,
    geometry: &str,
    check: fn(&Value) -> Result<(), String>,
) -> Result<(), String> {
    let Some(items) = value.as_list() else {
        return Err(format!("{} values must be lists; found {}", geometry, value.type_name()));
    };
    items.iter().try_for_each(check)
}

fn pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_list()? {
        [a, b] => Some((a.as_f64()?, b.as_f64()?)),
        _ => None,
    }
}

fn is_coordinate_pair(value: &Value) -> bool {
    matches!(value, Value::List(xy) if xy.len() == 2)
}

/// Converts to float like a numeric cast. Strings are parsed; overflow and
/// non-numeric input are distinct failures.
pub(crate) fn to_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::String(s) => {
            let text = s.trim();
            match text.parse::<f64>() {
                Ok(v) if v.is_infinite() && !text.to_ascii_lowercase().contains("inf") => {
                    Err("The value is too large to be converted to float".into())
                }
                Ok(v) => Ok(v),
                Err(_) => Err(format!("{} could not be converted to float", s)),
            }
        }
        other => Err(format!("{} could not be converted to float", describe(other))),
    }
}

/// Converts to int like a numeric cast; floats truncate toward zero
pub(crate) fn to_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Bool(b) => Ok(*b as i64),
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
        Value::Float(f) if f.is_finite() => {
            Err("The value is too large to be converted to int".into())
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{} could not be converted to int", s)),
        other => Err(format!("{} could not be converted to int", describe(other))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Float(f) => f.to_string(),
        other => other.type_name().to_string(),
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        other => other.type_name().to_string(),
    }
}

fn make_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn fail(path: &str, rule: impl Into<String>) -> SchemaError {
    SchemaError::validation(rule).at_path(path)
}
