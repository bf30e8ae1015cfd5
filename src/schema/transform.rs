//! Schema transforms
//!
//! Stateless functions over [`Schema`] mappings: constraint validation and
//! matching, filtering, flattening to dotted paths, field validation and
//! merge reconciliation.
//!
//! Malformed constraints are caller bugs and fail immediately with
//! `SCHEMA_CONSTRAINT_SHAPE`. Lookup and merge failures carry the dotted path.

use indexmap::IndexMap;

use super::errors::{SchemaError, SchemaResult};
use super::field::Field;
use super::mapping::Schema;
use super::query::{SchemaQuery, TypeConstraints};
use super::types::FieldType;
use crate::observability::{log_event_with_fields, Event};

/// Checks that the constraints are well formed and reports whether any was
/// supplied.
///
/// - type and document type lists must not be empty
/// - `embedded_doc_type` requires every `ftype` to be an embedded document type
pub fn validate_type_constraints(constraints: &TypeConstraints) -> SchemaResult<bool> {
    if let Some(ftypes) = &constraints.ftype {
        if ftypes.is_empty() {
            return Err(SchemaError::constraint("ftype", "at least one field type is required"));
        }
        if constraints.embedded_doc_type.is_some() {
            if let Some(bad) = ftypes.iter().find(|t| !t.admits_embedded()) {
                return Err(SchemaError::constraint(
                    "embedded_doc_type",
                    format!(
                        "embedded_doc_type can only be specified if ftype is a subtype of {}; found {}",
                        FieldType::EmbeddedDocument,
                        bad
                    ),
                ));
            }
        }
    }

    if let Some(doc_types) = &constraints.embedded_doc_type {
        if doc_types.is_empty() {
            return Err(SchemaError::constraint(
                "embedded_doc_type",
                "at least one document type is required",
            ));
        }
    }

    Ok(!constraints.is_empty())
}

/// Whether `field` satisfies every supplied constraint
pub fn matches_type_constraints(field: &Field, constraints: &TypeConstraints) -> bool {
    if let Some(ftypes) = &constraints.ftype {
        let tag = field.field_type();
        if !ftypes.iter().any(|t| tag.is_subtype_of(*t)) {
            return false;
        }
    }

    if let Some(doc_types) = &constraints.embedded_doc_type {
        match field.as_embedded() {
            Some(embedded) => {
                let doc_type = embedded.document_type();
                if !doc_types.iter().any(|d| doc_type.is_subclass_of(d)) {
                    return false;
                }
            }
            None => return false,
        }
    }

    match constraints.is_virtual {
        Some(is_virtual) => is_virtual == field.is_virtual(),
        None => true,
    }
}

/// Checks `field` (found at `path`) against the constraints.
///
/// A missing field fails with `SCHEMA_MISSING_FIELD`; any disagreement fails
/// with `SCHEMA_TYPE_MISMATCH` naming the path and both descriptions. No
/// constraints means no check, even for a missing field.
pub fn validate_field(
    field: Option<&Field>,
    path: Option<&str>,
    constraints: &TypeConstraints,
) -> SchemaResult<()> {
    if constraints.is_empty() {
        return Ok(());
    }

    let Some(field) = field else {
        return Err(SchemaError::missing_field(path.unwrap_or("<unknown>")));
    };
    let path = path.or(field.path()).unwrap_or(field.name());

    if let Some(ftypes) = &constraints.ftype {
        let tag = field.field_type();
        if !ftypes.iter().any(|t| tag.is_subtype_of(*t)) {
            return Err(SchemaError::type_mismatch(
                path,
                join_names(ftypes.iter().map(FieldType::type_name)),
                field.to_string(),
            ));
        }
    }

    if let Some(doc_types) = &constraints.embedded_doc_type {
        let Some(embedded) = field.as_embedded() else {
            return Err(SchemaError::type_mismatch(
                path,
                FieldType::EmbeddedDocument.type_name(),
                field.to_string(),
            ));
        };

        let doc_type = embedded.document_type();
        if !doc_types.iter().any(|d| doc_type.is_subclass_of(d)) {
            return Err(SchemaError::type_mismatch(
                path,
                format!("document type {}", join_names(doc_types.iter().map(|d| d.name()))),
                format!("document type {}", doc_type.name()),
            ));
        }
    }

    if let Some(is_virtual) = constraints.is_virtual {
        if field.is_virtual() != is_virtual {
            return Err(SchemaError::type_mismatch(
                path,
                format!("virtual={}", is_virtual),
                format!("virtual={}", field.is_virtual()),
            ));
        }
    }

    Ok(())
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(" or ")
}

/// Filters `schema` per `query`.
///
/// Private (`_`-prefixed) top-level fields are dropped unless included. When
/// flattening, `mode` decides whether constraints prune top-level fields
/// before descending (a pruned embedded field takes its subtree with it),
/// filter the flat paths after, or both. Without `flat`, `mode` is ignored.
pub fn filter_schema(mut schema: Schema, query: &SchemaQuery) -> SchemaResult<Schema> {
    let constraints = &query.constraints;
    let has_constraints = validate_type_constraints(constraints)?;
    let unconstrained = TypeConstraints::default();

    let (before, after) = if query.flat {
        let mode = query.mode.unwrap_or_default();
        (
            if mode.filters_before() { constraints } else { &unconstrained },
            if mode.filters_after() { constraints } else { &unconstrained },
        )
    } else {
        (constraints, &unconstrained)
    };

    let include_private = query.include_private;
    if has_constraints || !include_private {
        schema.retain(|name, field| {
            let private = !include_private && name.starts_with('_');
            !private && (!has_constraints || matches_type_constraints(field, before))
        });
    }

    if query.flat {
        schema = flatten_schema(&schema, after, include_private)?;
    }

    Ok(schema)
}

/// Flattens `schema` to dotted paths, depth first.
///
/// A node whose bare name is private is skipped with its whole subtree unless
/// `include_private`. Containers are looked through to their element field to
/// decide whether to descend; embedded fields descend into their visible
/// nested schema. Only nodes matching `constraints` are emitted, but
/// non-matching nodes are still descended.
pub fn flatten_schema(
    schema: &Schema,
    constraints: &TypeConstraints,
    include_private: bool,
) -> SchemaResult<Schema> {
    validate_type_constraints(constraints)?;

    let mut flat = Schema::new();
    for (name, field) in schema {
        flatten_into(&mut flat, None, name, field, constraints, include_private);
    }
    Ok(flat)
}

fn flatten_into(
    flat: &mut Schema,
    prefix: Option<&str>,
    name: &str,
    field: &Field,
    constraints: &TypeConstraints,
    include_private: bool,
) {
    if !include_private && name.starts_with('_') {
        return;
    }

    let path = join_path(prefix, name);
    if matches_type_constraints(field, constraints) {
        flat.insert(path.clone(), field.clone());
    }

    if let Some(embedded) = field.nested_embedded() {
        for (child_name, child) in embedded.visible_fields(include_private) {
            flatten_into(flat, Some(&path), child_name, child, constraints, include_private);
        }
    }
}

fn join_path(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, name),
        None => name.to_string(),
    }
}

/// Checks that `incoming` can stand in for `existing` at `path`.
///
/// The incoming type must be the existing type or a subtype; embedded document
/// types must derive from the existing one; typed container elements must
/// match recursively.
pub fn validate_fields_match(path: &str, incoming: &Field, existing: &Field) -> SchemaResult<()> {
    if !incoming.field_type().is_subtype_of(existing.field_type()) {
        return Err(SchemaError::type_mismatch(
            path,
            existing.to_string(),
            incoming.to_string(),
        ));
    }

    if let (Some(inc), Some(ext)) = (incoming.as_embedded(), existing.as_embedded()) {
        if !inc.document_type().is_subclass_of(ext.document_type()) {
            return Err(SchemaError::type_mismatch(
                path,
                existing.to_string(),
                incoming.to_string(),
            ));
        }
    }

    if let (Some(inc), Some(ext)) = (incoming.element_field(), existing.element_field()) {
        validate_fields_match(path, inc, ext)?;
    }

    Ok(())
}

/// Reconciles `incoming` against `existing` and returns the fields that must
/// be declared, keyed by dotted path and detached. Nothing is installed.
///
/// With `validate`, same-named fields must be compatible. With `recursive`,
/// same-named embedded fields (or lists of them on both sides) are merged
/// level by level instead of being considered equal wholesale.
pub fn merge_schema(
    existing: &Schema,
    incoming: &Schema,
    validate: bool,
    recursive: bool,
) -> SchemaResult<Schema> {
    let new_fields = merge_field_maps(None, existing.as_map(), incoming.as_map(), validate, recursive)?;
    let count = new_fields.len().to_string();
    log_event_with_fields(Event::SchemaMerged, &[("new_fields", &count), ("path", "")]);
    Ok(new_fields)
}

pub(crate) fn merge_field_maps(
    prefix: Option<&str>,
    existing: &IndexMap<String, Field>,
    incoming: &IndexMap<String, Field>,
    validate: bool,
    recursive: bool,
) -> SchemaResult<Schema> {
    let mut new_fields = Schema::new();

    for (name, incoming_field) in incoming {
        let path = join_path(prefix, name);

        let Some(existing_field) = existing.get(name) else {
            new_fields.insert(path, incoming_field.copy());
            continue;
        };

        if validate {
            validate_fields_match(&path, incoming_field, existing_field)?;
        }

        if !recursive {
            continue;
        }

        let pair = if existing_field.field_type().is_subtype_of(FieldType::List) {
            if incoming_field.field_type().is_subtype_of(FieldType::List) {
                existing_field.element_field().zip(incoming_field.element_field())
            } else {
                None
            }
        } else {
            Some((existing_field, incoming_field))
        };

        if let Some((existing_inner, incoming_inner)) = pair {
            if let Some(embedded) = existing_inner.as_embedded() {
                let nested = embedded.merge_nested(&path, incoming_inner, validate, recursive)?;
                new_fields.extend(nested);
            }
        }
    }

    Ok(new_fields)
}
