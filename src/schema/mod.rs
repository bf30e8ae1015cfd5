//! Schema engine for docschema
//!
//! Typed field descriptors for documents in a dataset, embedded document
//! fields with their nested schemas, and the schema operations built on them:
//! constraint filtering, flattening, merging, validation and storage coercion.
//!
//! # Design Principles
//!
//! - Field kinds form a closed set; behaviour dispatches over [`FieldKind`]
//! - Field types form a subtype lattice used for constraint matching
//! - Schemas are ordered; display order is insertion order
//! - A field is bound to at most one dataset, by id and dotted path
//! - Virtual fields never revert to regular fields
//! - View state is transient and never persisted
//! - No error is swallowed into a default value

mod array;
mod coerce;
mod document;
mod embedded;
mod errors;
mod field;
mod mapping;
mod query;
mod record;
mod store;
mod transform;
mod types;
mod validator;
mod value;

pub use array::{ArrayData, ElementType, NumericArray};
pub use document::{DocumentType, DocumentTypeBuilder, DocumentTypeRegistry};
pub use embedded::{EmbeddedDocumentField, ViewState};
pub use errors::{SchemaError, SchemaResult};
pub use field::{
    validate_field_name, DictFlavor, Field, FieldBinding, FieldKind, ListFlavor, VirtualExpr,
};
pub use mapping::Schema;
pub use query::{FlattenMode, OneOrMany, SchemaQuery, SchemaQueryConfig, TypeConstraints};
pub use record::FieldRecord;
pub use store::{CompiledExpression, DatasetId, MemorySchemaStore, SchemaStore};
pub use transform::{
    filter_schema, flatten_schema, matches_type_constraints, merge_schema, validate_field,
    validate_fields_match, validate_type_constraints,
};
pub use types::{FieldType, GeoKind};
pub use value::{object_id_hex, parse_object_id, Document, Value};
