//! docschema - typed document schemas
//!
//! Field descriptors, embedded document schemas and the schema algebra
//! (filter, flatten, merge, validate, coerce) for a document dataset.

pub mod observability;
pub mod schema;
