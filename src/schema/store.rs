//! Persistence collaborator
//!
//! The schema engine never talks to the document store directly. Two calls
//! cross the boundary:
//!
//! - `save_field(field)` persists a field's description/info edits
//! - `compile_virtual_expression(path, expr, embedded_root)` turns a virtual
//!   field's expression into a bound pipeline stage plus its serializable form
//!
//! Fields refer to their owner by [`DatasetId`], never by pointer.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::errors::SchemaResult;
use super::field::Field;
use super::record::FieldRecord;

/// Non-owning identifier of the dataset a field is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Creates a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output of expression compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    /// The bound pipeline stage, never persisted
    pub stage: JsonValue,
    /// The serializable expression that replaces the source form
    pub expr: JsonValue,
}

/// The persistence collaborator for one dataset
pub trait SchemaStore {
    /// The dataset this store persists
    fn dataset_id(&self) -> DatasetId;

    /// Persists the field's description and info
    fn save_field(&mut self, field: &Field) -> SchemaResult<()>;

    /// Compiles a virtual field expression at `path`
    fn compile_virtual_expression(
        &self,
        path: &str,
        expr: &JsonValue,
        embedded_root: bool,
    ) -> SchemaResult<CompiledExpression>;
}

/// In-memory store used for embedding and tests.
///
/// Saved fields are kept as records keyed by path. Compilation wraps the
/// expression in a `$set` stage.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    id: DatasetId,
    saved: IndexMap<String, FieldRecord>,
    compilations: AtomicUsize,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: DatasetId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// The last record saved for `path`
    pub fn saved(&self, path: &str) -> Option<&FieldRecord> {
        self.saved.get(path)
    }

    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    /// How many expressions were compiled so far
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }
}

impl SchemaStore for MemorySchemaStore {
    fn dataset_id(&self) -> DatasetId {
        self.id
    }

    fn save_field(&mut self, field: &Field) -> SchemaResult<()> {
        let path = field.path().unwrap_or(field.name()).to_string();
        self.saved.insert(path, FieldRecord::from_field(field));
        Ok(())
    }

    fn compile_virtual_expression(
        &self,
        path: &str,
        expr: &JsonValue,
        embedded_root: bool,
    ) -> SchemaResult<CompiledExpression> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let target = if embedded_root {
            path.to_string()
        } else {
            path.rsplit('.').next().unwrap_or(path).to_string()
        };
        let mut set = serde_json::Map::new();
        set.insert(target, expr.clone());
        Ok(CompiledExpression {
            stage: json!({ "$set": JsonValue::Object(set) }),
            expr: expr.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_ids_are_distinct() {
        assert_ne!(DatasetId::new(), DatasetId::new());
    }

    #[test]
    fn test_memory_store_compiles_to_set_stage() {
        let store = MemorySchemaStore::new();
        let compiled = store
            .compile_virtual_expression("gt.detections.area", &json!({"$multiply": [1, 2]}), true)
            .unwrap();
        assert_eq!(
            compiled.stage,
            json!({"$set": {"gt.detections.area": {"$multiply": [1, 2]}}})
        );
        assert_eq!(store.compilations(), 1);
    }

    #[test]
    fn test_memory_store_saves_by_path() {
        let mut store = MemorySchemaStore::new();
        let field = Field::int("count").with_description("number of things");
        store.save_field(&field).unwrap();
        let record = store.saved("count").unwrap();
        assert_eq!(record.description.as_deref(), Some("number of things"));
    }
}
