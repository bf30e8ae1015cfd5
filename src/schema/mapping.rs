//! Ordered name -> field mapping
//!
//! Iteration order is insertion order and is the display order. Removing a
//! field shifts later fields up rather than swapping, so order survives edits.
//!
//! `insert` stores fields as given. A dataset's top-level schema uses
//! [`Schema::declare`] or [`Schema::attach`] so every field knows its owner
//! and path.

use indexmap::map::{IntoIter, Iter, Keys};
use indexmap::IndexMap;

use super::errors::SchemaResult;
use super::field::{validate_field_name, Field};
use super::store::DatasetId;
use crate::observability::{log_event_with_fields, Event};

/// An ordered mapping from field name (or dotted path, once flattened) to field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field under `key`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) -> Option<Field> {
        self.fields.insert(key.into(), field)
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.fields.get_mut(key)
    }

    /// Removes `key`, returning the field detached
    pub fn remove(&mut self, key: &str) -> Option<Field> {
        let mut field = self.fields.shift_remove(key)?;
        field.detach();
        Some(field)
    }

    /// Installs a top-level field under its own name.
    ///
    /// Same rules as nested declaration: the previous field's
    /// `required`/`nullable` flags carry over, the previous field is detached
    /// and the new one moves to the end. With a `dataset` the field is bound
    /// at its name.
    pub fn declare(&mut self, dataset: Option<DatasetId>, mut field: Field) -> SchemaResult<()> {
        let name = field.name().to_string();
        validate_field_name(&name)?;

        if let Some(mut prev) = self.fields.shift_remove(&name) {
            prev.detach();
            field.set_required(prev.required());
            field.set_nullable(prev.nullable());
        }

        match dataset {
            Some(id) => field.bind(id, &name),
            None => field.detach(),
        }
        log_event_with_fields(Event::FieldDeclared, &[("path", &name)]);
        self.fields.insert(name, field);
        Ok(())
    }

    /// Binds every field, and its descendants, to `dataset` at its key
    pub fn attach(&mut self, dataset: DatasetId) {
        for (key, field) in self.fields.iter_mut() {
            field.bind(dataset, key);
        }
    }

    /// Detaches every field
    pub fn detach(&mut self) {
        for field in self.fields.values_mut() {
            field.detach();
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> Keys<'_, String, Field> {
        self.fields.keys()
    }

    pub fn iter(&self) -> Iter<'_, String, Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends every entry of `other`; existing keys keep their position
    pub fn extend(&mut self, other: Schema) {
        self.fields.extend(other.fields);
    }

    /// Keeps only the entries for which `keep` returns true, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Field) -> bool) {
        self.fields.retain(|k, v| keep(k, v));
    }

    pub(crate) fn as_map(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Resolves a dotted path, descending through embedded document fields
    /// and through list/dict fields whose element is embedded
    pub fn get_field(&self, path: &str) -> Option<&Field> {
        let mut segments = path.split('.');
        let mut field = self.fields.get(segments.next()?)?;
        for segment in segments {
            field = field.nested_embedded()?.get_field(segment)?;
        }
        Some(field)
    }

    /// Mutable variant of [`Schema::get_field`]. View overlays are not reachable.
    pub fn get_field_mut(&mut self, path: &str) -> Option<&mut Field> {
        let mut segments = path.split('.');
        let mut field = self.fields.get_mut(segments.next()?)?;
        for segment in segments {
            field = field.nested_embedded_mut()?.fields_mut().get_mut(segment)?;
        }
        Some(field)
    }
}

impl FromIterator<(String, Field)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, Field)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Schema {
    type Item = (String, Field);
    type IntoIter = IntoIter<String, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a String, &'a Field);
    type IntoIter = Iter<'a, String, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl From<IndexMap<String, Field>> for Schema {
    fn from(fields: IndexMap<String, Field>) -> Self {
        Self { fields }
    }
}
