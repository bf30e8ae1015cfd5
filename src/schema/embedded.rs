//! Embedded document fields
//!
//! An [`EmbeddedDocumentField`] owns a nested schema. Its effective fields are
//! the document type's static defaults followed by the per-instance declared
//! fields (a declared field overrides a default of the same name). Defaults
//! moved or dropped by a mutation are remembered as displaced so a persisted
//! record rebuilds the same mapping in the same order.
//!
//! # View state
//!
//! A [`ViewState`] (selected names, excluded names, transient virtual fields)
//! can be passed explicitly to the `*_in` readers, or installed for the
//! lifetime of a view with [`EmbeddedDocumentField::use_view`] and released
//! with [`EmbeddedDocumentField::clear_view`]. View state is never persisted
//! and its virtual fields are overlaid at read time, never written into the
//! effective mapping.
//!
//! # Mutation
//!
//! `declare_field`, `rename_field` and `remove_field` install, move and drop
//! fields and keep the dataset/path binding of every touched field correct.
//! `merge_fields` only computes what would have to be declared; it never
//! mutates.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use super::document::DocumentType;
use super::errors::{SchemaError, SchemaResult};
use super::field::{validate_field_name, Field, FieldBinding};
use super::mapping::Schema;
use super::query::SchemaQuery;
use super::store::DatasetId;
use super::transform;
use crate::observability::{log_event_with_fields, Event};

/// Transient selection/exclusion/virtual overlay for one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    selected: Option<HashSet<String>>,
    excluded: Option<HashSet<String>>,
    virtual_fields: IndexMap<String, Field>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the view to `names`. Combined with an exclusion, the view
    /// selects `selected - excluded`.
    pub fn select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: HashSet<String> = names.into_iter().map(Into::into).collect();
        if let Some(excluded) = self.excluded.take() {
            selected.retain(|name| !excluded.contains(name));
        }
        self.selected = Some(selected);
        self
    }

    /// Hides `names`
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let excluded: HashSet<String> = names.into_iter().map(Into::into).collect();
        match &mut self.selected {
            Some(selected) => selected.retain(|name| !excluded.contains(name)),
            None => self.excluded = Some(excluded),
        }
        self
    }

    /// Adds a virtual field that exists only for this view
    pub fn with_virtual_field(mut self, field: Field) -> Self {
        self.virtual_fields.insert(field.name().to_string(), field);
        self
    }

    pub fn selected(&self) -> Option<&HashSet<String>> {
        self.selected.as_ref()
    }

    pub fn excluded(&self) -> Option<&HashSet<String>> {
        self.excluded.as_ref()
    }

    pub fn virtual_fields(&self) -> &IndexMap<String, Field> {
        &self.virtual_fields
    }

    fn admits(&self, name: &str) -> bool {
        if let Some(selected) = &self.selected {
            if !selected.contains(name) {
                return false;
            }
        }
        if let Some(excluded) = &self.excluded {
            if excluded.contains(name) {
                return false;
            }
        }
        true
    }
}

/// A field whose values are documents of a given type
#[derive(Debug, Clone)]
pub struct EmbeddedDocumentField {
    document_type: Arc<DocumentType>,
    /// Names of per-instance fields, in declaration order
    declared: Vec<String>,
    /// Default names that no longer hold their default slot
    displaced: Vec<String>,
    fields: IndexMap<String, Field>,
    view: Option<ViewState>,
}

impl EmbeddedDocumentField {
    pub fn new(document_type: Arc<DocumentType>) -> Self {
        Self::with_fields(document_type, Vec::new())
    }

    pub fn with_fields(document_type: Arc<DocumentType>, fields: Vec<Field>) -> Self {
        Self::with_fields_excluding(document_type, fields, Vec::new())
    }

    /// Builds the nested schema from declared `fields`, leaving the defaults
    /// named in `displaced_defaults` out of their default slots
    pub fn with_fields_excluding(
        document_type: Arc<DocumentType>,
        fields: Vec<Field>,
        displaced_defaults: Vec<String>,
    ) -> Self {
        let displaced: Vec<String> = displaced_defaults
            .into_iter()
            .filter(|name| document_type.default_fields().contains_key(name))
            .collect();

        let mut effective: IndexMap<String, Field> = document_type
            .default_fields()
            .iter()
            .filter(|(name, _)| !displaced.contains(name))
            .map(|(name, field)| (name.clone(), field.clone()))
            .collect();
        let declared = fields.iter().map(|f| f.name().to_string()).collect();
        for field in &fields {
            effective.insert(field.name().to_string(), field.copy());
        }

        Self {
            document_type,
            declared,
            displaced,
            fields: effective,
            view: None,
        }
    }

    pub fn document_type(&self) -> &Arc<DocumentType> {
        &self.document_type
    }

    /// Effective fields: defaults, then declared
    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Mutable effective fields. Structural changes should go through
    /// `declare_field`/`rename_field`/`remove_field` to keep bindings right.
    pub fn fields_mut(&mut self) -> &mut IndexMap<String, Field> {
        &mut self.fields
    }

    /// Default field names moved or dropped since construction
    pub fn displaced_defaults(&self) -> &[String] {
        &self.displaced
    }

    fn displace_default(&mut self, name: &str) {
        if self.document_type.default_fields().contains_key(name)
            && !self.displaced.iter().any(|n| n == name)
        {
            self.displaced.push(name.to_string());
        }
    }

    /// Fields declared per instance, in declaration order
    pub fn declared_fields(&self) -> Vec<&Field> {
        self.declared.iter().filter_map(|name| self.fields.get(name)).collect()
    }

    /// Looks up a nested field by bare name; the active view's virtual fields win
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.view
            .as_ref()
            .and_then(|view| view.virtual_fields.get(name))
            .or_else(|| self.fields().get(name))
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn view(&self) -> Option<&ViewState> {
        self.view.as_ref()
    }

    /// Installs view state until [`EmbeddedDocumentField::clear_view`]
    pub fn use_view(&mut self, view: ViewState) {
        log_event_with_fields(Event::ViewApplied, &[("document_type", self.document_type.name())]);
        self.view = Some(view);
    }

    /// Releases the installed view state
    pub fn clear_view(&mut self) -> Option<ViewState> {
        let view = self.view.take();
        if view.is_some() {
            log_event_with_fields(Event::ViewCleared, &[("document_type", self.document_type.name())]);
        }
        view
    }

    /// Visible `(name, field)` pairs in display order.
    ///
    /// View virtual fields replace same-named fields in place and otherwise
    /// follow the effective fields.
    pub(crate) fn visible_in<'a>(
        &'a self,
        view: Option<&'a ViewState>,
        include_private: bool,
    ) -> Vec<(&'a str, &'a Field)> {
        let mut entries: IndexMap<&str, &Field> =
            self.fields().iter().map(|(k, v)| (k.as_str(), v)).collect();
        if let Some(view) = view {
            for (name, field) in &view.virtual_fields {
                entries.insert(name.as_str(), field);
            }
        }

        entries
            .into_iter()
            .filter(|(name, _)| include_private || !name.starts_with('_'))
            .filter(|(name, _)| view.map_or(true, |v| v.admits(name)))
            .collect()
    }

    pub(crate) fn visible_fields(&self, include_private: bool) -> Vec<(&str, &Field)> {
        self.visible_in(self.view.as_ref(), include_private)
    }

    /// Visible field names under the installed view
    pub fn field_names(&self, include_private: bool) -> Vec<String> {
        self.field_names_in(self.view.as_ref(), include_private)
    }

    pub fn field_names_in(&self, view: Option<&ViewState>, include_private: bool) -> Vec<String> {
        self.visible_in(view, include_private)
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Names of the document type's static default fields
    pub fn default_field_names(&self, include_private: bool) -> Vec<String> {
        self.document_type
            .default_fields()
            .keys()
            .filter(|name| include_private || !name.starts_with('_'))
            .cloned()
            .collect()
    }

    /// The nested schema under the installed view, filtered by `query`
    pub fn get_field_schema(&self, query: &SchemaQuery) -> SchemaResult<Schema> {
        self.get_field_schema_in(self.view.as_ref(), query)
    }

    /// The nested schema under an explicit view, filtered by `query`
    pub fn get_field_schema_in(
        &self,
        view: Option<&ViewState>,
        query: &SchemaQuery,
    ) -> SchemaResult<Schema> {
        let schema: Schema = self
            .visible_in(view, query.include_private)
            .into_iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect();
        transform::filter_schema(schema, query)
    }

    // =========================================================================
    // Nested schema mutation
    // =========================================================================

    pub(crate) fn set_binding(&mut self, binding: Option<&FieldBinding>) {
        for (name, field) in self.fields_mut().iter_mut() {
            match binding {
                Some(b) => field.bind(b.dataset, &format!("{}.{}", b.path, name)),
                None => field.detach(),
            }
        }
    }

    /// Installs `field` under its own name, replacing any same-named field.
    ///
    /// The previous field's `required`/`nullable` flags carry over and the
    /// previous field is detached. With a `dataset`, the new field is bound at
    /// `path`; without one it stays detached.
    pub fn declare_field(
        &mut self,
        dataset: Option<DatasetId>,
        path: &str,
        mut field: Field,
    ) -> SchemaResult<()> {
        let name = field.name().to_string();
        validate_field_name(&name)?;

        self.declared.retain(|n| n != &name);
        self.declared.push(name.clone());
        self.displace_default(&name);

        let fields = &mut self.fields;
        if let Some(mut prev) = fields.shift_remove(&name) {
            prev.detach();
            field.set_required(prev.required());
            field.set_nullable(prev.nullable());
        }

        match dataset {
            Some(id) => field.bind(id, path),
            None => field.detach(),
        }
        fields.insert(name, field);

        log_event_with_fields(Event::FieldDeclared, &[("path", path)]);
        Ok(())
    }

    /// Moves the field named `old_name` to `field`'s name, bound at `new_path`
    pub fn rename_field(
        &mut self,
        dataset: Option<DatasetId>,
        old_name: &str,
        new_path: &str,
        mut field: Field,
    ) -> SchemaResult<()> {
        let new_name = field.name().to_string();
        validate_field_name(&new_name)?;

        if new_name != old_name && self.fields().contains_key(&new_name) {
            return Err(SchemaError::illegal_transition(
                Some(new_path),
                format!(
                    "cannot rename '{}' to '{}': a field with that name already exists",
                    old_name, new_name
                ),
            ));
        }

        if let Some(pos) = self.declared.iter().position(|n| n == old_name) {
            self.declared[pos] = new_name.clone();
        } else if !self.declared.contains(&new_name) {
            self.declared.push(new_name.clone());
        }
        if new_name != old_name {
            self.declared.retain(|n| n != old_name);
        }
        self.displace_default(old_name);
        self.displace_default(&new_name);

        let fields = &mut self.fields;
        if let Some(mut prev) = fields.shift_remove(old_name) {
            prev.detach();
        }

        match dataset {
            Some(id) => field.bind(id, new_path),
            None => field.detach(),
        }
        fields.insert(new_name.clone(), field);

        log_event_with_fields(
            Event::FieldRenamed,
            &[("from", old_name), ("path", new_path), ("to", &new_name)],
        );
        Ok(())
    }

    /// Detaches and removes `name`. Absent names are a no-op.
    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let mut prev = self.fields.shift_remove(name)?;
        self.declared.retain(|n| n != name);
        self.displace_default(name);
        let path = prev.path().map(str::to_string);
        prev.detach();
        log_event_with_fields(
            Event::FieldRemoved,
            &[("name", name), ("path", path.as_deref().unwrap_or(name))],
        );
        Some(prev)
    }

    /// Computes the fields of `incoming` that this nested schema lacks.
    ///
    /// Returns detached copies keyed by full dotted path (rooted at `path`);
    /// nothing is installed. Same-named fields are checked for compatibility
    /// when `validate` is set; with `recursive`, embedded (and list of
    /// embedded) counterparts are merged level by level.
    pub fn merge_fields(
        &self,
        path: &str,
        incoming: &Field,
        validate: bool,
        recursive: bool,
    ) -> SchemaResult<Schema> {
        let new_fields = self.merge_nested(path, incoming, validate, recursive)?;
        let count = new_fields.len().to_string();
        log_event_with_fields(Event::SchemaMerged, &[("new_fields", &count), ("path", path)]);
        Ok(new_fields)
    }

    pub(crate) fn merge_nested(
        &self,
        path: &str,
        incoming: &Field,
        validate: bool,
        recursive: bool,
    ) -> SchemaResult<Schema> {
        let Some(other) = incoming.as_embedded() else {
            if validate {
                return Err(SchemaError::type_mismatch(
                    path,
                    self.display_name(),
                    incoming.to_string(),
                ));
            }
            return Ok(Schema::new());
        };

        if validate && !other.document_type.is_subclass_of(&self.document_type) {
            return Err(SchemaError::type_mismatch(
                path,
                self.display_name(),
                incoming.to_string(),
            ));
        }

        transform::merge_field_maps(Some(path), self.fields(), other.fields(), validate, recursive)
    }

    fn display_name(&self) -> String {
        format!("EmbeddedDocumentField({})", self.document_type.name())
    }
}

impl PartialEq for EmbeddedDocumentField {
    fn eq(&self, other: &Self) -> bool {
        self.document_type.name() == other.document_type.name()
            && self.declared == other.declared
            && self.displaced == other.displaced
            && self.fields == other.fields
            && self.view == other.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detection_type() -> Arc<DocumentType> {
        DocumentType::builder("Detection")
            .field(Field::object_id("_id"))
            .field(Field::string("label"))
            .field(Field::float("confidence"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_effective_fields_are_defaults_then_declared() {
        let embedded = EmbeddedDocumentField::with_fields(
            detection_type(),
            vec![Field::int("iscrowd"), Field::string("label").with_description("override")],
        );
        let names: Vec<_> = embedded.fields().keys().cloned().collect();
        assert_eq!(names, vec!["_id", "label", "confidence", "iscrowd"]);
        assert_eq!(embedded.fields()["label"].description(), Some("override"));
        assert_eq!(embedded.declared_fields().len(), 2);
    }

    #[test]
    fn test_field_names_hide_private() {
        let embedded = EmbeddedDocumentField::new(detection_type());
        assert_eq!(embedded.field_names(false), vec!["label", "confidence"]);
        assert_eq!(embedded.field_names(true), vec!["_id", "label", "confidence"]);
        assert_eq!(embedded.default_field_names(false), vec!["label", "confidence"]);
    }

    #[test]
    fn test_view_selection_minus_exclusion() {
        let view = ViewState::new()
            .select(["label", "confidence"])
            .exclude(["confidence"]);
        assert!(view.excluded().is_none());
        assert_eq!(view.selected().unwrap().len(), 1);

        let embedded = EmbeddedDocumentField::new(detection_type());
        assert_eq!(embedded.field_names_in(Some(&view), false), vec!["label"]);
        // Explicit views never touch node state
        assert!(embedded.view().is_none());
    }

    #[test]
    fn test_view_virtual_fields_are_transient() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        let view = ViewState::new().with_virtual_field(
            Field::float("area").with_expr(json!({"$multiply": ["$w", "$h"]})),
        );
        embedded.use_view(view);
        assert_eq!(embedded.field_names(false), vec!["label", "confidence", "area"]);
        assert!(embedded.get_field("area").unwrap().is_virtual());
        assert!(!embedded.fields().contains_key("area"));

        embedded.clear_view();
        assert_eq!(embedded.field_names(false), vec!["label", "confidence"]);
        assert!(embedded.get_field("area").is_none());
    }

    #[test]
    fn test_declare_carries_flags_and_detaches_previous() {
        let dataset = DatasetId::new();
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        embedded
            .declare_field(Some(dataset), "gt.score", Field::float("score").with_required(true).with_nullable(false))
            .unwrap();

        embedded
            .declare_field(Some(dataset), "gt.score", Field::int("score").with_description("redeclared"))
            .unwrap();

        let score = &embedded.fields()["score"];
        assert_eq!(score.to_string(), "IntField");
        assert!(score.required());
        assert!(!score.nullable());
        assert_eq!(score.path(), Some("gt.score"));
        assert_eq!(score.dataset(), Some(dataset));
    }

    #[test]
    fn test_declare_without_dataset_stays_detached() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        embedded.declare_field(None, "gt.score", Field::float("score")).unwrap();
        assert!(!embedded.fields()["score"].is_attached());
    }

    #[test]
    fn test_declare_rejects_bad_names() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        let err = embedded.declare_field(None, "gt.a.b", Field::int("a.b")).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VALIDATION_FAILED");
    }

    #[test]
    fn test_rename_moves_binding() {
        let dataset = DatasetId::new();
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        embedded.declare_field(Some(dataset), "gt.score", Field::float("score")).unwrap();

        let renamed = embedded.fields()["score"].copy().renamed("certainty");
        embedded
            .rename_field(Some(dataset), "score", "gt.certainty", renamed)
            .unwrap();

        assert!(!embedded.fields().contains_key("score"));
        assert_eq!(embedded.fields()["certainty"].path(), Some("gt.certainty"));
        assert_eq!(embedded.declared_fields()[0].name(), "certainty");
    }

    #[test]
    fn test_rename_onto_existing_name_rejected() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        let err = embedded
            .rename_field(None, "confidence", "gt.label", Field::float("label"))
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ILLEGAL_TRANSITION");
        assert!(embedded.fields().contains_key("confidence"));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        assert!(embedded.remove_field("missing").is_none());

        let removed = embedded.remove_field("label").unwrap();
        assert!(!removed.is_attached());
        assert!(!embedded.fields().contains_key("label"));
    }

    #[test]
    fn test_renaming_a_default_declares_the_new_name() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        embedded
            .rename_field(None, "confidence", "gt.score", Field::float("score"))
            .unwrap();

        let declared: Vec<_> = embedded.declared_fields().iter().map(|f| f.name()).collect();
        assert_eq!(declared, vec!["score"]);
        assert_eq!(embedded.displaced_defaults(), ["confidence".to_string()]);
    }

    #[test]
    fn test_displaced_defaults_rebuild_same_mapping() {
        let mut embedded = EmbeddedDocumentField::new(detection_type());
        embedded.remove_field("label").unwrap();
        embedded.declare_field(None, "gt._id", Field::object_id("_id")).unwrap();

        let rebuilt = EmbeddedDocumentField::with_fields_excluding(
            detection_type(),
            embedded.declared_fields().into_iter().cloned().collect(),
            embedded.displaced_defaults().to_vec(),
        );
        let names: Vec<_> = rebuilt.fields().keys().cloned().collect();
        assert_eq!(names, vec!["confidence", "_id"]);
        assert_eq!(rebuilt, embedded);
    }

    #[test]
    fn test_nested_schemas_cross_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmbeddedDocumentField>();
        assert_send_sync::<DocumentType>();
        assert_send_sync::<Field>();
        assert_send_sync::<Schema>();
    }
}
