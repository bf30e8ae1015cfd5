//! Field: the schema node
//!
//! A [`Field`] is a named, typed slot. Shared metadata (description, info,
//! required/nullable flags, virtual expression, binding) lives on the struct;
//! kind-specific payload lives in [`FieldKind`].
//!
//! # Invariants
//!
//! - A field is virtual iff it carries an expression
//! - Regular -> virtual happens once, through [`Field::declare_virtual`] or
//!   [`Field::with_expr`]; virtual -> regular never happens
//! - A bound field knows its dataset by id and its full dotted path; detaching
//!   clears both on the field and every descendant
//! - The compiled pipeline stage is a cache: rebinding drops it, persisted
//!   records never contain it

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::document::DocumentType;
use super::embedded::EmbeddedDocumentField;
use super::errors::{SchemaError, SchemaResult};
use super::store::{DatasetId, SchemaStore};
use super::types::{FieldType, GeoKind};
use super::value::Value;
use crate::observability::{log_event_with_fields, Event};

/// Specialisations of a list field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFlavor {
    Plain,
    HeatmapRange,
    Keypoints,
    PolylinePoints,
    FrameSupport,
    Classes,
    EmbeddedDocuments,
}

/// Specialisations of a dict field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictFlavor {
    Plain,
    IntKeys,
    Targets,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    ObjectId,
    Uuid,
    Boolean,
    Int,
    FrameNumber,
    Float {
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    String,
    Date,
    DateTime,
    /// Absent element field means untyped elements
    List {
        flavor: ListFlavor,
        field: Option<Box<Field>>,
    },
    Dict {
        flavor: DictFlavor,
        field: Option<Box<Field>>,
    },
    Geo(GeoKind),
    Vector,
    Array,
    EmbeddedDocument(EmbeddedDocumentField),
}

impl FieldKind {
    /// The tag for this payload
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::ObjectId => FieldType::ObjectId,
            FieldKind::Uuid => FieldType::Uuid,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Int => FieldType::Int,
            FieldKind::FrameNumber => FieldType::FrameNumber,
            FieldKind::Float { .. } => FieldType::Float,
            FieldKind::String => FieldType::String,
            FieldKind::Date => FieldType::Date,
            FieldKind::DateTime => FieldType::DateTime,
            FieldKind::List { flavor, .. } => match flavor {
                ListFlavor::Plain => FieldType::List,
                ListFlavor::HeatmapRange => FieldType::HeatmapRange,
                ListFlavor::Keypoints => FieldType::Keypoints,
                ListFlavor::PolylinePoints => FieldType::PolylinePoints,
                ListFlavor::FrameSupport => FieldType::FrameSupport,
                ListFlavor::Classes => FieldType::Classes,
                ListFlavor::EmbeddedDocuments => FieldType::EmbeddedDocumentList,
            },
            FieldKind::Dict { flavor, .. } => match flavor {
                DictFlavor::Plain => FieldType::Dict,
                DictFlavor::IntKeys => FieldType::IntDict,
                DictFlavor::Targets => FieldType::Targets,
            },
            FieldKind::Geo(kind) => kind.field_type(),
            FieldKind::Vector => FieldType::Vector,
            FieldKind::Array => FieldType::Array,
            FieldKind::EmbeddedDocument(_) => FieldType::EmbeddedDocument,
        }
    }
}

/// Virtual expression lifecycle.
///
/// Compilation needs a bound path, so it happens lazily on first read after
/// attachment and is cached until the field is rebound.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualExpr {
    Uncompiled(JsonValue),
    Compiled { expr: JsonValue, stage: JsonValue },
}

impl VirtualExpr {
    /// The serializable expression
    pub fn source(&self) -> &JsonValue {
        match self {
            VirtualExpr::Uncompiled(expr) => expr,
            VirtualExpr::Compiled { expr, .. } => expr,
        }
    }

    pub fn stage(&self) -> Option<&JsonValue> {
        match self {
            VirtualExpr::Uncompiled(_) => None,
            VirtualExpr::Compiled { stage, .. } => Some(stage),
        }
    }

    fn uncompiled(&self) -> VirtualExpr {
        VirtualExpr::Uncompiled(self.source().clone())
    }
}

/// Where an attached field lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub dataset: DatasetId,
    pub path: String,
}

/// A named, typed schema node
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    description: Option<String>,
    info: Option<JsonMap<String, JsonValue>>,
    required: bool,
    nullable: bool,
    expr: Option<VirtualExpr>,
    binding: Option<FieldBinding>,
}

impl Field {
    /// Creates a detached, regular field
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            info: None,
            required: false,
            nullable: true,
            expr: None,
            binding: None,
        }
    }

    pub fn object_id(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ObjectId)
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uuid)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn frame_number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::FrameNumber)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Float {
                min_value: None,
                max_value: None,
            },
        )
    }

    /// Float field with inclusive bounds
    pub fn bounded_float(name: impl Into<String>, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        Self::new(name, FieldKind::Float { min_value, max_value })
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    /// List field; `element` describes the element type
    pub fn list(name: impl Into<String>, element: Option<Field>) -> Self {
        Self::container_list(name.into(), ListFlavor::Plain, element)
    }

    pub fn heatmap_range(name: impl Into<String>) -> Self {
        let name = name.into();
        let element = Field::float(name.clone());
        Self::container_list(name, ListFlavor::HeatmapRange, Some(element))
    }

    pub fn keypoints(name: impl Into<String>) -> Self {
        Self::container_list(name.into(), ListFlavor::Keypoints, None)
    }

    pub fn polyline_points(name: impl Into<String>) -> Self {
        Self::container_list(name.into(), ListFlavor::PolylinePoints, None)
    }

    pub fn frame_support(name: impl Into<String>) -> Self {
        let name = name.into();
        let element = Field::int(name.clone());
        Self::container_list(name, ListFlavor::FrameSupport, Some(element))
    }

    pub fn classes(name: impl Into<String>) -> Self {
        let name = name.into();
        let element = Field::string(name.clone());
        Self::container_list(name, ListFlavor::Classes, Some(element))
    }

    /// List of embedded documents of `document_type`
    pub fn embedded_list(name: impl Into<String>, document_type: Arc<DocumentType>) -> Self {
        let name = name.into();
        let element = Field::embedded(name.clone(), document_type);
        Self::container_list(name, ListFlavor::EmbeddedDocuments, Some(element))
    }

    pub fn dict(name: impl Into<String>, element: Option<Field>) -> Self {
        Self::container_dict(name.into(), DictFlavor::Plain, element)
    }

    pub fn int_dict(name: impl Into<String>, element: Option<Field>) -> Self {
        Self::container_dict(name.into(), DictFlavor::IntKeys, element)
    }

    pub fn targets(name: impl Into<String>) -> Self {
        let name = name.into();
        let element = Field::string(name.clone());
        Self::container_dict(name, DictFlavor::Targets, Some(element))
    }

    pub fn geo(name: impl Into<String>, kind: GeoKind) -> Self {
        Self::new(name, FieldKind::Geo(kind))
    }

    pub fn vector(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Vector)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn embedded(name: impl Into<String>, document_type: Arc<DocumentType>) -> Self {
        Self::new(
            name,
            FieldKind::EmbeddedDocument(EmbeddedDocumentField::new(document_type)),
        )
    }

    /// Embedded field with per-instance declared fields
    pub fn embedded_with_fields(
        name: impl Into<String>,
        document_type: Arc<DocumentType>,
        fields: Vec<Field>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::EmbeddedDocument(EmbeddedDocumentField::with_fields(document_type, fields)),
        )
    }

    fn container_list(name: String, flavor: ListFlavor, element: Option<Field>) -> Self {
        let field = element.map(|f| Box::new(f.renamed(&name)));
        Self::new(name, FieldKind::List { flavor, field })
    }

    fn container_dict(name: String, flavor: DictFlavor, element: Option<Field>) -> Self {
        let field = element.map(|f| Box::new(f.renamed(&name)));
        Self::new(name, FieldKind::Dict { flavor, field })
    }

    /// The same field under a new name, as passed to `rename_field`
    pub fn renamed(mut self, name: &str) -> Self {
        self.set_name(name);
        self
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_info(mut self, info: JsonMap<String, JsonValue>) -> Self {
        self.info = Some(info);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Creates the field as virtual. This is the declaration path; it cannot
    /// be undone.
    pub fn with_expr(mut self, expr: JsonValue) -> Self {
        self.expr = Some(VirtualExpr::Uncompiled(expr));
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut FieldKind {
        &mut self.kind
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Fully-qualified dotted path, or `None` when detached
    pub fn path(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.path.as_str())
    }

    pub fn dataset(&self) -> Option<DatasetId> {
        self.binding.as_ref().map(|b| b.dataset)
    }

    pub fn is_attached(&self) -> bool {
        self.binding.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn info(&self) -> Option<&JsonMap<String, JsonValue>> {
        self.info.as_ref()
    }

    pub fn set_info(&mut self, info: Option<JsonMap<String, JsonValue>>) {
        self.info = info;
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn set_nullable(&mut self, nullable: bool) {
        self.nullable = nullable;
    }

    pub fn is_virtual(&self) -> bool {
        self.expr.is_some()
    }

    /// Expression state, without compiling
    pub fn virtual_expr(&self) -> Option<&VirtualExpr> {
        self.expr.as_ref()
    }

    /// Element field of a list/dict container
    pub fn element_field(&self) -> Option<&Field> {
        match &self.kind {
            FieldKind::List { field, .. } | FieldKind::Dict { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    pub fn element_field_mut(&mut self) -> Option<&mut Field> {
        match &mut self.kind {
            FieldKind::List { field, .. } | FieldKind::Dict { field, .. } => field.as_deref_mut(),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, FieldKind::List { .. } | FieldKind::Dict { .. })
    }

    /// Value of an unset slot: empty for containers, null otherwise
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::List { .. } => Value::List(Vec::new()),
            FieldKind::Dict { .. } => Value::Dict(Vec::new()),
            _ => Value::Null,
        }
    }

    /// The embedded payload when this field is itself an embedded document field
    pub fn as_embedded(&self) -> Option<&EmbeddedDocumentField> {
        match &self.kind {
            FieldKind::EmbeddedDocument(embedded) => Some(embedded),
            _ => None,
        }
    }

    pub fn as_embedded_mut(&mut self) -> Option<&mut EmbeddedDocumentField> {
        match &mut self.kind {
            FieldKind::EmbeddedDocument(embedded) => Some(embedded),
            _ => None,
        }
    }

    /// The embedded payload reached through at most one container level.
    ///
    /// This is how nested lookups see `ListField(EmbeddedDocumentField(X))`.
    pub fn nested_embedded(&self) -> Option<&EmbeddedDocumentField> {
        match self.element_field() {
            Some(element) => element.as_embedded(),
            None => self.as_embedded(),
        }
    }

    pub fn nested_embedded_mut(&mut self) -> Option<&mut EmbeddedDocumentField> {
        if self.is_container() {
            self.element_field_mut()?.as_embedded_mut()
        } else {
            self.as_embedded_mut()
        }
    }

    // =========================================================================
    // Virtual expression state machine
    // =========================================================================

    /// Turns a regular field virtual. Allowed exactly once.
    pub fn declare_virtual(&mut self, expr: JsonValue) -> SchemaResult<()> {
        if self.is_virtual() {
            return Err(SchemaError::illegal_transition(
                self.path(),
                "field is already virtual",
            ));
        }
        self.expr = Some(VirtualExpr::Uncompiled(expr));
        Ok(())
    }

    /// Replaces the expression of a virtual field.
    ///
    /// - virtual + `Some` replaces the expression and drops the compiled stage
    /// - regular + `None` is a no-op
    /// - regular + `Some` fails: use [`Field::declare_virtual`]
    /// - virtual + `None` fails: virtual fields stay virtual
    pub fn set_expression(&mut self, expr: Option<JsonValue>) -> SchemaResult<()> {
        match (self.is_virtual(), expr) {
            (true, Some(expr)) => {
                self.expr = Some(VirtualExpr::Uncompiled(expr));
                Ok(())
            }
            (false, None) => Ok(()),
            (false, Some(_)) => Err(SchemaError::illegal_transition(
                self.path(),
                "Regular fields cannot be transformed into virtual fields",
            )),
            (true, None) => Err(SchemaError::illegal_transition(
                self.path(),
                "Virtual fields cannot be transformed into regular fields",
            )),
        }
    }

    /// Returns the serializable expression, compiling it first when the field
    /// is attached to `store`'s dataset.
    ///
    /// Detached fields return their source expression uncompiled.
    pub fn get_expression(&mut self, store: &dyn SchemaStore) -> SchemaResult<Option<&JsonValue>> {
        if self.is_attached() && self.is_virtual() {
            self.compile_expression(store)?;
        }
        Ok(self.expr.as_ref().map(VirtualExpr::source))
    }

    /// Returns the compiled pipeline stage of a virtual field.
    ///
    /// Requires the field to be attached to `store`'s dataset.
    pub fn compiled_stage(&mut self, store: &dyn SchemaStore) -> SchemaResult<Option<&JsonValue>> {
        if !self.is_virtual() {
            return Ok(None);
        }
        self.compile_expression(store)?;
        Ok(self.expr.as_ref().and_then(VirtualExpr::stage))
    }

    fn compile_expression(&mut self, store: &dyn SchemaStore) -> SchemaResult<()> {
        let binding = self.binding.as_ref().ok_or_else(|| {
            SchemaError::detached(&self.name, "virtual expressions compile only once attached")
        })?;
        if binding.dataset != store.dataset_id() {
            return Err(SchemaError::detached(
                &self.name,
                format!("field belongs to dataset {}, not {}", binding.dataset, store.dataset_id()),
            ));
        }

        if let Some(VirtualExpr::Uncompiled(source)) = &self.expr {
            let compiled = store.compile_virtual_expression(&binding.path, source, true)?;
            log_event_with_fields(Event::ExpressionCompiled, &[("path", binding.path.as_str())]);
            self.expr = Some(VirtualExpr::Compiled {
                expr: compiled.expr,
                stage: compiled.stage,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Binds this field and its descendants to `dataset` at `path`.
    ///
    /// Any compiled stage is dropped since it was bound to the old path.
    pub(crate) fn bind(&mut self, dataset: DatasetId, path: &str) {
        self.set_binding(Some(FieldBinding {
            dataset,
            path: path.to_string(),
        }));
    }

    /// Clears dataset/path on this field and every descendant
    pub(crate) fn detach(&mut self) {
        self.set_binding(None);
    }

    fn set_binding(&mut self, binding: Option<FieldBinding>) {
        if let Some(expr) = &self.expr {
            self.expr = Some(expr.uncompiled());
        }

        match &mut self.kind {
            FieldKind::List { field: Some(element), .. } | FieldKind::Dict { field: Some(element), .. } => {
                element.set_binding(binding.clone());
            }
            FieldKind::EmbeddedDocument(embedded) => embedded.set_binding(binding.as_ref()),
            _ => {}
        }

        self.binding = binding;
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        if let Some(element) = self.element_field_mut() {
            element.set_name(name);
        }
    }

    /// Deep copy detached from any dataset; shares no state with `self`
    pub fn copy(&self) -> Field {
        let mut field = self.clone();
        field.detach();
        field
    }

    /// Persists description/info edits. No-op when detached.
    pub fn persist_edits(&self, store: &mut dyn SchemaStore) -> SchemaResult<()> {
        let Some(binding) = &self.binding else {
            return Ok(());
        };
        if binding.dataset != store.dataset_id() {
            return Err(SchemaError::detached(
                &self.name,
                format!("field belongs to dataset {}, not {}", binding.dataset, store.dataset_id()),
            ));
        }
        store.save_field(self)?;
        log_event_with_fields(Event::FieldSaved, &[("path", binding.path.as_str())]);
        Ok(())
    }
}

impl fmt::Display for Field {
    /// `ListField(IntField)`, `EmbeddedDocumentField(Detection)`; specialised
    /// containers render their bare type name
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.field_type();
        match &self.kind {
            FieldKind::List {
                flavor: ListFlavor::Plain,
                field: Some(element),
            }
            | FieldKind::Dict {
                flavor: DictFlavor::Plain,
                field: Some(element),
            } => write!(f, "{}({})", tag, element),
            FieldKind::List {
                flavor: ListFlavor::EmbeddedDocuments,
                field: Some(element),
            } => match element.as_embedded() {
                Some(embedded) => write!(f, "{}({})", tag, embedded.document_type().name()),
                None => write!(f, "{}", tag),
            },
            FieldKind::EmbeddedDocument(embedded) => {
                write!(f, "{}({})", tag, embedded.document_type().name())
            }
            _ => write!(f, "{}", tag),
        }
    }
}

/// Field names cannot be empty, contain `.`, or start with `$`
pub fn validate_field_name(name: &str) -> SchemaResult<()> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new(r"^[^.$][^.]*$").expect("static regex"));
    if re.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::validation(format!(
            "Invalid field name '{}'; names cannot be empty, contain '.', or start with '$'",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::store::MemorySchemaStore;
    use serde_json::json;

    #[test]
    fn test_default_values() {
        assert_eq!(Field::classes("c").default_value(), Value::List(Vec::new()));
        assert_eq!(Field::targets("t").default_value(), Value::Dict(Vec::new()));
        assert_eq!(Field::int("n").default_value(), Value::Null);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Field::int("n").to_string(), "IntField");
        assert_eq!(
            Field::list("tags", Some(Field::string("tags"))).to_string(),
            "ListField(StringField)"
        );
        assert_eq!(Field::list("raw", None).to_string(), "ListField");
        assert_eq!(Field::classes("c").to_string(), "ClassesField");
        assert_eq!(
            Field::dict("d", Some(Field::float("d"))).to_string(),
            "DictField(FloatField)"
        );
        let doc = DocumentType::builder("Detection").build().unwrap();
        assert_eq!(
            Field::embedded("gt", Arc::clone(&doc)).to_string(),
            "EmbeddedDocumentField(Detection)"
        );
        assert_eq!(
            Field::embedded_list("dets", doc).to_string(),
            "EmbeddedDocumentListField(Detection)"
        );
    }

    #[test]
    fn test_virtual_iff_expression() {
        let field = Field::int("n");
        assert!(!field.is_virtual());
        let field = field.with_expr(json!({"$size": "$tags"}));
        assert!(field.is_virtual());
    }

    #[test]
    fn test_regular_field_cannot_gain_expression_via_setter() {
        let mut field = Field::int("n");
        let err = field.set_expression(Some(json!(1))).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ILLEGAL_TRANSITION");
        assert!(!field.is_virtual());

        assert!(field.set_expression(None).is_ok());
    }

    #[test]
    fn test_declare_virtual_once() {
        let mut field = Field::float("area");
        field.declare_virtual(json!({"$multiply": ["$w", "$h"]})).unwrap();
        assert!(field.is_virtual());

        let err = field.declare_virtual(json!(0)).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ILLEGAL_TRANSITION");

        let err = field.set_expression(None).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ILLEGAL_TRANSITION");
        assert!(field.is_virtual());
    }

    #[test]
    fn test_compilation_requires_attachment() {
        let store = MemorySchemaStore::new();
        let mut field = Field::int("n").with_expr(json!({"$size": "$tags"}));

        let err = field.compiled_stage(&store).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_FIELD_DETACHED");

        // Detached reads still see the source expression
        assert_eq!(field.get_expression(&store).unwrap(), Some(&json!({"$size": "$tags"})));
        assert_eq!(store.compilations(), 0);
    }

    #[test]
    fn test_compilation_is_cached_until_rebind() {
        let store = MemorySchemaStore::new();
        let mut field = Field::int("n").with_expr(json!({"$size": "$tags"}));
        field.bind(store.dataset_id(), "n");

        let stage = field.compiled_stage(&store).unwrap().cloned();
        assert_eq!(stage, Some(json!({"$set": {"n": {"$size": "$tags"}}})));
        field.compiled_stage(&store).unwrap();
        assert_eq!(store.compilations(), 1);

        field.bind(store.dataset_id(), "renamed");
        assert!(field.virtual_expr().unwrap().stage().is_none());
        field.compiled_stage(&store).unwrap();
        assert_eq!(store.compilations(), 2);
    }

    #[test]
    fn test_compilation_rejects_foreign_dataset() {
        let store = MemorySchemaStore::new();
        let mut field = Field::int("n").with_expr(json!(1));
        field.bind(DatasetId::new(), "n");
        let err = field.compiled_stage(&store).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_FIELD_DETACHED");
    }

    #[test]
    fn test_copy_is_detached_recursively() {
        let mut field = Field::list("scores", Some(Field::float("scores")));
        field.bind(DatasetId::new(), "scores");
        assert!(field.element_field().unwrap().is_attached());

        let copy = field.copy();
        assert!(!copy.is_attached());
        assert!(!copy.element_field().unwrap().is_attached());
        assert!(field.is_attached());
    }

    #[test]
    fn test_copy_shares_no_mutable_state() {
        let original = Field::string("label").with_description("original");
        let mut copy = original.copy();
        copy.set_description(Some("edited".into()));
        assert_eq!(original.description(), Some("original"));
    }

    #[test]
    fn test_persist_edits_noop_when_detached() {
        let mut store = MemorySchemaStore::new();
        let field = Field::int("n").with_description("count");
        field.persist_edits(&mut store).unwrap();
        assert_eq!(store.saved_count(), 0);
    }

    #[test]
    fn test_persist_edits_when_attached() {
        let mut store = MemorySchemaStore::new();
        let mut field = Field::int("n");
        field.bind(store.dataset_id(), "n");
        field.set_description(Some("count".into()));
        let mut info = JsonMap::new();
        info.insert("url".into(), json!("https://example.com"));
        field.set_info(Some(info));
        field.persist_edits(&mut store).unwrap();

        let record = store.saved("n").unwrap();
        assert_eq!(record.description.as_deref(), Some("count"));
        assert_eq!(record.info.as_ref().unwrap()["url"], "https://example.com");
    }

    #[test]
    fn test_field_names() {
        assert!(validate_field_name("ground_truth").is_ok());
        assert!(validate_field_name("_private").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("a.b").is_err());
        assert!(validate_field_name("$expr").is_err());
    }
}
