//! Embedded Document Field Tests
//!
//! Nested schema lifecycle of embedded document fields:
//! - Declaring, renaming and removing nested fields keeps bindings right
//! - Merging reports only the fields the nested schema lacks
//! - Views change what is visible without touching the declared schema
//! - Virtual expressions compile lazily against the owning dataset
//! - Description/info edits persist only for attached fields

use std::sync::Arc;

use docschema::schema::{
    DatasetId, DocumentType, DocumentTypeRegistry, Field, FieldKind, FieldRecord, FieldType,
    ListFlavor, MemorySchemaStore, Schema, SchemaQuery, SchemaStore, ViewState,
};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn detection_type() -> Arc<DocumentType> {
    DocumentType::builder("Detection")
        .field(Field::object_id("_id"))
        .field(Field::string("label"))
        .field(Field::float("confidence"))
        .build()
        .unwrap()
}

fn detections_type(detection: &Arc<DocumentType>) -> Arc<DocumentType> {
    DocumentType::builder("Detections")
        .field(Field::embedded_list("detections", Arc::clone(detection)))
        .build()
        .unwrap()
}

fn ground_truth() -> Field {
    Field::embedded("gt", detection_type())
}

fn names(field: &Field) -> Vec<String> {
    field.as_embedded().unwrap().field_names(false)
}

// =============================================================================
// Declare / Rename / Remove Tests
// =============================================================================

/// Declared fields are bound under the parent's path.
#[test]
fn test_declare_binds_nested_field() {
    let dataset = DatasetId::new();
    let mut gt = ground_truth();
    let embedded = gt.as_embedded_mut().unwrap();

    embedded
        .declare_field(Some(dataset), "gt.area", Field::float("area"))
        .unwrap();

    let area = embedded.get_field("area").unwrap();
    assert_eq!(area.path(), Some("gt.area"));
    assert_eq!(area.dataset(), Some(dataset));
    assert_eq!(
        embedded
            .declared_fields()
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>(),
        vec!["area"]
    );
    assert_eq!(names(&gt), vec!["label", "confidence", "area"]);
}

/// Redeclaring a field moves it after the others.
#[test]
fn test_redeclare_moves_field_last() {
    let mut gt = ground_truth();
    gt.as_embedded_mut()
        .unwrap()
        .declare_field(None, "gt.label", Field::classes("label"))
        .unwrap();

    assert_eq!(names(&gt), vec!["confidence", "label"]);
    assert_eq!(
        gt.as_embedded().unwrap().get_field("label").unwrap().field_type(),
        FieldType::Classes
    );
}

/// Invalid names are refused before anything changes.
#[test]
fn test_declare_rejects_dotted_names() {
    let mut gt = ground_truth();
    let err = gt
        .as_embedded_mut()
        .unwrap()
        .declare_field(None, "gt.a.b", Field::int("a.b"))
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_VALIDATION_FAILED");
    assert_eq!(names(&gt), vec!["label", "confidence"]);
}

/// Renaming rebinds under the new path and refuses to clobber.
#[test]
fn test_rename_field() {
    let dataset = DatasetId::new();
    let mut gt = ground_truth();
    let embedded = gt.as_embedded_mut().unwrap();

    let renamed = embedded.get_field("label").unwrap().clone().renamed("name");
    embedded
        .rename_field(Some(dataset), "label", "gt.name", renamed)
        .unwrap();

    assert!(embedded.get_field("label").is_none());
    assert_eq!(embedded.get_field("name").unwrap().path(), Some("gt.name"));

    let clobber = embedded.get_field("name").unwrap().clone().renamed("confidence");
    let err = embedded
        .rename_field(Some(dataset), "name", "gt.confidence", clobber)
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_ILLEGAL_TRANSITION");
    assert_eq!(names(&gt), vec!["confidence", "name"]);
}

/// Removed fields come back detached; absent names are a no-op.
#[test]
fn test_remove_field() {
    let dataset = DatasetId::new();
    let mut gt = ground_truth();
    let embedded = gt.as_embedded_mut().unwrap();
    embedded
        .declare_field(Some(dataset), "gt.area", Field::float("area"))
        .unwrap();

    let removed = embedded.remove_field("area").unwrap();
    assert!(!removed.is_attached());
    assert!(embedded.remove_field("area").is_none());
    assert!(embedded.declared_fields().is_empty());
}

/// Static defaults are reported separately from the effective fields.
#[test]
fn test_default_field_names() {
    let gt = ground_truth();
    let embedded = gt.as_embedded().unwrap();
    assert_eq!(embedded.default_field_names(false), vec!["label", "confidence"]);
    assert_eq!(embedded.default_field_names(true), vec!["_id", "label", "confidence"]);
}

// =============================================================================
// Merge Tests
// =============================================================================

/// Only missing nested fields are returned, keyed by full path.
#[test]
fn test_merge_reports_new_fields() {
    let detection = detection_type();
    let gt = ground_truth();
    let incoming = Field::embedded_with_fields(
        "gt",
        detection,
        vec![Field::string("label"), Field::int("area")],
    );

    let new_fields = gt
        .as_embedded()
        .unwrap()
        .merge_fields("gt", &incoming, true, true)
        .unwrap();
    assert_eq!(new_fields.keys().collect::<Vec<_>>(), vec!["gt.area"]);
    assert!(!new_fields.get("gt.area").unwrap().is_attached());
}

/// Non-embedded or unrelated incoming fields fail only when validating.
#[test]
fn test_merge_type_checks() {
    let gt = ground_truth();
    let embedded = gt.as_embedded().unwrap();

    let err = embedded
        .merge_fields("gt", &Field::string("gt"), true, true)
        .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_TYPE_MISMATCH");
    assert!(embedded
        .merge_fields("gt", &Field::string("gt"), false, true)
        .unwrap()
        .is_empty());

    let keypoint = DocumentType::builder("Keypoint")
        .field(Field::keypoints("points"))
        .build()
        .unwrap();
    let err = embedded
        .merge_fields("gt", &Field::embedded("gt", keypoint), true, true)
        .unwrap_err();
    assert!(err.to_string().contains("EmbeddedDocumentField(Keypoint)"));
}

/// Subclass documents merge into their parent's field.
#[test]
fn test_merge_accepts_subclass() {
    let detection = detection_type();
    let rotated = DocumentType::builder("RotatedDetection")
        .parent(&detection)
        .field(Field::float("theta"))
        .build()
        .unwrap();

    let gt = Field::embedded("gt", detection);
    let new_fields = gt
        .as_embedded()
        .unwrap()
        .merge_fields("gt", &Field::embedded("gt", rotated), true, true)
        .unwrap();
    assert_eq!(new_fields.keys().collect::<Vec<_>>(), vec!["gt.theta"]);
}

/// Lists of embedded documents are merged through their elements.
#[test]
fn test_merge_recurses_through_lists() {
    let detection = detection_type();
    let detections = detections_type(&detection);

    let existing = Field::embedded("gt", Arc::clone(&detections));
    let element = Field::embedded_with_fields("detections", detection, vec![Field::float("area")]);
    let incoming_list = Field::new(
        "detections",
        FieldKind::List {
            flavor: ListFlavor::EmbeddedDocuments,
            field: Some(Box::new(element)),
        },
    );
    let incoming = Field::embedded_with_fields("gt", detections, vec![incoming_list]);

    let embedded = existing.as_embedded().unwrap();
    let recursive = embedded.merge_fields("gt", &incoming, true, true).unwrap();
    assert_eq!(
        recursive.keys().collect::<Vec<_>>(),
        vec!["gt.detections.area"]
    );

    let shallow = embedded.merge_fields("gt", &incoming, true, false).unwrap();
    assert!(shallow.is_empty());
}

// =============================================================================
// View Tests
// =============================================================================

/// Selection and exclusion hide fields for as long as the view is installed.
#[test]
fn test_view_selection() {
    let mut gt = ground_truth();
    let embedded = gt.as_embedded_mut().unwrap();

    embedded.use_view(ViewState::new().select(["label"]));
    assert_eq!(embedded.field_names(false), vec!["label"]);
    assert_eq!(
        embedded
            .get_field_schema(&SchemaQuery::new())
            .unwrap()
            .keys()
            .collect::<Vec<_>>(),
        vec!["label"]
    );

    assert!(embedded.clear_view().is_some());
    assert_eq!(embedded.field_names(false), vec!["label", "confidence"]);
    assert!(embedded.clear_view().is_none());
}

/// An explicit view applies to one read only.
#[test]
fn test_explicit_view() {
    let gt = ground_truth();
    let embedded = gt.as_embedded().unwrap();
    let view = ViewState::new().exclude(["confidence"]);

    assert_eq!(embedded.field_names_in(Some(&view), false), vec!["label"]);
    assert_eq!(embedded.field_names(false), vec!["label", "confidence"]);
    assert!(embedded.view().is_none());
}

/// Selecting and then excluding keeps the difference.
#[test]
fn test_view_select_minus_exclude() {
    let gt = ground_truth();
    let view = ViewState::new()
        .select(["label", "confidence"])
        .exclude(["confidence"]);
    assert_eq!(
        gt.as_embedded().unwrap().field_names_in(Some(&view), false),
        vec!["label"]
    );
}

/// View virtual fields are visible through the view and never recorded.
#[test]
fn test_view_virtual_fields_are_transient() {
    let mut gt = ground_truth();
    let area = Field::float("area").with_expr(json!({"$multiply": ["$w", "$h"]}));
    gt.as_embedded_mut()
        .unwrap()
        .use_view(ViewState::new().with_virtual_field(area));

    let embedded = gt.as_embedded().unwrap();
    assert!(embedded.get_field("area").unwrap().is_virtual());
    assert_eq!(embedded.field_names(false), vec!["label", "confidence", "area"]);

    let virtual_schema = embedded
        .get_field_schema(&SchemaQuery::new().is_virtual(true))
        .unwrap();
    assert_eq!(virtual_schema.keys().collect::<Vec<_>>(), vec!["area"]);

    let record = FieldRecord::from_field(&gt);
    assert_eq!(record.fields, Some(Vec::new()));

    gt.as_embedded_mut().unwrap().clear_view();
    assert!(gt.as_embedded().unwrap().get_field("area").is_none());
}

// =============================================================================
// Virtual Expression Tests
// =============================================================================

fn attached_virtual(dataset: DatasetId) -> Field {
    let mut gt = ground_truth();
    gt.as_embedded_mut()
        .unwrap()
        .declare_field(
            Some(dataset),
            "gt.area",
            Field::float("area").with_expr(json!({"$multiply": ["$w", "$h"]})),
        )
        .unwrap();
    gt
}

/// The stage compiles once and is cached.
#[test]
fn test_compiled_stage_is_cached() {
    let store = MemorySchemaStore::new();
    let mut gt = attached_virtual(store.dataset_id());
    let area = gt.as_embedded_mut().unwrap().fields_mut().get_mut("area").unwrap();

    let stage = area.compiled_stage(&store).unwrap().cloned();
    assert_eq!(
        stage,
        Some(json!({"$set": {"gt.area": {"$multiply": ["$w", "$h"]}}}))
    );
    area.compiled_stage(&store).unwrap();
    assert_eq!(store.compilations(), 1);
}

/// Compilation needs the field's own dataset.
#[test]
fn test_compile_requires_attachment() {
    let store = MemorySchemaStore::new();

    let mut detached = Field::float("area").with_expr(json!({"$literal": 1}));
    let err = detached.compiled_stage(&store).unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_DETACHED");
    assert_eq!(
        detached.get_expression(&store).unwrap(),
        Some(&json!({"$literal": 1}))
    );

    let mut gt = attached_virtual(DatasetId::new());
    let area = gt.as_embedded_mut().unwrap().fields_mut().get_mut("area").unwrap();
    assert_eq!(
        area.compiled_stage(&store).unwrap_err().code(),
        "SCHEMA_FIELD_DETACHED"
    );
    assert_eq!(store.compilations(), 0);
}

/// Top-level virtual fields compile once declared into the dataset schema.
#[test]
fn test_top_level_virtual_field_compiles() {
    let mut store = MemorySchemaStore::new();
    let mut schema = Schema::new();
    schema
        .declare(
            Some(store.dataset_id()),
            Field::int("num_objects").with_expr(json!({"$size": "$detections"})),
        )
        .unwrap();

    let field = schema.get_field_mut("num_objects").unwrap();
    assert_eq!(
        field.compiled_stage(&store).unwrap().cloned(),
        Some(json!({"$set": {"num_objects": {"$size": "$detections"}}}))
    );

    field.set_description(Some("detection count".into()));
    field.persist_edits(&mut store).unwrap();
    let record = store.saved("num_objects").unwrap();
    assert_eq!(record.description.as_deref(), Some("detection count"));

    let removed = schema.remove("num_objects").unwrap();
    assert!(!removed.is_attached());
    assert!(removed.virtual_expr().unwrap().stage().is_none());
}

/// Inserted fields stay detached until the schema is attached.
#[test]
fn test_attach_inserted_schema() {
    let store = MemorySchemaStore::new();
    let mut schema = Schema::new();
    schema.insert("gt", attached_virtual(DatasetId::new()));
    schema.attach(store.dataset_id());

    let area = schema.get_field_mut("gt.area").unwrap();
    assert_eq!(area.path(), Some("gt.area"));
    assert_eq!(
        area.compiled_stage(&store).unwrap().cloned(),
        Some(json!({"$set": {"gt.area": {"$multiply": ["$w", "$h"]}}}))
    );
}

/// Virtuality is one way.
#[test]
fn test_expression_transitions() {
    let mut regular = Field::int("n");
    assert!(regular.set_expression(None).is_ok());
    assert_eq!(
        regular.set_expression(Some(json!(1))).unwrap_err().code(),
        "SCHEMA_ILLEGAL_TRANSITION"
    );

    regular.declare_virtual(json!({"$size": "$tags"})).unwrap();
    assert!(regular.is_virtual());
    assert!(regular.declare_virtual(json!(1)).is_err());
    assert!(regular.set_expression(Some(json!({"$size": "$labels"}))).is_ok());
    assert_eq!(
        regular.set_expression(None).unwrap_err().code(),
        "SCHEMA_ILLEGAL_TRANSITION"
    );
}

/// Rebinding drops the compiled stage.
#[test]
fn test_copy_is_detached_and_uncompiled() {
    let store = MemorySchemaStore::new();
    let mut gt = attached_virtual(store.dataset_id());
    let area = gt.as_embedded_mut().unwrap().fields_mut().get_mut("area").unwrap();
    area.compiled_stage(&store).unwrap();

    let copy = area.copy();
    assert!(!copy.is_attached());
    assert!(copy.virtual_expr().unwrap().stage().is_none());
    assert!(area.virtual_expr().unwrap().stage().is_some());
}

// =============================================================================
// Persistence Tests
// =============================================================================

/// Attached edits are saved by path; detached edits are local.
#[test]
fn test_persist_edits() {
    let mut store = MemorySchemaStore::new();
    let mut gt = attached_virtual(store.dataset_id());
    let area = gt.as_embedded_mut().unwrap().fields_mut().get_mut("area").unwrap();

    area.set_description(Some("box area".into()));
    area.set_info(Some(json!({"units": "px"}).as_object().unwrap().clone()));
    area.persist_edits(&mut store).unwrap();

    let record = store.saved("gt.area").unwrap();
    assert_eq!(record.description.as_deref(), Some("box area"));
    assert_eq!(record.info.as_ref().unwrap()["units"], json!("px"));
    assert_eq!(record.expr, Some(json!({"$multiply": ["$w", "$h"]})));

    let detached = Field::int("n").with_description("local");
    detached.persist_edits(&mut store).unwrap();
    assert_eq!(store.saved_count(), 1);

    let mut foreign = MemorySchemaStore::new();
    assert_eq!(
        area.persist_edits(&mut foreign).unwrap_err().code(),
        "SCHEMA_FIELD_DETACHED"
    );
}

/// Renamed, removed and redeclared defaults survive a saved record.
#[test]
fn test_default_edits_survive_record_round_trip() {
    let mut registry = DocumentTypeRegistry::new();
    registry.register(detection_type()).unwrap();

    let mut gt = Field::embedded("gt", registry.resolve("Detection").unwrap());
    let embedded = gt.as_embedded_mut().unwrap();
    let score = embedded.get_field("confidence").unwrap().copy().renamed("score");
    embedded
        .rename_field(None, "confidence", "gt.score", score)
        .unwrap();
    embedded.remove_field("_id").unwrap();
    embedded
        .declare_field(None, "gt.label", Field::classes("label"))
        .unwrap();
    assert_eq!(names(&gt), vec!["score", "label"]);

    let json = FieldRecord::from_field(&gt).to_json().unwrap();
    let restored = FieldRecord::from_json(&json)
        .unwrap()
        .to_field(&registry)
        .unwrap();

    assert_eq!(names(&restored), vec!["score", "label"]);
    assert_eq!(restored.as_embedded().unwrap().field_names(true), vec!["score", "label"]);
    assert_eq!(restored, gt);
}
