//! Observable schema events
//!
//! Events are explicit and typed. Each schema mutation emits exactly one.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Nested schema mutation
    /// Field installed into an embedded schema
    FieldDeclared,
    /// Field moved to a new name/path
    FieldRenamed,
    /// Field removed from an embedded schema
    FieldRemoved,

    // Persistence
    /// Description/info edits handed to the store
    FieldSaved,
    /// Incoming schema reconciled; carries the count of new fields
    SchemaMerged,

    // Virtual fields
    /// Virtual expression compiled into a pipeline stage
    ExpressionCompiled,

    // Views
    /// View state installed on an embedded field
    ViewApplied,
    /// View state released
    ViewCleared,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::FieldDeclared => "FIELD_DECLARED",
            Event::FieldRenamed => "FIELD_RENAMED",
            Event::FieldRemoved => "FIELD_REMOVED",
            Event::FieldSaved => "FIELD_SAVED",
            Event::SchemaMerged => "SCHEMA_MERGED",
            Event::ExpressionCompiled => "EXPRESSION_COMPILED",
            Event::ViewApplied => "VIEW_APPLIED",
            Event::ViewCleared => "VIEW_CLEARED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
