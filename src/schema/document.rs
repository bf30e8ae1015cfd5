//! Document-type descriptors
//!
//! A [`DocumentType`] describes an embedded document class: a name, an
//! optional parent type and the static default field mapping every instance
//! starts from. Subtypes inherit their parent's defaults and may override them.
//!
//! The `is_subclass_of` relation backs `embedded_doc_type` constraints and
//! merge compatibility checks.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::errors::{SchemaError, SchemaResult};
use super::field::{validate_field_name, Field};

/// An embedded document type
#[derive(Debug, Clone)]
pub struct DocumentType {
    name: String,
    parent: Option<Arc<DocumentType>>,
    fields: IndexMap<String, Field>,
}

impl DocumentType {
    /// Starts building a root document type
    pub fn builder(name: impl Into<String>) -> DocumentTypeBuilder {
        DocumentTypeBuilder {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<DocumentType>> {
        self.parent.as_ref()
    }

    /// The static default fields, including inherited ones
    pub fn default_fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Whether `self` is `other` or derives from it
    pub fn is_subclass_of(&self, other: &DocumentType) -> bool {
        let mut current = Some(self);
        while let Some(doc_type) = current {
            if doc_type.name == other.name {
                return true;
            }
            current = doc_type.parent.as_deref();
        }
        false
    }
}

/// Builder for [`DocumentType`]
pub struct DocumentTypeBuilder {
    name: String,
    parent: Option<Arc<DocumentType>>,
    fields: Vec<Field>,
}

impl DocumentTypeBuilder {
    pub fn parent(mut self, parent: &Arc<DocumentType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Builds the type; default field names must be valid and unique
    pub fn build(self) -> SchemaResult<Arc<DocumentType>> {
        if self.name.is_empty() {
            return Err(SchemaError::validation("Document type name cannot be empty"));
        }

        let mut fields = match &self.parent {
            Some(parent) => parent.fields.clone(),
            None => IndexMap::new(),
        };

        let mut own = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            validate_field_name(field.name())?;
            if own.contains(&field.name().to_string()) {
                return Err(SchemaError::validation(format!(
                    "Document type '{}' declares field '{}' twice",
                    self.name,
                    field.name()
                )));
            }
            own.push(field.name().to_string());
            fields.insert(field.name().to_string(), field.copy());
        }

        Ok(Arc::new(DocumentType {
            name: self.name,
            parent: self.parent,
            fields,
        }))
    }
}

/// Resolves document types by name
#[derive(Debug, Clone, Default)]
pub struct DocumentTypeRegistry {
    types: HashMap<String, Arc<DocumentType>>,
}

impl DocumentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type. Names are unique.
    pub fn register(&mut self, doc_type: Arc<DocumentType>) -> SchemaResult<()> {
        if self.types.contains_key(doc_type.name()) {
            return Err(SchemaError::constraint(
                "embedded_doc_type",
                format!("document type '{}' is already registered", doc_type.name()),
            ));
        }
        self.types.insert(doc_type.name().to_string(), doc_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DocumentType>> {
        self.types.get(name)
    }

    /// Looks up a type, failing with a constraint error when unknown
    pub fn resolve(&self, name: &str) -> SchemaResult<Arc<DocumentType>> {
        self.types.get(name).cloned().ok_or_else(|| {
            SchemaError::constraint(
                "embedded_doc_type",
                format!("'{}' is not a registered embedded document type", name),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
