//! Schema context for a top-level read.

use odata_edm::{EdmModel, EdmType};

use crate::error::{ODataReaderError, Result};

/// What the caller expects the payload to be.
///
/// Built by the caller, then resolved exactly once against the model when a
/// reader is created; readers only ever see the resolved form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReaderMetadata {
    pub expected_type: Option<EdmType>,
    pub entity_set: Option<String>,
    /// `(declaring type, property)` for property and collection payloads.
    pub structural_property: Option<(String, String)>,
    /// `(declaring type, property)` for entity reference link payloads.
    pub navigation_property: Option<(String, String)>,
    pub operation_import: Option<String>,
}

impl ReaderMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expected_type(mut self, type_: EdmType) -> Self {
        self.expected_type = Some(type_);
        self
    }

    pub fn with_entity_set(mut self, name: impl Into<String>) -> Self {
        self.entity_set = Some(name.into());
        self
    }

    pub fn with_structural_property(
        mut self,
        declaring_type: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        self.structural_property = Some((declaring_type.into(), property.into()));
        self
    }

    pub fn with_navigation_property(
        mut self,
        declaring_type: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        self.navigation_property = Some((declaring_type.into(), property.into()));
        self
    }

    pub fn with_operation_import(mut self, name: impl Into<String>) -> Self {
        self.operation_import = Some(name.into());
        self
    }

    /// Validates names against `model` and fills in the expected type.
    ///
    /// Without a model every name is taken on trust and only an explicit
    /// expected type is kept.
    pub fn resolve(mut self, model: Option<&EdmModel>) -> Result<Self> {
        let Some(model) = model else {
            return Ok(self);
        };
        if let Some(set_name) = self.entity_set.as_deref() {
            let set = model.find_entity_set(set_name).ok_or_else(|| {
                ODataReaderError::argument("entity_set", format!("unknown entity set '{set_name}'"))
            })?;
            let set_type = set.entity_type.clone();
            match &self.expected_type {
                Some(EdmType::Entity(name)) if !model.is_assignable(name, &set_type) => {
                    return Err(ODataReaderError::IncompatibleType {
                        actual: name.clone(),
                        expected: set_type,
                    });
                }
                Some(_) => {}
                None => self.expected_type = Some(EdmType::Entity(set_type)),
            }
        }
        if let Some((owner, name)) = self.structural_property.as_ref() {
            let property = model.structural_property(owner, name).ok_or_else(|| {
                ODataReaderError::argument(
                    "structural_property",
                    format!("type '{owner}' declares no property '{name}'"),
                )
            })?;
            if self.expected_type.is_none() {
                self.expected_type = Some(property.type_.clone());
            }
        }
        if let Some((owner, name)) = self.navigation_property.as_ref() {
            let nav = model.navigation_property(owner, name).ok_or_else(|| {
                ODataReaderError::argument(
                    "navigation_property",
                    format!("type '{owner}' declares no navigation property '{name}'"),
                )
            })?;
            if self.expected_type.is_none() {
                self.expected_type = Some(nav.type_());
            }
        }
        if let Some(import) = self.operation_import.as_deref() {
            if model.imported_operation(import).is_none() {
                return Err(ODataReaderError::argument(
                    "operation_import",
                    format!("unknown operation import '{import}'"),
                ));
            }
        }
        if let Some(expected) = &self.expected_type {
            let name = expected.full_name();
            let resolved = model
                .find_type(&name)
                .ok_or(ODataReaderError::UnresolvedType(name))?;
            self.expected_type = Some(resolved);
        }
        Ok(self)
    }
}
