//! Schema model: structured types, entity container and operations.
//!
//! All lookups are by qualified name and return `Option`, so a reader holding
//! no model (or an incomplete one) degrades to untyped reading.

use indexmap::IndexMap;

use crate::types::{split_collection, EdmPrimitiveKind, EdmType};
use crate::EdmError;

/// A declared structural (non-navigation) property.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmStructuralProperty {
    pub name: String,
    pub type_: EdmType,
    pub nullable: bool,
}

impl EdmStructuralProperty {
    pub fn new(name: impl Into<String>, type_: EdmType) -> Self {
        Self {
            name: name.into(),
            type_,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A declared navigation property.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmNavigationProperty {
    pub name: String,
    /// Qualified name of the target entity type.
    pub target: String,
    pub is_collection: bool,
}

impl EdmNavigationProperty {
    pub fn single(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            is_collection: false,
        }
    }

    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            is_collection: true,
        }
    }

    pub fn type_(&self) -> EdmType {
        let target = EdmType::Entity(self.target.clone());
        if self.is_collection {
            EdmType::collection(target)
        } else {
            target
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdmEntityType {
    pub name: String,
    pub base_type: Option<String>,
    pub key: Vec<String>,
    pub properties: Vec<EdmStructuralProperty>,
    pub navigation_properties: Vec<EdmNavigationProperty>,
    pub open: bool,
    /// Media-link entity (carries a default stream).
    pub has_stream: bool,
}

impl EdmEntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: &[&str]) -> Self {
        self.key = key.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn property(mut self, name: &str, type_: EdmType) -> Self {
        self.properties.push(EdmStructuralProperty::new(name, type_));
        self
    }

    pub fn navigation(mut self, nav: EdmNavigationProperty) -> Self {
        self.navigation_properties.push(nav);
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn media(mut self) -> Self {
        self.has_stream = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdmComplexType {
    pub name: String,
    pub base_type: Option<String>,
    pub properties: Vec<EdmStructuralProperty>,
    pub open: bool,
}

impl EdmComplexType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn property(mut self, name: &str, type_: EdmType) -> Self {
        self.properties.push(EdmStructuralProperty::new(name, type_));
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdmEntitySet {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmOperationKind {
    Action,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdmOperationParameter {
    pub name: String,
    pub type_: EdmType,
    pub nullable: bool,
}

/// A bound or unbound action/function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmOperation {
    pub name: String,
    pub kind: EdmOperationKind,
    pub is_bound: bool,
    pub parameters: Vec<EdmOperationParameter>,
    pub return_type: Option<EdmType>,
}

impl EdmOperation {
    pub fn action(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EdmOperationKind::Action,
            is_bound: false,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self {
            kind: EdmOperationKind::Function,
            ..Self::action(name)
        }
    }

    pub fn bound(mut self) -> Self {
        self.is_bound = true;
        self
    }

    pub fn parameter(mut self, name: &str, type_: EdmType) -> Self {
        self.parameters.push(EdmOperationParameter {
            name: name.to_string(),
            type_,
            nullable: true,
        });
        self
    }

    pub fn returns(mut self, type_: EdmType) -> Self {
        self.return_type = Some(type_);
        self
    }

    pub fn find_parameter(&self, name: &str) -> Option<&EdmOperationParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// An entity-container level import of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmOperationImport {
    pub name: String,
    /// Qualified name of the imported operation.
    pub operation: String,
    pub entity_set: Option<String>,
}

/// Resolved structured type (entity or complex).
#[derive(Debug, Clone, Copy)]
pub enum EdmStructuredType<'a> {
    Entity(&'a EdmEntityType),
    Complex(&'a EdmComplexType),
}

impl<'a> EdmStructuredType<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::Entity(t) => &t.name,
            Self::Complex(t) => &t.name,
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Self::Entity(t) => t.open,
            Self::Complex(t) => t.open,
        }
    }

    fn base_type(&self) -> Option<&'a str> {
        match self {
            Self::Entity(t) => t.base_type.as_deref(),
            Self::Complex(t) => t.base_type.as_deref(),
        }
    }

    fn declared_properties(&self) -> &'a [EdmStructuralProperty] {
        match self {
            Self::Entity(t) => &t.properties,
            Self::Complex(t) => &t.properties,
        }
    }
}

/// An immutable-after-build schema.
///
/// Type tables are keyed by qualified name in declaration order.
#[derive(Debug, Clone, Default)]
pub struct EdmModel {
    entity_types: IndexMap<String, EdmEntityType>,
    complex_types: IndexMap<String, EdmComplexType>,
    entity_sets: IndexMap<String, EdmEntitySet>,
    operations: IndexMap<String, EdmOperation>,
    operation_imports: IndexMap<String, EdmOperationImport>,
}

impl EdmModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique(&self, name: &str) -> Result<(), EdmError> {
        if self.entity_types.contains_key(name)
            || self.complex_types.contains_key(name)
            || self.operations.contains_key(name)
        {
            return Err(EdmError::DuplicateElement(name.to_string()));
        }
        Ok(())
    }

    pub fn add_entity_type(&mut self, entity_type: EdmEntityType) -> Result<&mut Self, EdmError> {
        self.ensure_unique(&entity_type.name)?;
        self.entity_types
            .insert(entity_type.name.clone(), entity_type);
        Ok(self)
    }

    pub fn add_complex_type(
        &mut self,
        complex_type: EdmComplexType,
    ) -> Result<&mut Self, EdmError> {
        self.ensure_unique(&complex_type.name)?;
        self.complex_types
            .insert(complex_type.name.clone(), complex_type);
        Ok(self)
    }

    pub fn add_entity_set(
        &mut self,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Result<&mut Self, EdmError> {
        let name = name.into();
        let entity_type = entity_type.into();
        if self.entity_sets.contains_key(&name) {
            return Err(EdmError::DuplicateElement(name));
        }
        if !self.entity_types.contains_key(&entity_type) {
            return Err(EdmError::UnknownType(entity_type));
        }
        self.entity_sets.insert(
            name.clone(),
            EdmEntitySet {
                name,
                entity_type,
            },
        );
        Ok(self)
    }

    pub fn add_operation(&mut self, operation: EdmOperation) -> Result<&mut Self, EdmError> {
        self.ensure_unique(&operation.name)?;
        self.operations.insert(operation.name.clone(), operation);
        Ok(self)
    }

    /// Imports an already declared operation into the container.
    pub fn add_operation_import(
        &mut self,
        name: impl Into<String>,
        operation: impl Into<String>,
    ) -> Result<&mut Self, EdmError> {
        let name = name.into();
        let operation = operation.into();
        if self.operation_imports.contains_key(&name) {
            return Err(EdmError::DuplicateElement(name));
        }
        if !self.operations.contains_key(&operation) {
            return Err(EdmError::UnknownOperation(operation));
        }
        self.operation_imports.insert(
            name.clone(),
            EdmOperationImport {
                name,
                operation,
                entity_set: None,
            },
        );
        Ok(self)
    }

    pub fn find_entity_type(&self, name: &str) -> Option<&EdmEntityType> {
        self.entity_types.get(strip_hash(name))
    }

    pub fn find_complex_type(&self, name: &str) -> Option<&EdmComplexType> {
        self.complex_types.get(strip_hash(name))
    }

    pub fn find_structured_type(&self, name: &str) -> Option<EdmStructuredType<'_>> {
        let name = strip_hash(name);
        if let Some(t) = self.entity_types.get(name) {
            return Some(EdmStructuredType::Entity(t));
        }
        self.complex_types.get(name).map(EdmStructuredType::Complex)
    }

    /// Resolves a (possibly `#`-prefixed) type name against this model.
    ///
    /// Unlike [`EdmType::parse`], a qualified name that is neither a primitive
    /// nor a declared structured type resolves to `None`.
    pub fn find_type(&self, name: &str) -> Option<EdmType> {
        let name = strip_hash(name);
        if let Ok(Some(inner)) = split_collection(name) {
            return self.find_type(inner).map(EdmType::collection);
        }
        if let Some(kind) = EdmPrimitiveKind::from_full_name(name) {
            return Some(EdmType::Primitive(kind));
        }
        if self.entity_types.contains_key(name) {
            return Some(EdmType::Entity(name.to_string()));
        }
        if self.complex_types.contains_key(name) {
            return Some(EdmType::Complex(name.to_string()));
        }
        None
    }

    pub fn find_entity_set(&self, name: &str) -> Option<&EdmEntitySet> {
        self.entity_sets.get(name)
    }

    pub fn find_operation(&self, name: &str) -> Option<&EdmOperation> {
        self.operations.get(strip_hash(name))
    }

    pub fn find_operation_import(&self, name: &str) -> Option<&EdmOperationImport> {
        self.operation_imports.get(name)
    }

    /// Operation behind an import, following the import to its declaration.
    pub fn imported_operation(&self, import_name: &str) -> Option<&EdmOperation> {
        self.find_operation_import(import_name)
            .and_then(|import| self.operations.get(&import.operation))
    }

    pub fn entity_sets(&self) -> impl Iterator<Item = &EdmEntitySet> {
        self.entity_sets.values()
    }

    pub fn operation_imports(&self) -> impl Iterator<Item = &EdmOperationImport> {
        self.operation_imports.values()
    }

    /// Finds a structural property on `type_name` or any of its base types.
    pub fn structural_property(
        &self,
        type_name: &str,
        property: &str,
    ) -> Option<&EdmStructuralProperty> {
        let mut current = self.find_structured_type(type_name);
        let mut depth = 0;
        while let Some(t) = current {
            if let Some(p) = t.declared_properties().iter().find(|p| p.name == property) {
                return Some(p);
            }
            depth += 1;
            if depth > self.entity_types.len() + self.complex_types.len() {
                return None;
            }
            current = t.base_type().and_then(|b| self.find_structured_type(b));
        }
        None
    }

    /// Finds a navigation property on an entity type or any of its base types.
    pub fn navigation_property(
        &self,
        type_name: &str,
        property: &str,
    ) -> Option<&EdmNavigationProperty> {
        let mut current = self.find_entity_type(type_name);
        let mut depth = 0;
        while let Some(t) = current {
            if let Some(p) = t
                .navigation_properties
                .iter()
                .find(|p| p.name == property)
            {
                return Some(p);
            }
            depth += 1;
            if depth > self.entity_types.len() {
                return None;
            }
            current = t
                .base_type
                .as_deref()
                .and_then(|b| self.find_entity_type(b));
        }
        None
    }

    /// `true` when `derived` equals `base` or inherits from it.
    pub fn is_assignable(&self, derived: &str, base: &str) -> bool {
        let base = strip_hash(base);
        let mut current = Some(strip_hash(derived));
        let mut depth = 0;
        while let Some(name) = current {
            if name == base {
                return true;
            }
            depth += 1;
            if depth > self.entity_types.len() + self.complex_types.len() {
                return false;
            }
            current = self.find_structured_type(name).and_then(|t| t.base_type());
        }
        false
    }

    /// Open types accept undeclared properties. Unknown types count as open.
    pub fn is_open(&self, type_name: &str) -> bool {
        let mut current = self.find_structured_type(type_name);
        if current.is_none() {
            return true;
        }
        let mut depth = 0;
        while let Some(t) = current {
            if t.is_open() {
                return true;
            }
            depth += 1;
            if depth > self.entity_types.len() + self.complex_types.len() {
                return false;
            }
            current = t.base_type().and_then(|b| self.find_structured_type(b));
        }
        false
    }

    pub fn has_stream(&self, entity_type: &str) -> bool {
        let mut current = self.find_entity_type(entity_type);
        let mut depth = 0;
        while let Some(t) = current {
            if t.has_stream {
                return true;
            }
            depth += 1;
            if depth > self.entity_types.len() {
                return false;
            }
            current = t.base_type.as_deref().and_then(|b| self.find_entity_type(b));
        }
        false
    }
}

fn strip_hash(name: &str) -> &str {
    name.strip_prefix('#').unwrap_or(name)
}
