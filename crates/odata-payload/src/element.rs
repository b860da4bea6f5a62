//! The payload element tree.
//!
//! Every node exclusively owns its children, so `clone()` is a deep copy.
//! Normalizers rewrite a tree in place; clone first when the original is
//! still needed.

use std::fmt;

use odata_reader::{ODataPrimitiveValue, ServiceDocumentElementKind};

use crate::annotations::{Annotation, Annotations};

/// Tag of a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    EntityInstance,
    EntitySetInstance,
    PrimitiveValue,
    PrimitiveProperty,
    ComplexInstance,
    ComplexProperty,
    PrimitiveMultiValue,
    PrimitiveMultiValueProperty,
    ComplexMultiValue,
    ComplexMultiValueProperty,
    NavigationProperty,
    NamedStream,
    DeferredLink,
    ExpandedLink,
    LinkCollection,
    ServiceOperationDescriptor,
    Error,
    InnerError,
    BatchRequest,
    BatchResponse,
    Workspace,
    ResourceCollection,
    Parameters,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Values ────────────────────────────────────────────────────────────────

/// A primitive value; `value == None` is a null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveValue {
    pub type_name: Option<String>,
    pub value: Option<ODataPrimitiveValue>,
    pub annotations: Annotations,
}

impl PrimitiveValue {
    pub fn new(value: impl Into<ODataPrimitiveValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexInstance {
    pub type_name: Option<String>,
    pub is_null: bool,
    pub properties: Vec<PropertyInstance>,
    pub annotations: Annotations,
}

impl ComplexInstance {
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn null(type_name: Option<&str>) -> Self {
        Self {
            is_null: true,
            ..Self::new(type_name)
        }
    }

    pub fn property(mut self, property: PropertyInstance) -> Self {
        self.properties.push(property);
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyInstance> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveMultiValue {
    /// `Collection(<item type>)` when known.
    pub type_name: Option<String>,
    pub items: Vec<PrimitiveValue>,
    pub annotations: Annotations,
}

impl PrimitiveMultiValue {
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn item(mut self, item: PrimitiveValue) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexMultiValue {
    pub type_name: Option<String>,
    pub items: Vec<ComplexInstance>,
    pub annotations: Annotations,
}

impl ComplexMultiValue {
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn item(mut self, item: ComplexInstance) -> Self {
        self.items.push(item);
        self
    }
}

// ── Links and streams ─────────────────────────────────────────────────────

/// A bare link: a deferred navigation link, an association link or an
/// entity reference link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeferredLink {
    pub url: String,
    pub annotations: Annotations,
}

impl DeferredLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            annotations: Annotations::new(),
        }
    }
}

/// Navigation link content, in payload order.
///
/// Responses carry at most one item; requests may carry several reference
/// links and resource sets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpandedLink {
    pub url: Option<String>,
    pub items: Vec<PayloadElement>,
    pub annotations: Annotations,
}

impl ExpandedLink {
    pub fn new(url: Option<&str>) -> Self {
        Self {
            url: url.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn item(mut self, item: impl Into<PayloadElement>) -> Self {
        self.items.push(item.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationValue {
    Deferred(DeferredLink),
    Expanded(ExpandedLink),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigationPropertyInstance {
    /// `None` for an association-link-only entry.
    pub value: Option<NavigationValue>,
    pub association_link: Option<DeferredLink>,
    pub is_collection: Option<bool>,
    pub annotations: Annotations,
}

impl NavigationPropertyInstance {
    pub fn deferred(url: impl Into<String>) -> Self {
        Self {
            value: Some(NavigationValue::Deferred(DeferredLink::new(url))),
            ..Default::default()
        }
    }

    pub fn expanded(link: ExpandedLink) -> Self {
        Self {
            value: Some(NavigationValue::Expanded(link)),
            ..Default::default()
        }
    }

    pub fn association_only(url: impl Into<String>) -> Self {
        Self {
            association_link: Some(DeferredLink::new(url)),
            ..Default::default()
        }
    }

    pub fn with_association_link(mut self, url: impl Into<String>) -> Self {
        self.association_link = Some(DeferredLink::new(url));
        self
    }

    pub fn is_association_only(&self) -> bool {
        self.value.is_none() && self.association_link.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedStreamInstance {
    pub source_link: Option<String>,
    pub edit_link: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

// ── Properties ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Primitive(PrimitiveValue),
    Complex(ComplexInstance),
    PrimitiveCollection(PrimitiveMultiValue),
    ComplexCollection(ComplexMultiValue),
    Navigation(NavigationPropertyInstance),
    NamedStream(NamedStreamInstance),
}

/// A named child of an entity, a complex value or a parameters payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInstance {
    pub name: String,
    pub value: PropertyValue,
    pub annotations: Annotations,
}

impl PropertyInstance {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
            annotations: Annotations::new(),
        }
    }

    pub fn primitive(name: impl Into<String>, value: impl Into<ODataPrimitiveValue>) -> Self {
        Self::new(name, PropertyValue::Primitive(PrimitiveValue::new(value)))
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Primitive(PrimitiveValue::null()))
    }

    pub fn complex(name: impl Into<String>, value: ComplexInstance) -> Self {
        Self::new(name, PropertyValue::Complex(value))
    }

    pub fn navigation(name: impl Into<String>, value: NavigationPropertyInstance) -> Self {
        Self::new(name, PropertyValue::Navigation(value))
    }

    pub fn named_stream(name: impl Into<String>, value: NamedStreamInstance) -> Self {
        Self::new(name, PropertyValue::NamedStream(value))
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.set(annotation);
        self
    }

    pub fn element_type(&self) -> ElementType {
        match &self.value {
            PropertyValue::Primitive(_) => ElementType::PrimitiveProperty,
            PropertyValue::Complex(_) => ElementType::ComplexProperty,
            PropertyValue::PrimitiveCollection(_) => ElementType::PrimitiveMultiValueProperty,
            PropertyValue::ComplexCollection(_) => ElementType::ComplexMultiValueProperty,
            PropertyValue::Navigation(_) => ElementType::NavigationProperty,
            PropertyValue::NamedStream(_) => ElementType::NamedStream,
        }
    }

    pub fn is_association_only(&self) -> bool {
        matches!(&self.value, PropertyValue::Navigation(n) if n.is_association_only())
    }
}

// ── Entities ──────────────────────────────────────────────────────────────

/// An advertised action or function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceOperationDescriptor {
    pub is_action: bool,
    pub metadata: String,
    pub title: Option<String>,
    pub target: Option<String>,
}

/// Default-stream metadata of a media link entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaLink {
    pub source_link: Option<String>,
    pub edit_link: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityInstance {
    pub type_name: Option<String>,
    /// An expanded `null` in a single-valued navigation link.
    pub is_null: bool,
    pub id: Option<String>,
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    pub etag: Option<String>,
    /// `Some` for a media link entry.
    pub media: Option<MediaLink>,
    pub properties: Vec<PropertyInstance>,
    pub operations: Vec<ServiceOperationDescriptor>,
    pub annotations: Annotations,
}

impl EntityInstance {
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn null() -> Self {
        Self {
            is_null: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn property(mut self, property: PropertyInstance) -> Self {
        self.properties.push(property);
        self
    }

    pub fn operation(mut self, operation: ServiceOperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyInstance> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ServiceOperationDescriptor> {
        self.operations.iter().filter(|o| o.is_action)
    }

    pub fn functions(&self) -> impl Iterator<Item = &ServiceOperationDescriptor> {
        self.operations.iter().filter(|o| !o.is_action)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySetInstance {
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
    pub entities: Vec<EntityInstance>,
    pub annotations: Annotations,
}

impl EntitySetInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: EntityInstance) -> Self {
        self.entities.push(entity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkCollection {
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub links: Vec<DeferredLink>,
    pub annotations: Annotations,
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InnerErrorPayload {
    pub message: Option<String>,
    pub type_name: Option<String>,
    pub stack_trace: Option<String>,
    pub inner: Option<Box<InnerErrorPayload>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPayload {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
    pub details: Vec<ErrorDetail>,
    pub inner_error: Option<InnerErrorPayload>,
    pub annotations: Annotations,
}

// ── Batch ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequestOperation {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub payload: Option<Box<PayloadElement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponseOperation {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Option<Box<PayloadElement>>,
}

/// An entry of a changeset. A part the reader could not parse is kept in
/// place as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangesetItem<Op> {
    Operation(Op),
    Failed(ErrorPayload),
}

impl<Op> ChangesetItem<Op> {
    pub fn operation(&self) -> Option<&Op> {
        match self {
            Self::Operation(op) => Some(op),
            Self::Failed(_) => None,
        }
    }

    pub fn operation_mut(&mut self) -> Option<&mut Op> {
        match self {
            Self::Operation(op) => Some(op),
            Self::Failed(_) => None,
        }
    }
}

/// A top-level batch part: one operation, a changeset, or the error left
/// by a malformed part.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPart<Op> {
    Operation(Op),
    Changeset(Vec<ChangesetItem<Op>>),
    Failed(ErrorPayload),
}

impl<Op> BatchPart<Op> {
    /// Operations in part order; failed entries are skipped.
    pub fn operations(&self) -> impl Iterator<Item = &Op> {
        let (single, items) = match self {
            Self::Operation(op) => (Some(op), Default::default()),
            Self::Changeset(items) => (None, items.as_slice()),
            Self::Failed(_) => (None, Default::default()),
        };
        single
            .into_iter()
            .chain(items.iter().filter_map(ChangesetItem::operation))
    }

    pub fn operations_mut(&mut self) -> impl Iterator<Item = &mut Op> {
        let (single, items) = match self {
            Self::Operation(op) => (Some(op), Default::default()),
            Self::Changeset(items) => (None, items.as_mut_slice()),
            Self::Failed(_) => (None, Default::default()),
        };
        single
            .into_iter()
            .chain(items.iter_mut().filter_map(ChangesetItem::operation_mut))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchRequestPayload {
    pub parts: Vec<BatchPart<BatchRequestOperation>>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponsePayload {
    pub parts: Vec<BatchPart<BatchResponseOperation>>,
    pub annotations: Annotations,
}

// ── Service document ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCollectionInstance {
    pub kind: ServiceDocumentElementKind,
    pub name: String,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceInstance {
    pub context_url: Option<String>,
    pub collections: Vec<ResourceCollectionInstance>,
    pub annotations: Annotations,
}

// ── Parameters ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: PayloadElement,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParametersPayload {
    pub parameters: Vec<Parameter>,
    pub annotations: Annotations,
}

impl ParametersPayload {
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<PayloadElement>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

// ── Root ──────────────────────────────────────────────────────────────────

/// Any payload, or any node that can stand on its own inside one (expanded
/// link items, parameter values, batch operation bodies).
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadElement {
    Entity(EntityInstance),
    EntitySet(EntitySetInstance),
    /// A top-level property payload.
    Property(PropertyInstance),
    PrimitiveValue(PrimitiveValue),
    Complex(ComplexInstance),
    PrimitiveMultiValue(PrimitiveMultiValue),
    ComplexMultiValue(ComplexMultiValue),
    DeferredLink(DeferredLink),
    LinkCollection(LinkCollection),
    Error(ErrorPayload),
    BatchRequest(BatchRequestPayload),
    BatchResponse(BatchResponsePayload),
    Workspace(WorkspaceInstance),
    Parameters(ParametersPayload),
}

impl PayloadElement {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Entity(_) => ElementType::EntityInstance,
            Self::EntitySet(_) => ElementType::EntitySetInstance,
            Self::Property(p) => p.element_type(),
            Self::PrimitiveValue(_) => ElementType::PrimitiveValue,
            Self::Complex(_) => ElementType::ComplexInstance,
            Self::PrimitiveMultiValue(_) => ElementType::PrimitiveMultiValue,
            Self::ComplexMultiValue(_) => ElementType::ComplexMultiValue,
            Self::DeferredLink(_) => ElementType::DeferredLink,
            Self::LinkCollection(_) => ElementType::LinkCollection,
            Self::Error(_) => ElementType::Error,
            Self::BatchRequest(_) => ElementType::BatchRequest,
            Self::BatchResponse(_) => ElementType::BatchResponse,
            Self::Workspace(_) => ElementType::Workspace,
            Self::Parameters(_) => ElementType::Parameters,
        }
    }

    pub fn annotations(&self) -> &Annotations {
        match self {
            Self::Entity(e) => &e.annotations,
            Self::EntitySet(s) => &s.annotations,
            Self::Property(p) => &p.annotations,
            Self::PrimitiveValue(v) => &v.annotations,
            Self::Complex(c) => &c.annotations,
            Self::PrimitiveMultiValue(m) => &m.annotations,
            Self::ComplexMultiValue(m) => &m.annotations,
            Self::DeferredLink(l) => &l.annotations,
            Self::LinkCollection(l) => &l.annotations,
            Self::Error(e) => &e.annotations,
            Self::BatchRequest(b) => &b.annotations,
            Self::BatchResponse(b) => &b.annotations,
            Self::Workspace(w) => &w.annotations,
            Self::Parameters(p) => &p.annotations,
        }
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        match self {
            Self::Entity(e) => &mut e.annotations,
            Self::EntitySet(s) => &mut s.annotations,
            Self::Property(p) => &mut p.annotations,
            Self::PrimitiveValue(v) => &mut v.annotations,
            Self::Complex(c) => &mut c.annotations,
            Self::PrimitiveMultiValue(m) => &mut m.annotations,
            Self::ComplexMultiValue(m) => &mut m.annotations,
            Self::DeferredLink(l) => &mut l.annotations,
            Self::LinkCollection(l) => &mut l.annotations,
            Self::Error(e) => &mut e.annotations,
            Self::BatchRequest(b) => &mut b.annotations,
            Self::BatchResponse(b) => &mut b.annotations,
            Self::Workspace(w) => &mut w.annotations,
            Self::Parameters(p) => &mut p.annotations,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityInstance> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_entity_set(&self) -> Option<&EntitySetInstance> {
        match self {
            Self::EntitySet(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! element_from {
    ($($variant:ident($t:ty)),* $(,)?) => {
        $(
            impl From<$t> for PayloadElement {
                fn from(v: $t) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

element_from!(
    Entity(EntityInstance),
    EntitySet(EntitySetInstance),
    Property(PropertyInstance),
    PrimitiveValue(PrimitiveValue),
    Complex(ComplexInstance),
    PrimitiveMultiValue(PrimitiveMultiValue),
    ComplexMultiValue(ComplexMultiValue),
    DeferredLink(DeferredLink),
    LinkCollection(LinkCollection),
    Error(ErrorPayload),
    BatchRequest(BatchRequestPayload),
    BatchResponse(BatchResponsePayload),
    Workspace(WorkspaceInstance),
    Parameters(ParametersPayload),
);
