//! odata-payload: an in-memory payload element tree for OData payloads.
//!
//! A [`PayloadElement`] is an owned, clonable tree built either by hand (the
//! builder methods on each node) or from a reader result via
//! [`convert::read_payload_element`]. Trees are walked with [`Visitor`] /
//! [`VisitorMut`], brought into a canonical shape by the unit-struct
//! normalizers in [`normalize`], and compared with [`compare::compare`].
//!
//! # Example
//!
//! ```
//! use odata_payload::normalize::DeduplicateProperties;
//! use odata_payload::{EntityInstance, PropertyInstance};
//!
//! let entity = EntityInstance::new(Some("NS.Customer"))
//!     .property(PropertyInstance::primitive("A", 1))
//!     .property(PropertyInstance::primitive("B", 2))
//!     .property(PropertyInstance::primitive("A", 3));
//! let root = DeduplicateProperties::normalize(entity.into());
//!
//! let names: Vec<_> = root.as_entity().unwrap().properties.iter().map(|p| p.name.as_str()).collect();
//! assert_eq!(names, ["A", "B"]);
//! ```

mod annotations;
pub mod compare;
pub mod convert;
mod element;
pub mod normalize;
pub mod visit;
pub mod visit_mut;

pub use annotations::{Annotation, AnnotationKind, Annotations};
pub use element::{
    BatchPart, BatchRequestOperation, BatchRequestPayload, BatchResponseOperation,
    BatchResponsePayload, ChangesetItem, ComplexInstance, ComplexMultiValue, DeferredLink,
    ElementType, EntityInstance, EntitySetInstance, ErrorDetail, ErrorPayload, ExpandedLink,
    InnerErrorPayload, LinkCollection, MediaLink, NamedStreamInstance, NavigationPropertyInstance,
    NavigationValue, Parameter, ParametersPayload, PayloadElement, PrimitiveMultiValue,
    PrimitiveValue, PropertyInstance, PropertyValue, ResourceCollectionInstance,
    ServiceOperationDescriptor, WorkspaceInstance,
};
pub use visit::Visitor;
pub use visit_mut::VisitorMut;
