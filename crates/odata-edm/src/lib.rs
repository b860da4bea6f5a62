//! odata-edm: the schema provider consumed by the OData payload reader.
//!
//! The model is deliberately small: it answers "what type is this name" and
//! "which properties does this type declare", which is all the reader needs to
//! disambiguate untyped wire content. CSDL parsing is not part of this crate;
//! models are assembled with the builder methods on [`EdmModel`].
//!
//! # Example
//!
//! ```
//! use odata_edm::{EdmEntityType, EdmModel, EdmPrimitiveKind, EdmType};
//!
//! let mut model = EdmModel::new();
//! model
//!     .add_entity_type(
//!         EdmEntityType::new("NS.Customer")
//!             .with_key(&["Id"])
//!             .property("Id", EdmPrimitiveKind::Int32.into()),
//!     )
//!     .unwrap()
//!     .add_entity_set("Customers", "NS.Customer")
//!     .unwrap();
//!
//! assert_eq!(
//!     model.find_type("NS.Customer"),
//!     Some(EdmType::Entity("NS.Customer".into()))
//! );
//! ```

mod error;
mod model;
mod types;

pub use error::EdmError;
pub use model::{
    EdmComplexType, EdmEntitySet, EdmEntityType, EdmModel, EdmNavigationProperty,
    EdmOperation, EdmOperationImport, EdmOperationKind, EdmOperationParameter,
    EdmStructuralProperty, EdmStructuredType,
};
pub use types::{EdmPrimitiveKind, EdmType};
