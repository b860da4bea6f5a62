//! Tree normalizers.
//!
//! Each normalizer is a unit struct with a single `normalize(root) -> root`
//! entry point. Normalizers take the tree by value and rewrite it in place;
//! clone the tree first when the original is still needed.

mod collection_names;
mod dedupe;
mod order;
mod type_names;

pub use collection_names::ClearCollectionNames;
pub use dedupe::DeduplicateProperties;
pub use order::{AssociationLinksLast, BucketedPropertyOrder};
pub use type_names::FillTypeNames;
