use crate::element::{EntityInstance, PayloadElement, PropertyInstance, PropertyValue};
use crate::visit_mut::{walk_entity_mut, VisitorMut};

/// Reorders entity properties into the bucketed wire order:
/// navigation properties, named streams, simple properties, then
/// association-link-only entries.
///
/// Relative order inside each bucket is kept, so the result is idempotent.
pub struct BucketedPropertyOrder;

impl BucketedPropertyOrder {
    pub fn normalize(mut root: PayloadElement) -> PayloadElement {
        BucketedPropertyOrder.visit_element_mut(&mut root);
        root
    }
}

fn bucket(property: &PropertyInstance) -> u8 {
    match &property.value {
        PropertyValue::Navigation(nav) if nav.is_association_only() => 3,
        PropertyValue::Navigation(_) => 0,
        PropertyValue::NamedStream(_) => 1,
        _ => 2,
    }
}

impl VisitorMut for BucketedPropertyOrder {
    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        walk_entity_mut(self, entity);
        entity.properties.sort_by_key(bucket);
    }
}

/// Moves association-link-only entries behind every other property.
pub struct AssociationLinksLast;

impl AssociationLinksLast {
    pub fn normalize(mut root: PayloadElement) -> PayloadElement {
        AssociationLinksLast.visit_element_mut(&mut root);
        root
    }
}

impl VisitorMut for AssociationLinksLast {
    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        walk_entity_mut(self, entity);
        entity
            .properties
            .sort_by_key(PropertyInstance::is_association_only);
    }
}
