use tracing::trace;

use crate::element::{ComplexInstance, EntityInstance, PayloadElement, PropertyInstance};
use crate::visit_mut::{walk_complex_mut, walk_entity_mut, VisitorMut};

/// Collapses repeated property names on entities and complex values.
///
/// The last occurrence wins and takes the position of the first one.
pub struct DeduplicateProperties;

impl DeduplicateProperties {
    pub fn normalize(mut root: PayloadElement) -> PayloadElement {
        DeduplicateProperties.visit_element_mut(&mut root);
        root
    }
}

fn dedupe(properties: &mut Vec<PropertyInstance>) {
    let mut kept: Vec<PropertyInstance> = Vec::with_capacity(properties.len());
    for property in properties.drain(..) {
        match kept.iter_mut().find(|p| p.name == property.name) {
            Some(slot) => {
                trace!(name = %property.name, "replacing duplicate property");
                *slot = property;
            }
            None => kept.push(property),
        }
    }
    *properties = kept;
}

impl VisitorMut for DeduplicateProperties {
    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        dedupe(&mut entity.properties);
        walk_entity_mut(self, entity);
    }

    fn visit_complex_mut(&mut self, complex: &mut ComplexInstance) {
        dedupe(&mut complex.properties);
        walk_complex_mut(self, complex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{PrimitiveValue, PropertyValue};

    #[test]
    fn last_value_first_position() {
        let entity = EntityInstance::new(None)
            .property(PropertyInstance::primitive("A", 1))
            .property(PropertyInstance::primitive("B", 2))
            .property(PropertyInstance::primitive("A", 3));
        let root = DeduplicateProperties::normalize(entity.into());
        let expected = EntityInstance::new(None)
            .property(PropertyInstance::primitive("A", 3))
            .property(PropertyInstance::primitive("B", 2));
        assert_eq!(root, expected.into());
    }

    #[test]
    fn nested_complex_values() {
        let address = ComplexInstance::new(Some("NS.Address"))
            .property(PropertyInstance::primitive("City", "a"))
            .property(PropertyInstance::null("City"));
        let entity = EntityInstance::new(None).property(PropertyInstance::complex("Address", address));
        let root = DeduplicateProperties::normalize(entity.into());
        let PropertyValue::Complex(address) = &root.as_entity().unwrap().properties[0].value else {
            panic!("expected a complex property");
        };
        assert_eq!(address.properties.len(), 1);
        assert_eq!(
            address.properties[0].value,
            PropertyValue::Primitive(PrimitiveValue::null())
        );
    }
}
