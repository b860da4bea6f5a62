use odata_edm::EdmType;

use crate::annotations::Annotations;
use crate::element::{
    ComplexInstance, ComplexMultiValue, EntityInstance, PayloadElement, PrimitiveMultiValue,
    PrimitiveValue,
};
use crate::visit_mut::{
    walk_complex_multi_value_mut, walk_complex_mut, walk_entity_mut,
    walk_primitive_multi_value_mut, VisitorMut,
};

/// Writes the schema type name into value nodes that carry an
/// [`Annotation::EntityModelType`](crate::Annotation::EntityModelType)
/// but no explicit type name.
///
/// Collections always receive the `Collection(<item>)` form, whether the
/// annotation holds the collection type or its item type.
pub struct FillTypeNames;

impl FillTypeNames {
    pub fn normalize(mut root: PayloadElement) -> PayloadElement {
        FillTypeNames.visit_element_mut(&mut root);
        root
    }
}

fn fill(type_name: &mut Option<String>, annotations: &Annotations) {
    if type_name.is_none() {
        *type_name = annotations.model_type().map(EdmType::full_name);
    }
}

fn fill_collection(type_name: &mut Option<String>, annotations: &Annotations) {
    if type_name.is_some() {
        return;
    }
    *type_name = annotations.model_type().map(|t| match t {
        EdmType::Collection(_) => t.full_name(),
        item => EdmType::collection(item.clone()).full_name(),
    });
}

impl VisitorMut for FillTypeNames {
    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        if !entity.is_null {
            fill(&mut entity.type_name, &entity.annotations);
        }
        walk_entity_mut(self, entity);
    }

    fn visit_complex_mut(&mut self, complex: &mut ComplexInstance) {
        fill(&mut complex.type_name, &complex.annotations);
        walk_complex_mut(self, complex);
    }

    fn visit_primitive_mut(&mut self, value: &mut PrimitiveValue) {
        fill(&mut value.type_name, &value.annotations);
    }

    fn visit_primitive_multi_value_mut(&mut self, collection: &mut PrimitiveMultiValue) {
        fill_collection(&mut collection.type_name, &collection.annotations);
        walk_primitive_multi_value_mut(self, collection);
    }

    fn visit_complex_multi_value_mut(&mut self, collection: &mut ComplexMultiValue) {
        fill_collection(&mut collection.type_name, &collection.annotations);
        walk_complex_multi_value_mut(self, collection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotation;
    use crate::element::{PropertyInstance, PropertyValue};
    use odata_edm::EdmPrimitiveKind;

    fn annotated(model_type: EdmType) -> Annotations {
        [Annotation::EntityModelType(model_type)].into_iter().collect()
    }

    #[test]
    fn fills_missing_names_only() {
        let mut city = PrimitiveValue::new("Oslo");
        city.annotations = annotated(EdmPrimitiveKind::String.into());
        let mut zip = PrimitiveValue::new("0150").with_type_name("Edm.Custom");
        zip.annotations = annotated(EdmPrimitiveKind::String.into());
        let mut address = ComplexInstance::new(None)
            .property(PropertyInstance::new("City", PropertyValue::Primitive(city)))
            .property(PropertyInstance::new("Zip", PropertyValue::Primitive(zip)));
        address.annotations = annotated(EdmType::Complex("NS.Address".into()));

        let PayloadElement::Complex(address) = FillTypeNames::normalize(address.into()) else {
            unreachable!()
        };
        assert_eq!(address.type_name.as_deref(), Some("NS.Address"));
        let type_of = |name: &str| match &address.find_property(name).unwrap().value {
            PropertyValue::Primitive(p) => p.type_name.clone(),
            _ => None,
        };
        assert_eq!(type_of("City").as_deref(), Some("Edm.String"));
        assert_eq!(type_of("Zip").as_deref(), Some("Edm.Custom"));
    }

    #[test]
    fn collections_get_canonical_names() {
        let mut by_item = PrimitiveMultiValue::new(None);
        by_item.annotations = annotated(EdmPrimitiveKind::Int32.into());
        let mut by_collection = ComplexMultiValue::new(None);
        by_collection.annotations =
            annotated(EdmType::collection(EdmType::Complex("NS.Address".into())));

        let PayloadElement::PrimitiveMultiValue(by_item) = FillTypeNames::normalize(by_item.into())
        else {
            unreachable!()
        };
        assert_eq!(by_item.type_name.as_deref(), Some("Collection(Edm.Int32)"));

        let PayloadElement::ComplexMultiValue(by_collection) =
            FillTypeNames::normalize(by_collection.into())
        else {
            unreachable!()
        };
        assert_eq!(
            by_collection.type_name.as_deref(),
            Some("Collection(NS.Address)")
        );
    }
}
