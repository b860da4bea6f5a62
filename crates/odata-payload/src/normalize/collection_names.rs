use crate::annotations::{Annotation, AnnotationKind, Annotations};
use crate::element::{ComplexMultiValue, PayloadElement, PrimitiveMultiValue};
use crate::visit_mut::{walk_complex_multi_value_mut, walk_primitive_multi_value_mut, VisitorMut};

/// Blanks collection-name annotations on primitive and complex collections,
/// for wire formats that do not carry collection names.
pub struct ClearCollectionNames;

impl ClearCollectionNames {
    pub fn normalize(mut root: PayloadElement) -> PayloadElement {
        ClearCollectionNames.visit_element_mut(&mut root);
        root
    }
}

fn clear(annotations: &mut Annotations) {
    if let Some(Annotation::CollectionName(name)) = annotations.get_mut(AnnotationKind::CollectionName) {
        name.clear();
    }
}

impl VisitorMut for ClearCollectionNames {
    fn visit_primitive_multi_value_mut(&mut self, collection: &mut PrimitiveMultiValue) {
        clear(&mut collection.annotations);
        walk_primitive_multi_value_mut(self, collection);
    }

    fn visit_complex_multi_value_mut(&mut self, collection: &mut ComplexMultiValue) {
        clear(&mut collection.annotations);
        walk_complex_multi_value_mut(self, collection);
    }
}
