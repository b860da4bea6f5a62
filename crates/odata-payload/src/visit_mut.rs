//! In-place traversal. Same shape and child order as [`crate::visit`].

use crate::element::{
    BatchPart, BatchRequestPayload, BatchResponsePayload, ChangesetItem, ComplexInstance, ComplexMultiValue, DeferredLink,
    EntityInstance, EntitySetInstance, ErrorPayload, ExpandedLink, InnerErrorPayload,
    LinkCollection, NamedStreamInstance, NavigationPropertyInstance, NavigationValue,
    ParametersPayload, PayloadElement, PrimitiveMultiValue, PrimitiveValue, PropertyInstance,
    PropertyValue, ResourceCollectionInstance, ServiceOperationDescriptor, WorkspaceInstance,
};

pub trait VisitorMut {
    fn visit_element_mut(&mut self, element: &mut PayloadElement) {
        walk_element_mut(self, element);
    }

    fn visit_entity_mut(&mut self, entity: &mut EntityInstance) {
        walk_entity_mut(self, entity);
    }

    fn visit_entity_set_mut(&mut self, set: &mut EntitySetInstance) {
        walk_entity_set_mut(self, set);
    }

    fn visit_property_mut(&mut self, property: &mut PropertyInstance) {
        walk_property_mut(self, property);
    }

    fn visit_primitive_mut(&mut self, _value: &mut PrimitiveValue) {}

    fn visit_complex_mut(&mut self, complex: &mut ComplexInstance) {
        walk_complex_mut(self, complex);
    }

    fn visit_primitive_multi_value_mut(&mut self, collection: &mut PrimitiveMultiValue) {
        walk_primitive_multi_value_mut(self, collection);
    }

    fn visit_complex_multi_value_mut(&mut self, collection: &mut ComplexMultiValue) {
        walk_complex_multi_value_mut(self, collection);
    }

    fn visit_navigation_mut(&mut self, navigation: &mut NavigationPropertyInstance) {
        walk_navigation_mut(self, navigation);
    }

    fn visit_named_stream_mut(&mut self, _stream: &mut NamedStreamInstance) {}

    fn visit_deferred_link_mut(&mut self, _link: &mut DeferredLink) {}

    fn visit_expanded_link_mut(&mut self, link: &mut ExpandedLink) {
        walk_expanded_link_mut(self, link);
    }

    fn visit_link_collection_mut(&mut self, links: &mut LinkCollection) {
        walk_link_collection_mut(self, links);
    }

    fn visit_service_operation_mut(&mut self, _operation: &mut ServiceOperationDescriptor) {}

    fn visit_error_mut(&mut self, error: &mut ErrorPayload) {
        walk_error_mut(self, error);
    }

    fn visit_inner_error_mut(&mut self, inner: &mut InnerErrorPayload) {
        walk_inner_error_mut(self, inner);
    }

    fn visit_batch_request_mut(&mut self, batch: &mut BatchRequestPayload) {
        walk_batch_request_mut(self, batch);
    }

    fn visit_batch_response_mut(&mut self, batch: &mut BatchResponsePayload) {
        walk_batch_response_mut(self, batch);
    }

    fn visit_workspace_mut(&mut self, workspace: &mut WorkspaceInstance) {
        walk_workspace_mut(self, workspace);
    }

    fn visit_resource_collection_mut(&mut self, _collection: &mut ResourceCollectionInstance) {}

    fn visit_parameters_mut(&mut self, parameters: &mut ParametersPayload) {
        walk_parameters_mut(self, parameters);
    }
}

pub fn walk_element_mut<V: VisitorMut + ?Sized>(v: &mut V, element: &mut PayloadElement) {
    match element {
        PayloadElement::Entity(e) => v.visit_entity_mut(e),
        PayloadElement::EntitySet(s) => v.visit_entity_set_mut(s),
        PayloadElement::Property(p) => v.visit_property_mut(p),
        PayloadElement::PrimitiveValue(p) => v.visit_primitive_mut(p),
        PayloadElement::Complex(c) => v.visit_complex_mut(c),
        PayloadElement::PrimitiveMultiValue(m) => v.visit_primitive_multi_value_mut(m),
        PayloadElement::ComplexMultiValue(m) => v.visit_complex_multi_value_mut(m),
        PayloadElement::DeferredLink(l) => v.visit_deferred_link_mut(l),
        PayloadElement::LinkCollection(l) => v.visit_link_collection_mut(l),
        PayloadElement::Error(e) => v.visit_error_mut(e),
        PayloadElement::BatchRequest(b) => v.visit_batch_request_mut(b),
        PayloadElement::BatchResponse(b) => v.visit_batch_response_mut(b),
        PayloadElement::Workspace(w) => v.visit_workspace_mut(w),
        PayloadElement::Parameters(p) => v.visit_parameters_mut(p),
    }
}

pub fn walk_entity_mut<V: VisitorMut + ?Sized>(v: &mut V, entity: &mut EntityInstance) {
    for property in &mut entity.properties {
        v.visit_property_mut(property);
    }
    for action in entity.operations.iter_mut().filter(|o| o.is_action) {
        v.visit_service_operation_mut(action);
    }
    for function in entity.operations.iter_mut().filter(|o| !o.is_action) {
        v.visit_service_operation_mut(function);
    }
}

pub fn walk_entity_set_mut<V: VisitorMut + ?Sized>(v: &mut V, set: &mut EntitySetInstance) {
    for entity in &mut set.entities {
        v.visit_entity_mut(entity);
    }
}

pub fn walk_property_mut<V: VisitorMut + ?Sized>(v: &mut V, property: &mut PropertyInstance) {
    match &mut property.value {
        PropertyValue::Primitive(p) => v.visit_primitive_mut(p),
        PropertyValue::Complex(c) => v.visit_complex_mut(c),
        PropertyValue::PrimitiveCollection(m) => v.visit_primitive_multi_value_mut(m),
        PropertyValue::ComplexCollection(m) => v.visit_complex_multi_value_mut(m),
        PropertyValue::Navigation(n) => v.visit_navigation_mut(n),
        PropertyValue::NamedStream(s) => v.visit_named_stream_mut(s),
    }
}

pub fn walk_complex_mut<V: VisitorMut + ?Sized>(v: &mut V, complex: &mut ComplexInstance) {
    for property in &mut complex.properties {
        v.visit_property_mut(property);
    }
}

pub fn walk_primitive_multi_value_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    collection: &mut PrimitiveMultiValue,
) {
    for item in &mut collection.items {
        v.visit_primitive_mut(item);
    }
}

pub fn walk_complex_multi_value_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    collection: &mut ComplexMultiValue,
) {
    for item in &mut collection.items {
        v.visit_complex_mut(item);
    }
}

pub fn walk_navigation_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    navigation: &mut NavigationPropertyInstance,
) {
    match &mut navigation.value {
        Some(NavigationValue::Deferred(link)) => v.visit_deferred_link_mut(link),
        Some(NavigationValue::Expanded(link)) => v.visit_expanded_link_mut(link),
        None => {}
    }
    if let Some(link) = &mut navigation.association_link {
        v.visit_deferred_link_mut(link);
    }
}

pub fn walk_expanded_link_mut<V: VisitorMut + ?Sized>(v: &mut V, link: &mut ExpandedLink) {
    for item in &mut link.items {
        v.visit_element_mut(item);
    }
}

pub fn walk_link_collection_mut<V: VisitorMut + ?Sized>(v: &mut V, links: &mut LinkCollection) {
    for link in &mut links.links {
        v.visit_deferred_link_mut(link);
    }
}

pub fn walk_error_mut<V: VisitorMut + ?Sized>(v: &mut V, error: &mut ErrorPayload) {
    if let Some(inner) = &mut error.inner_error {
        v.visit_inner_error_mut(inner);
    }
}

pub fn walk_inner_error_mut<V: VisitorMut + ?Sized>(v: &mut V, inner: &mut InnerErrorPayload) {
    if let Some(nested) = &mut inner.inner {
        v.visit_inner_error_mut(nested);
    }
}

fn walk_batch_parts_mut<V: VisitorMut + ?Sized, Op>(
    v: &mut V,
    parts: &mut [BatchPart<Op>],
    payload: impl Fn(&mut Op) -> Option<&mut PayloadElement>,
) {
    let operation = |v: &mut V, op: &mut Op| {
        if let Some(element) = payload(op) {
            v.visit_element_mut(element);
        }
    };
    for part in parts {
        match part {
            BatchPart::Operation(op) => operation(v, op),
            BatchPart::Changeset(items) => {
                for item in items {
                    match item {
                        ChangesetItem::Operation(op) => operation(v, op),
                        ChangesetItem::Failed(error) => v.visit_error_mut(error),
                    }
                }
            }
            BatchPart::Failed(error) => v.visit_error_mut(error),
        }
    }
}

pub fn walk_batch_request_mut<V: VisitorMut + ?Sized>(v: &mut V, batch: &mut BatchRequestPayload) {
    walk_batch_parts_mut(v, &mut batch.parts, |op| op.payload.as_deref_mut());
}

pub fn walk_batch_response_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    batch: &mut BatchResponsePayload,
) {
    walk_batch_parts_mut(v, &mut batch.parts, |op| op.payload.as_deref_mut());
}

pub fn walk_workspace_mut<V: VisitorMut + ?Sized>(v: &mut V, workspace: &mut WorkspaceInstance) {
    for collection in &mut workspace.collections {
        v.visit_resource_collection_mut(collection);
    }
}

pub fn walk_parameters_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    parameters: &mut ParametersPayload,
) {
    for parameter in &mut parameters.parameters {
        v.visit_element_mut(&mut parameter.value);
    }
}
