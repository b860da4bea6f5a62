//! Read-only traversal.
//!
//! Every `visit_*` method defaults to the matching `walk_*` function, which
//! recurses into the node's children. Override a method to inspect a node;
//! call the `walk_*` function from the override to keep descending.
//!
//! Children are visited in a fixed order. For an entity: properties, then
//! actions, then functions. A navigation property visits its link content
//! before its association link.

use crate::element::{
    BatchPart, BatchRequestPayload, BatchResponsePayload, ChangesetItem, ComplexInstance, ComplexMultiValue, DeferredLink,
    EntityInstance, EntitySetInstance, ErrorPayload, ExpandedLink, InnerErrorPayload,
    LinkCollection, NamedStreamInstance, NavigationPropertyInstance, NavigationValue,
    ParametersPayload, PayloadElement, PrimitiveMultiValue, PrimitiveValue, PropertyInstance,
    PropertyValue, ResourceCollectionInstance, ServiceOperationDescriptor, WorkspaceInstance,
};

pub trait Visitor {
    fn visit_element(&mut self, element: &PayloadElement) {
        walk_element(self, element);
    }

    fn visit_entity(&mut self, entity: &EntityInstance) {
        walk_entity(self, entity);
    }

    fn visit_entity_set(&mut self, set: &EntitySetInstance) {
        walk_entity_set(self, set);
    }

    fn visit_property(&mut self, property: &PropertyInstance) {
        walk_property(self, property);
    }

    fn visit_primitive(&mut self, _value: &PrimitiveValue) {}

    fn visit_complex(&mut self, complex: &ComplexInstance) {
        walk_complex(self, complex);
    }

    fn visit_primitive_multi_value(&mut self, collection: &PrimitiveMultiValue) {
        walk_primitive_multi_value(self, collection);
    }

    fn visit_complex_multi_value(&mut self, collection: &ComplexMultiValue) {
        walk_complex_multi_value(self, collection);
    }

    fn visit_navigation(&mut self, navigation: &NavigationPropertyInstance) {
        walk_navigation(self, navigation);
    }

    fn visit_named_stream(&mut self, _stream: &NamedStreamInstance) {}

    fn visit_deferred_link(&mut self, _link: &DeferredLink) {}

    fn visit_expanded_link(&mut self, link: &ExpandedLink) {
        walk_expanded_link(self, link);
    }

    fn visit_link_collection(&mut self, links: &LinkCollection) {
        walk_link_collection(self, links);
    }

    fn visit_service_operation(&mut self, _operation: &ServiceOperationDescriptor) {}

    fn visit_error(&mut self, error: &ErrorPayload) {
        walk_error(self, error);
    }

    fn visit_inner_error(&mut self, inner: &InnerErrorPayload) {
        walk_inner_error(self, inner);
    }

    fn visit_batch_request(&mut self, batch: &BatchRequestPayload) {
        walk_batch_request(self, batch);
    }

    fn visit_batch_response(&mut self, batch: &BatchResponsePayload) {
        walk_batch_response(self, batch);
    }

    fn visit_workspace(&mut self, workspace: &WorkspaceInstance) {
        walk_workspace(self, workspace);
    }

    fn visit_resource_collection(&mut self, _collection: &ResourceCollectionInstance) {}

    fn visit_parameters(&mut self, parameters: &ParametersPayload) {
        walk_parameters(self, parameters);
    }
}

pub fn walk_element<V: Visitor + ?Sized>(v: &mut V, element: &PayloadElement) {
    match element {
        PayloadElement::Entity(e) => v.visit_entity(e),
        PayloadElement::EntitySet(s) => v.visit_entity_set(s),
        PayloadElement::Property(p) => v.visit_property(p),
        PayloadElement::PrimitiveValue(p) => v.visit_primitive(p),
        PayloadElement::Complex(c) => v.visit_complex(c),
        PayloadElement::PrimitiveMultiValue(m) => v.visit_primitive_multi_value(m),
        PayloadElement::ComplexMultiValue(m) => v.visit_complex_multi_value(m),
        PayloadElement::DeferredLink(l) => v.visit_deferred_link(l),
        PayloadElement::LinkCollection(l) => v.visit_link_collection(l),
        PayloadElement::Error(e) => v.visit_error(e),
        PayloadElement::BatchRequest(b) => v.visit_batch_request(b),
        PayloadElement::BatchResponse(b) => v.visit_batch_response(b),
        PayloadElement::Workspace(w) => v.visit_workspace(w),
        PayloadElement::Parameters(p) => v.visit_parameters(p),
    }
}

pub fn walk_entity<V: Visitor + ?Sized>(v: &mut V, entity: &EntityInstance) {
    for property in &entity.properties {
        v.visit_property(property);
    }
    for action in entity.actions() {
        v.visit_service_operation(action);
    }
    for function in entity.functions() {
        v.visit_service_operation(function);
    }
}

pub fn walk_entity_set<V: Visitor + ?Sized>(v: &mut V, set: &EntitySetInstance) {
    for entity in &set.entities {
        v.visit_entity(entity);
    }
}

pub fn walk_property<V: Visitor + ?Sized>(v: &mut V, property: &PropertyInstance) {
    match &property.value {
        PropertyValue::Primitive(p) => v.visit_primitive(p),
        PropertyValue::Complex(c) => v.visit_complex(c),
        PropertyValue::PrimitiveCollection(m) => v.visit_primitive_multi_value(m),
        PropertyValue::ComplexCollection(m) => v.visit_complex_multi_value(m),
        PropertyValue::Navigation(n) => v.visit_navigation(n),
        PropertyValue::NamedStream(s) => v.visit_named_stream(s),
    }
}

pub fn walk_complex<V: Visitor + ?Sized>(v: &mut V, complex: &ComplexInstance) {
    for property in &complex.properties {
        v.visit_property(property);
    }
}

pub fn walk_primitive_multi_value<V: Visitor + ?Sized>(v: &mut V, collection: &PrimitiveMultiValue) {
    for item in &collection.items {
        v.visit_primitive(item);
    }
}

pub fn walk_complex_multi_value<V: Visitor + ?Sized>(v: &mut V, collection: &ComplexMultiValue) {
    for item in &collection.items {
        v.visit_complex(item);
    }
}

pub fn walk_navigation<V: Visitor + ?Sized>(v: &mut V, navigation: &NavigationPropertyInstance) {
    match &navigation.value {
        Some(NavigationValue::Deferred(link)) => v.visit_deferred_link(link),
        Some(NavigationValue::Expanded(link)) => v.visit_expanded_link(link),
        None => {}
    }
    if let Some(link) = &navigation.association_link {
        v.visit_deferred_link(link);
    }
}

pub fn walk_expanded_link<V: Visitor + ?Sized>(v: &mut V, link: &ExpandedLink) {
    for item in &link.items {
        v.visit_element(item);
    }
}

pub fn walk_link_collection<V: Visitor + ?Sized>(v: &mut V, links: &LinkCollection) {
    for link in &links.links {
        v.visit_deferred_link(link);
    }
}

pub fn walk_error<V: Visitor + ?Sized>(v: &mut V, error: &ErrorPayload) {
    if let Some(inner) = &error.inner_error {
        v.visit_inner_error(inner);
    }
}

pub fn walk_inner_error<V: Visitor + ?Sized>(v: &mut V, inner: &InnerErrorPayload) {
    if let Some(nested) = &inner.inner {
        v.visit_inner_error(nested);
    }
}

/// Operation bodies and failed-part errors, in part order.
fn walk_batch_parts<V: Visitor + ?Sized, Op>(
    v: &mut V,
    parts: &[BatchPart<Op>],
    payload: impl Fn(&Op) -> Option<&PayloadElement>,
) {
    let operation = |v: &mut V, op: &Op| {
        if let Some(element) = payload(op) {
            v.visit_element(element);
        }
    };
    for part in parts {
        match part {
            BatchPart::Operation(op) => operation(v, op),
            BatchPart::Changeset(items) => {
                for item in items {
                    match item {
                        ChangesetItem::Operation(op) => operation(v, op),
                        ChangesetItem::Failed(error) => v.visit_error(error),
                    }
                }
            }
            BatchPart::Failed(error) => v.visit_error(error),
        }
    }
}

pub fn walk_batch_request<V: Visitor + ?Sized>(v: &mut V, batch: &BatchRequestPayload) {
    walk_batch_parts(v, &batch.parts, |op| op.payload.as_deref());
}

pub fn walk_batch_response<V: Visitor + ?Sized>(v: &mut V, batch: &BatchResponsePayload) {
    walk_batch_parts(v, &batch.parts, |op| op.payload.as_deref());
}

pub fn walk_workspace<V: Visitor + ?Sized>(v: &mut V, workspace: &WorkspaceInstance) {
    for collection in &workspace.collections {
        v.visit_resource_collection(collection);
    }
}

pub fn walk_parameters<V: Visitor + ?Sized>(v: &mut V, parameters: &ParametersPayload) {
    for parameter in &parameters.parameters {
        v.visit_element(&parameter.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Annotation, AnnotationKind, Annotations};
    use crate::element::BatchResponseOperation;

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn visit_property(&mut self, property: &PropertyInstance) {
            self.0.push(format!("property {}", property.name));
            walk_property(self, property);
        }

        fn visit_entity(&mut self, entity: &EntityInstance) {
            self.0.push(format!("entity {}", entity.type_name.as_deref().unwrap_or("?")));
            walk_entity(self, entity);
        }

        fn visit_service_operation(&mut self, operation: &ServiceOperationDescriptor) {
            self.0.push(format!("operation {}", operation.metadata));
        }

        fn visit_deferred_link(&mut self, link: &DeferredLink) {
            self.0.push(format!("link {}", link.url));
        }
    }

    /// Collects the content type stamped on link, navigation and error nodes.
    #[derive(Default)]
    struct ContentTypes(Vec<String>);

    impl ContentTypes {
        fn record(&mut self, annotations: &Annotations) {
            if let Some(Annotation::ContentType(t)) = annotations.get(AnnotationKind::ContentType) {
                self.0.push(t.clone());
            }
        }
    }

    impl Visitor for ContentTypes {
        fn visit_navigation(&mut self, navigation: &NavigationPropertyInstance) {
            self.record(&navigation.annotations);
            walk_navigation(self, navigation);
        }

        fn visit_deferred_link(&mut self, link: &DeferredLink) {
            self.record(&link.annotations);
        }

        fn visit_expanded_link(&mut self, link: &ExpandedLink) {
            self.record(&link.annotations);
            walk_expanded_link(self, link);
        }

        fn visit_error(&mut self, error: &ErrorPayload) {
            self.record(&error.annotations);
        }

        fn visit_batch_response(&mut self, batch: &BatchResponsePayload) {
            self.record(&batch.annotations);
            walk_batch_response(self, batch);
        }
    }

    #[test]
    fn annotations_reach_visitors_on_every_node() {
        let tag = |t: &str| -> Annotations { [Annotation::ContentType(t.into())].into_iter().collect() };
        let mut expanded = ExpandedLink::new(None).item(DeferredLink {
            url: "Orders(1)".into(),
            annotations: tag("reference"),
        });
        expanded.annotations = tag("expanded");
        let mut navigation = NavigationPropertyInstance::expanded(expanded);
        navigation.annotations = tag("navigation");
        let body = EntityInstance::new(None).property(PropertyInstance::navigation("Orders", navigation));
        let batch = BatchResponsePayload {
            parts: vec![
                BatchPart::Operation(BatchResponseOperation {
                    status: 200,
                    headers: Vec::new(),
                    payload: Some(Box::new(body.into())),
                }),
                BatchPart::Failed(ErrorPayload {
                    annotations: tag("failed"),
                    ..Default::default()
                }),
            ],
            annotations: tag("batch"),
        };

        let mut seen = ContentTypes::default();
        seen.visit_element(&batch.into());
        assert_eq!(seen.0, ["batch", "navigation", "expanded", "reference", "failed"]);
    }

    #[test]
    fn entity_children_in_fixed_order() {
        let entity = EntityInstance::new(Some("NS.Customer"))
            .operation(ServiceOperationDescriptor {
                is_action: false,
                metadata: "#NS.Top".into(),
                ..Default::default()
            })
            .operation(ServiceOperationDescriptor {
                is_action: true,
                metadata: "#NS.Rate".into(),
                ..Default::default()
            })
            .property(PropertyInstance::primitive("Id", 1))
            .property(PropertyInstance::navigation(
                "Orders",
                NavigationPropertyInstance::expanded(
                    ExpandedLink::new(None).item(EntityInstance::new(Some("NS.Order"))),
                )
                .with_association_link("a/$ref"),
            ));
        let mut trace = Trace::default();
        trace.visit_element(&entity.into());
        assert_eq!(
            trace.0,
            [
                "entity NS.Customer",
                "property Id",
                "property Orders",
                "entity NS.Order",
                "link a/$ref",
                "operation #NS.Rate",
                "operation #NS.Top",
            ]
        );
    }
}
