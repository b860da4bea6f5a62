//! Structural comparison of payload trees.
//!
//! Annotations are never compared. Type names are compared only when both
//! sides carry one, so a tree read without a schema still matches an
//! expected tree that names its types.

use thiserror::Error;

use crate::element::{
    BatchPart, BatchRequestOperation, BatchResponseOperation, ChangesetItem, ComplexInstance,
    ComplexMultiValue, EntityInstance, EntitySetInstance, ErrorPayload, ExpandedLink,
    LinkCollection, NavigationPropertyInstance, NavigationValue, ParametersPayload, PayloadElement,
    PrimitiveMultiValue, PrimitiveValue, PropertyInstance, PropertyValue,
};

/// The first difference found, with a `$.Orders[0].Id`-style path to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct PayloadMismatch {
    pub path: String,
    pub reason: String,
}

type Outcome = Result<(), PayloadMismatch>;

/// Compares `expected` against `actual`.
///
/// With `order_sensitive == false`, properties and parameters are matched
/// by name instead of by position. Entity, item and link order is always
/// significant.
pub fn compare(expected: &PayloadElement, actual: &PayloadElement, order_sensitive: bool) -> Outcome {
    Comparer { order_sensitive }.element("$", expected, actual)
}

struct Comparer {
    order_sensitive: bool,
}

fn mismatch(path: &str, reason: impl Into<String>) -> Outcome {
    Err(PayloadMismatch {
        path: path.to_string(),
        reason: reason.into(),
    })
}

fn same<T: PartialEq + std::fmt::Debug>(path: &str, what: &str, expected: &T, actual: &T) -> Outcome {
    if expected == actual {
        Ok(())
    } else {
        mismatch(path, format!("{what} differs: expected {expected:?}, got {actual:?}"))
    }
}

fn same_type_name(path: &str, expected: &Option<String>, actual: &Option<String>) -> Outcome {
    match (expected, actual) {
        (Some(e), Some(a)) if e != a => {
            mismatch(path, format!("type name differs: expected '{e}', got '{a}'"))
        }
        _ => Ok(()),
    }
}

fn same_len(path: &str, what: &str, expected: usize, actual: usize) -> Outcome {
    if expected == actual {
        Ok(())
    } else {
        mismatch(path, format!("expected {expected} {what}, got {actual}"))
    }
}

impl Comparer {
    fn element(&self, path: &str, expected: &PayloadElement, actual: &PayloadElement) -> Outcome {
        match (expected, actual) {
            (PayloadElement::Entity(e), PayloadElement::Entity(a)) => self.entity(path, e, a),
            (PayloadElement::EntitySet(e), PayloadElement::EntitySet(a)) => {
                self.entity_set(path, e, a)
            }
            (PayloadElement::Property(e), PayloadElement::Property(a)) => {
                same(path, "property name", &e.name, &a.name)?;
                self.property_value(&format!("{path}.{}", e.name), &e.value, &a.value)
            }
            (PayloadElement::PrimitiveValue(e), PayloadElement::PrimitiveValue(a)) => {
                self.primitive(path, e, a)
            }
            (PayloadElement::Complex(e), PayloadElement::Complex(a)) => self.complex(path, e, a),
            (PayloadElement::PrimitiveMultiValue(e), PayloadElement::PrimitiveMultiValue(a)) => {
                self.primitive_collection(path, e, a)
            }
            (PayloadElement::ComplexMultiValue(e), PayloadElement::ComplexMultiValue(a)) => {
                self.complex_collection(path, e, a)
            }
            (PayloadElement::DeferredLink(e), PayloadElement::DeferredLink(a)) => {
                same(path, "link", &e.url, &a.url)
            }
            (PayloadElement::LinkCollection(e), PayloadElement::LinkCollection(a)) => {
                self.link_collection(path, e, a)
            }
            (PayloadElement::Error(e), PayloadElement::Error(a)) => self.error(path, e, a),
            (PayloadElement::Workspace(e), PayloadElement::Workspace(a)) => {
                same(path, "context URL", &e.context_url, &a.context_url)?;
                same(path, "collections", &e.collections, &a.collections)
            }
            (PayloadElement::BatchRequest(e), PayloadElement::BatchRequest(a)) => {
                self.batch(path, &e.parts, &a.parts, |path, e, a| self.request_operation(path, e, a))
            }
            (PayloadElement::BatchResponse(e), PayloadElement::BatchResponse(a)) => {
                self.batch(path, &e.parts, &a.parts, |path, e, a| self.response_operation(path, e, a))
            }
            (PayloadElement::Parameters(e), PayloadElement::Parameters(a)) => {
                self.parameters(path, e, a)
            }
            _ => mismatch(
                path,
                format!(
                    "element type differs: expected {}, got {}",
                    expected.element_type(),
                    actual.element_type()
                ),
            ),
        }
    }

    fn entity(&self, path: &str, expected: &EntityInstance, actual: &EntityInstance) -> Outcome {
        same(path, "null flag", &expected.is_null, &actual.is_null)?;
        same_type_name(path, &expected.type_name, &actual.type_name)?;
        same(path, "id", &expected.id, &actual.id)?;
        same(path, "edit link", &expected.edit_link, &actual.edit_link)?;
        same(path, "read link", &expected.read_link, &actual.read_link)?;
        same(path, "etag", &expected.etag, &actual.etag)?;
        same(path, "media link", &expected.media, &actual.media)?;
        let operations = |e: &EntityInstance| {
            let mut ops: Vec<_> = e.actions().chain(e.functions()).cloned().collect();
            if !self.order_sensitive {
                ops.sort_by(|x, y| x.metadata.cmp(&y.metadata));
            }
            ops
        };
        same(path, "operations", &operations(expected), &operations(actual))?;
        self.properties(path, &expected.properties, &actual.properties)
    }

    fn entity_set(&self, path: &str, expected: &EntitySetInstance, actual: &EntitySetInstance) -> Outcome {
        same(path, "count", &expected.count, &actual.count)?;
        same(path, "next link", &expected.next_link, &actual.next_link)?;
        same(path, "delta link", &expected.delta_link, &actual.delta_link)?;
        same_len(path, "entities", expected.entities.len(), actual.entities.len())?;
        for (i, (e, a)) in expected.entities.iter().zip(&actual.entities).enumerate() {
            self.entity(&format!("{path}[{i}]"), e, a)?;
        }
        Ok(())
    }

    fn properties(&self, path: &str, expected: &[PropertyInstance], actual: &[PropertyInstance]) -> Outcome {
        same_len(path, "properties", expected.len(), actual.len())?;
        if self.order_sensitive {
            for (e, a) in expected.iter().zip(actual) {
                if e.name != a.name {
                    return mismatch(
                        path,
                        format!("property order differs: expected '{}', got '{}'", e.name, a.name),
                    );
                }
                self.property_value(&format!("{path}.{}", e.name), &e.value, &a.value)?;
            }
            return Ok(());
        }
        let mut used = vec![false; actual.len()];
        for e in expected {
            let found = actual
                .iter()
                .enumerate()
                .find(|(i, a)| !used[*i] && a.name == e.name);
            let Some((i, a)) = found else {
                return mismatch(path, format!("missing property '{}'", e.name));
            };
            used[i] = true;
            self.property_value(&format!("{path}.{}", e.name), &e.value, &a.value)?;
        }
        Ok(())
    }

    fn property_value(&self, path: &str, expected: &PropertyValue, actual: &PropertyValue) -> Outcome {
        match (expected, actual) {
            (PropertyValue::Primitive(e), PropertyValue::Primitive(a)) => self.primitive(path, e, a),
            (PropertyValue::Complex(e), PropertyValue::Complex(a)) => self.complex(path, e, a),
            (PropertyValue::PrimitiveCollection(e), PropertyValue::PrimitiveCollection(a)) => {
                self.primitive_collection(path, e, a)
            }
            (PropertyValue::ComplexCollection(e), PropertyValue::ComplexCollection(a)) => {
                self.complex_collection(path, e, a)
            }
            (PropertyValue::Navigation(e), PropertyValue::Navigation(a)) => self.navigation(path, e, a),
            (PropertyValue::NamedStream(e), PropertyValue::NamedStream(a)) => {
                same(path, "named stream", e, a)
            }
            _ => mismatch(path, "property kind differs"),
        }
    }

    fn primitive(&self, path: &str, expected: &PrimitiveValue, actual: &PrimitiveValue) -> Outcome {
        same_type_name(path, &expected.type_name, &actual.type_name)?;
        same(path, "value", &expected.value, &actual.value)
    }

    fn complex(&self, path: &str, expected: &ComplexInstance, actual: &ComplexInstance) -> Outcome {
        same(path, "null flag", &expected.is_null, &actual.is_null)?;
        same_type_name(path, &expected.type_name, &actual.type_name)?;
        self.properties(path, &expected.properties, &actual.properties)
    }

    fn primitive_collection(
        &self,
        path: &str,
        expected: &PrimitiveMultiValue,
        actual: &PrimitiveMultiValue,
    ) -> Outcome {
        same_type_name(path, &expected.type_name, &actual.type_name)?;
        same_len(path, "items", expected.items.len(), actual.items.len())?;
        for (i, (e, a)) in expected.items.iter().zip(&actual.items).enumerate() {
            self.primitive(&format!("{path}[{i}]"), e, a)?;
        }
        Ok(())
    }

    fn complex_collection(
        &self,
        path: &str,
        expected: &ComplexMultiValue,
        actual: &ComplexMultiValue,
    ) -> Outcome {
        same_type_name(path, &expected.type_name, &actual.type_name)?;
        same_len(path, "items", expected.items.len(), actual.items.len())?;
        for (i, (e, a)) in expected.items.iter().zip(&actual.items).enumerate() {
            self.complex(&format!("{path}[{i}]"), e, a)?;
        }
        Ok(())
    }

    fn navigation(
        &self,
        path: &str,
        expected: &NavigationPropertyInstance,
        actual: &NavigationPropertyInstance,
    ) -> Outcome {
        if let (Some(e), Some(a)) = (expected.is_collection, actual.is_collection) {
            same(path, "cardinality", &e, &a)?;
        }
        let url = |n: &NavigationPropertyInstance| n.association_link.as_ref().map(|l| l.url.clone());
        same(path, "association link", &url(expected), &url(actual))?;
        match (&expected.value, &actual.value) {
            (None, None) => Ok(()),
            (Some(NavigationValue::Deferred(e)), Some(NavigationValue::Deferred(a))) => {
                same(path, "navigation link", &e.url, &a.url)
            }
            (Some(NavigationValue::Expanded(e)), Some(NavigationValue::Expanded(a))) => {
                self.expanded(path, e, a)
            }
            _ => mismatch(path, "navigation content differs"),
        }
    }

    fn expanded(&self, path: &str, expected: &ExpandedLink, actual: &ExpandedLink) -> Outcome {
        if let (Some(e), Some(a)) = (&expected.url, &actual.url) {
            same(path, "navigation link", e, a)?;
        }
        same_len(path, "expanded items", expected.items.len(), actual.items.len())?;
        for (i, (e, a)) in expected.items.iter().zip(&actual.items).enumerate() {
            self.element(&format!("{path}[{i}]"), e, a)?;
        }
        Ok(())
    }

    fn batch<Op>(
        &self,
        path: &str,
        expected: &[BatchPart<Op>],
        actual: &[BatchPart<Op>],
        operation: impl Fn(&str, &Op, &Op) -> Outcome,
    ) -> Outcome {
        same_len(path, "batch parts", expected.len(), actual.len())?;
        for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
            let part_path = format!("{path}[{i}]");
            match (e, a) {
                (BatchPart::Operation(e), BatchPart::Operation(a)) => {
                    operation(&format!("{part_path}[0]"), e, a)?
                }
                (BatchPart::Changeset(e), BatchPart::Changeset(a)) => {
                    same_len(&part_path, "changeset entries", e.len(), a.len())?;
                    for (j, (e, a)) in e.iter().zip(a).enumerate() {
                        let entry_path = format!("{part_path}[{j}]");
                        match (e, a) {
                            (ChangesetItem::Operation(e), ChangesetItem::Operation(a)) => {
                                operation(&entry_path, e, a)?
                            }
                            (ChangesetItem::Failed(e), ChangesetItem::Failed(a)) => {
                                self.error(&entry_path, e, a)?
                            }
                            _ => return mismatch(&entry_path, "failed part and operation differ"),
                        }
                    }
                }
                (BatchPart::Failed(e), BatchPart::Failed(a)) => self.error(&part_path, e, a)?,
                _ => return mismatch(&part_path, "batch part kind differs"),
            }
        }
        Ok(())
    }

    fn link_collection(&self, path: &str, expected: &LinkCollection, actual: &LinkCollection) -> Outcome {
        same(path, "count", &expected.count, &actual.count)?;
        same(path, "next link", &expected.next_link, &actual.next_link)?;
        same_len(path, "links", expected.links.len(), actual.links.len())?;
        for (i, (e, a)) in expected.links.iter().zip(&actual.links).enumerate() {
            same(&format!("{path}[{i}]"), "link", &e.url, &a.url)?;
        }
        Ok(())
    }

    fn error(&self, path: &str, expected: &ErrorPayload, actual: &ErrorPayload) -> Outcome {
        same(path, "error code", &expected.code, &actual.code)?;
        same(path, "error message", &expected.message, &actual.message)?;
        same(path, "error target", &expected.target, &actual.target)?;
        same(path, "error details", &expected.details, &actual.details)?;
        same(path, "inner error", &expected.inner_error, &actual.inner_error)
    }

    fn request_operation(
        &self,
        path: &str,
        expected: &BatchRequestOperation,
        actual: &BatchRequestOperation,
    ) -> Outcome {
        same(path, "method", &expected.method, &actual.method)?;
        same(path, "url", &expected.url, &actual.url)?;
        self.operation_payload(path, expected.payload.as_deref(), actual.payload.as_deref())
    }

    fn response_operation(
        &self,
        path: &str,
        expected: &BatchResponseOperation,
        actual: &BatchResponseOperation,
    ) -> Outcome {
        same(path, "status", &expected.status, &actual.status)?;
        self.operation_payload(path, expected.payload.as_deref(), actual.payload.as_deref())
    }

    fn operation_payload(
        &self,
        path: &str,
        expected: Option<&PayloadElement>,
        actual: Option<&PayloadElement>,
    ) -> Outcome {
        match (expected, actual) {
            (None, None) => Ok(()),
            (Some(e), Some(a)) => self.element(path, e, a),
            (Some(_), None) => mismatch(path, "missing operation payload"),
            (None, Some(_)) => mismatch(path, "unexpected operation payload"),
        }
    }

    fn parameters(&self, path: &str, expected: &ParametersPayload, actual: &ParametersPayload) -> Outcome {
        same_len(path, "parameters", expected.parameters.len(), actual.parameters.len())?;
        for (i, e) in expected.parameters.iter().enumerate() {
            let a = if self.order_sensitive {
                &actual.parameters[i]
            } else {
                match actual.parameters.iter().find(|a| a.name == e.name) {
                    Some(a) => a,
                    None => return mismatch(path, format!("missing parameter '{}'", e.name)),
                }
            };
            same(path, "parameter name", &e.name, &a.name)?;
            self.element(&format!("{path}.{}", e.name), &e.value, &a.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Annotation, Annotations};
    use crate::element::{BatchResponsePayload, DeferredLink, NavigationPropertyInstance as Nav};

    fn customer() -> EntityInstance {
        EntityInstance::new(Some("NS.Customer"))
            .property(PropertyInstance::primitive("Id", 1))
            .property(PropertyInstance::primitive("Name", "Ann"))
            .property(PropertyInstance::navigation("Orders", Nav::deferred("Orders")))
    }

    #[test]
    fn property_order_only_matters_when_asked() {
        let mut reordered = customer();
        reordered.properties.swap(0, 1);
        let (e, a) = (customer().into(), reordered.into());
        assert!(compare(&e, &a, false).is_ok());
        let err = compare(&e, &a, true).unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.reason.contains("property order"));
    }

    #[test]
    fn annotations_and_one_sided_type_names_are_ignored() {
        let mut actual = customer();
        actual.type_name = None;
        actual.annotations.set(Annotation::PayloadOrder(vec!["Id".into()]));
        assert_eq!(compare(&customer().into(), &actual.into(), true), Ok(()));
    }

    #[test]
    fn annotations_on_links_errors_and_batches_are_ignored() {
        let tag = || -> Annotations { [Annotation::ContentType("text/plain".into())].into_iter().collect() };
        let links = LinkCollection {
            links: vec![DeferredLink::new("Orders(1)")],
            ..Default::default()
        };
        let mut tagged = links.clone();
        tagged.annotations = tag();
        tagged.links[0].annotations = tag();
        assert_eq!(compare(&links.into(), &tagged.into(), true), Ok(()));

        let mut nav = Nav::association_only("Orders/$ref");
        let plain = EntityInstance::new(None).property(PropertyInstance::navigation("Orders", nav.clone()));
        nav.annotations = tag();
        if let Some(link) = &mut nav.association_link {
            link.annotations = tag();
        }
        let tagged = EntityInstance::new(None).property(PropertyInstance::navigation("Orders", nav));
        assert_eq!(compare(&plain.into(), &tagged.into(), true), Ok(()));

        let failed = ErrorPayload {
            message: Some("bad part".into()),
            ..Default::default()
        };
        let batch = |error: ErrorPayload, annotations: Annotations| BatchResponsePayload {
            parts: vec![BatchPart::Changeset(vec![ChangesetItem::Failed(error)])],
            annotations,
        };
        let mut tagged_error = failed.clone();
        tagged_error.annotations = tag();
        assert_eq!(
            compare(
                &batch(failed.clone(), Annotations::new()).into(),
                &batch(tagged_error, tag()).into(),
                true
            ),
            Ok(())
        );

        let other = ErrorPayload {
            message: Some("other".into()),
            ..Default::default()
        };
        let err = compare(
            &batch(failed, Annotations::new()).into(),
            &batch(other, Annotations::new()).into(),
            true,
        )
        .unwrap_err();
        assert_eq!(err.path, "$[0][0]");
        assert!(err.reason.starts_with("error message differs"));
    }

    #[test]
    fn reports_the_first_difference_with_a_path() {
        let mut actual = customer();
        actual.properties[2] = PropertyInstance::navigation("Orders", Nav::deferred("Other"));
        let err = compare(&customer().into(), &actual.into(), false).unwrap_err();
        assert_eq!(err.path, "$.Orders");
        assert_eq!(
            err.to_string(),
            "$.Orders: navigation link differs: expected \"Orders\", got \"Other\""
        );
    }

    #[test]
    fn element_kinds_must_match() {
        let err = compare(
            &customer().into(),
            &EntitySetInstance::new().into(),
            false,
        )
        .unwrap_err();
        assert_eq!(
            err.reason,
            "element type differs: expected EntityInstance, got EntitySetInstance"
        );
    }
}
