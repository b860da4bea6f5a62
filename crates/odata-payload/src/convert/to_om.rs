use odata_reader::collect::{
    ExpandedItem, ReadBatch, ReadBatchPart, ReadChangesetItem, ReadCollection, ReadNestedInfo,
    ReadOperation, ReadParameter, ReadParameterValue, ReadPayload, ReadResource, ReadResourceSet,
};
use odata_reader::{
    MessageLine, ODataAssociationLink, ODataCollectionStart, ODataCollectionValue,
    ODataComplexValue, ODataEntityReferenceLink, ODataEntityReferenceLinks, ODataError,
    ODataErrorDetail, ODataInnerError, ODataNestedResourceInfo, ODataOperation, ODataProperty,
    ODataReaderError, ODataResource, ODataResourceMember, ODataResourceSet, ODataServiceDocument,
    ODataServiceDocumentElement, ODataStreamReferenceValue, ODataValue,
};

use super::ConvertError;
use crate::annotations::Annotations;
use crate::element::{
    BatchPart, BatchRequestOperation, BatchResponseOperation, ChangesetItem, ComplexInstance,
    ElementType, EntityInstance, EntitySetInstance, ErrorPayload, InnerErrorPayload,
    NavigationPropertyInstance, NavigationValue, ParametersPayload, PayloadElement, PrimitiveValue,
    PropertyInstance, PropertyValue, ServiceOperationDescriptor, WorkspaceInstance,
};

type Result<T> = std::result::Result<T, ConvertError>;

/// Payload tree to object model.
///
/// In responses an expanded link holding more than one item is rejected the
/// same way the reader rejects it. A deferred link with an empty URL maps
/// back to a navigation link without one.
pub struct PayloadElementToObjectModel {
    is_response: bool,
}

fn primitive(value: &PrimitiveValue) -> ODataValue {
    value
        .value
        .clone()
        .map(ODataValue::Primitive)
        .unwrap_or(ODataValue::Null)
}

fn operation(op: &ServiceOperationDescriptor) -> ODataOperation {
    ODataOperation {
        metadata: op.metadata.clone(),
        title: op.title.clone(),
        target: op.target.clone(),
    }
}

fn inner_error(inner: &InnerErrorPayload) -> ODataInnerError {
    ODataInnerError {
        message: inner.message.clone(),
        type_name: inner.type_name.clone(),
        stack_trace: inner.stack_trace.clone(),
        internal_error: inner.inner.as_deref().map(|i| Box::new(inner_error(i))),
    }
}

fn error(error: &ErrorPayload) -> ODataError {
    ODataError {
        code: error.code.clone(),
        message: error.message.clone(),
        target: error.target.clone(),
        details: error
            .details
            .iter()
            .map(|d| ODataErrorDetail {
                code: d.code.clone(),
                message: d.message.clone(),
                target: d.target.clone(),
            })
            .collect(),
        inner_error: error.inner_error.as_ref().map(inner_error),
    }
}

fn failed_part(error: &ErrorPayload) -> ODataReaderError {
    ODataReaderError::Batch(error.message.clone().unwrap_or_default())
}

fn service_document(workspace: &WorkspaceInstance) -> ODataServiceDocument {
    ODataServiceDocument {
        context_url: workspace.context_url.clone(),
        elements: workspace
            .collections
            .iter()
            .map(|c| ODataServiceDocumentElement {
                kind: c.kind,
                name: c.name.clone(),
                url: c.url.clone(),
                title: c.title.clone(),
            })
            .collect(),
    }
}

/// `Collection(T)` to `T`.
fn item_type_name(type_name: Option<&str>) -> Option<String> {
    type_name
        .and_then(|t| t.strip_prefix("Collection("))
        .and_then(|t| t.strip_suffix(')'))
        .map(str::to_string)
}

fn collection_start(type_name: Option<&str>, annotations: &Annotations) -> ODataCollectionStart {
    ODataCollectionStart {
        name: annotations.collection_name().map(str::to_string),
        item_type_name: item_type_name(type_name),
        ..Default::default()
    }
}

fn unexpected(context: &'static str, found: ElementType) -> ConvertError {
    ConvertError::UnexpectedElement { context, found }
}

impl PayloadElementToObjectModel {
    pub fn new(is_response: bool) -> Self {
        Self { is_response }
    }

    pub fn convert(&self, element: &PayloadElement) -> Result<ReadPayload> {
        Ok(match element {
            PayloadElement::Entity(e) => ReadPayload::Resource(self.resource(e)?),
            PayloadElement::EntitySet(s) => ReadPayload::ResourceSet(self.resource_set(s)?),
            PayloadElement::Property(p) => ReadPayload::Property(self.property(p)?),
            PayloadElement::PrimitiveValue(v) => match &v.value {
                Some(value) => ReadPayload::Value(value.clone()),
                None => return Err(ConvertError::Unsupported("a null raw value".into())),
            },
            PayloadElement::Complex(_) => {
                return Err(ConvertError::Unsupported("a standalone complex value".into()))
            }
            PayloadElement::PrimitiveMultiValue(_) | PayloadElement::ComplexMultiValue(_) => {
                ReadPayload::Collection(self.collection(element)?)
            }
            PayloadElement::DeferredLink(l) => {
                ReadPayload::EntityReferenceLink(ODataEntityReferenceLink { url: l.url.clone() })
            }
            PayloadElement::LinkCollection(l) => {
                ReadPayload::EntityReferenceLinks(ODataEntityReferenceLinks {
                    links: l
                        .links
                        .iter()
                        .map(|l| ODataEntityReferenceLink { url: l.url.clone() })
                        .collect(),
                    count: l.count,
                    next_page_link: l.next_link.clone(),
                })
            }
            PayloadElement::Error(e) => ReadPayload::Error(error(e)),
            PayloadElement::BatchRequest(b) => ReadPayload::Batch(ReadBatch {
                is_response: false,
                parts: self.batch_parts(&b.parts, |op: &BatchRequestOperation| {
                    Ok(ReadOperation {
                        line: MessageLine::Request {
                            method: op.method.clone(),
                            url: op.url.clone(),
                        },
                        headers: op.headers.clone(),
                        body: Vec::new(),
                        payload: self.operation_payload(op.payload.as_deref())?,
                        error: None,
                    })
                })?,
            }),
            PayloadElement::BatchResponse(b) => ReadPayload::Batch(ReadBatch {
                is_response: true,
                parts: self.batch_parts(&b.parts, |op: &BatchResponseOperation| {
                    Ok(ReadOperation {
                        line: MessageLine::Response { status: op.status },
                        headers: op.headers.clone(),
                        body: Vec::new(),
                        payload: self.operation_payload(op.payload.as_deref())?,
                        error: None,
                    })
                })?,
            }),
            PayloadElement::Workspace(w) => ReadPayload::ServiceDocument(service_document(w)),
            PayloadElement::Parameters(p) => ReadPayload::Parameters(self.parameters(p)?),
        })
    }

    pub fn resource(&self, entity: &EntityInstance) -> Result<ReadResource> {
        let mut resource = ODataResource {
            type_name: entity.type_name.clone(),
            id: entity.id.clone(),
            edit_link: entity.edit_link.clone(),
            read_link: entity.read_link.clone(),
            etag: entity.etag.clone(),
            media_resource: entity.media.as_ref().map(|m| ODataStreamReferenceValue {
                read_link: m.source_link.clone(),
                edit_link: m.edit_link.clone(),
                content_type: m.content_type.clone(),
                etag: m.etag.clone(),
            }),
            payload_order: entity.annotations.payload_order().map(<[String]>::to_vec),
            ..Default::default()
        };
        let mut nested = Vec::new();
        for property in &entity.properties {
            match &property.value {
                PropertyValue::Navigation(NavigationPropertyInstance {
                    value: None,
                    association_link: Some(link),
                    ..
                }) => {
                    resource.association_links.push(ODataAssociationLink {
                        name: property.name.clone(),
                        url: link.url.clone(),
                    });
                    resource.member_order.push(ODataResourceMember::AssociationLink);
                }
                PropertyValue::Navigation(nav) => {
                    nested.push(self.nested(&property.name, nav)?);
                    resource.member_order.push(ODataResourceMember::NestedResourceInfo);
                }
                _ => {
                    resource.properties.push(self.property(property)?);
                    resource.member_order.push(ODataResourceMember::Property);
                }
            }
        }
        for op in &entity.operations {
            if op.is_action {
                resource.actions.push(operation(op));
            } else {
                resource.functions.push(operation(op));
            }
        }
        Ok(ReadResource { resource, nested })
    }

    pub fn resource_set(&self, set: &EntitySetInstance) -> Result<ReadResourceSet> {
        Ok(ReadResourceSet {
            set: ODataResourceSet {
                count: set.count,
                next_page_link: set.next_link.clone(),
                delta_link: set.delta_link.clone(),
            },
            resources: set
                .entities
                .iter()
                .map(|e| self.resource(e))
                .collect::<Result<_>>()?,
        })
    }

    fn nested(&self, name: &str, nav: &NavigationPropertyInstance) -> Result<ReadNestedInfo> {
        let mut info = ODataNestedResourceInfo {
            name: name.to_string(),
            association_link_url: nav.association_link.as_ref().map(|l| l.url.clone()),
            is_collection: nav.is_collection,
            ..Default::default()
        };
        let mut expanded_items = Vec::new();
        match &nav.value {
            None => {}
            Some(NavigationValue::Deferred(link)) => {
                info.url = (!link.url.is_empty()).then(|| link.url.clone());
            }
            Some(NavigationValue::Expanded(link)) => {
                if self.is_response && link.items.len() > 1 {
                    return Err(ODataReaderError::MultipleItemsInNavigationLinkContent.into());
                }
                info.url = link.url.clone();
                for item in &link.items {
                    expanded_items.push(match item {
                        PayloadElement::Entity(e) if e.is_null => ExpandedItem::Resource(None),
                        PayloadElement::Entity(e) => ExpandedItem::Resource(Some(self.resource(e)?)),
                        PayloadElement::EntitySet(s) => ExpandedItem::ResourceSet(self.resource_set(s)?),
                        PayloadElement::DeferredLink(l) => {
                            ExpandedItem::ReferenceLink(ODataEntityReferenceLink { url: l.url.clone() })
                        }
                        other => return Err(unexpected("navigation link content", other.element_type())),
                    });
                }
            }
        }
        Ok(ReadNestedInfo {
            info,
            expanded_items,
        })
    }

    fn property(&self, property: &PropertyInstance) -> Result<ODataProperty> {
        Ok(ODataProperty {
            name: property.name.clone(),
            value: self.value(property)?,
        })
    }

    fn value(&self, property: &PropertyInstance) -> Result<ODataValue> {
        Ok(match &property.value {
            PropertyValue::Primitive(p) => primitive(p),
            PropertyValue::Complex(c) => self.complex(c)?,
            PropertyValue::PrimitiveCollection(m) => ODataValue::Collection(ODataCollectionValue {
                type_name: m.type_name.clone(),
                items: m.items.iter().map(primitive).collect(),
            }),
            PropertyValue::ComplexCollection(m) => ODataValue::Collection(ODataCollectionValue {
                type_name: m.type_name.clone(),
                items: m
                    .items
                    .iter()
                    .map(|c| self.complex(c))
                    .collect::<Result<_>>()?,
            }),
            PropertyValue::NamedStream(s) => ODataValue::StreamReference(ODataStreamReferenceValue {
                read_link: s.source_link.clone(),
                edit_link: s.edit_link.clone(),
                content_type: s.content_type.clone(),
                etag: s.etag.clone(),
            }),
            PropertyValue::Navigation(_) => {
                return Err(unexpected("a structural value", property.element_type()))
            }
        })
    }

    fn complex(&self, complex: &ComplexInstance) -> Result<ODataValue> {
        if complex.is_null {
            return Ok(ODataValue::Null);
        }
        Ok(ODataValue::Complex(ODataComplexValue {
            type_name: complex.type_name.clone(),
            properties: complex
                .properties
                .iter()
                .map(|p| self.property(p))
                .collect::<Result<_>>()?,
        }))
    }

    fn collection(&self, element: &PayloadElement) -> Result<ReadCollection> {
        match element {
            PayloadElement::PrimitiveMultiValue(m) => Ok(ReadCollection {
                start: collection_start(m.type_name.as_deref(), &m.annotations),
                items: m.items.iter().map(primitive).collect(),
            }),
            PayloadElement::ComplexMultiValue(m) => Ok(ReadCollection {
                start: collection_start(m.type_name.as_deref(), &m.annotations),
                items: m
                    .items
                    .iter()
                    .map(|c| self.complex(c))
                    .collect::<Result<_>>()?,
            }),
            other => Err(unexpected("a collection", other.element_type())),
        }
    }

    fn parameters(&self, payload: &ParametersPayload) -> Result<Vec<ReadParameter>> {
        payload
            .parameters
            .iter()
            .map(|parameter| {
                let value = match &parameter.value {
                    PayloadElement::PrimitiveValue(p) => ReadParameterValue::Value(primitive(p)),
                    PayloadElement::Complex(c) => ReadParameterValue::Value(self.complex(c)?),
                    PayloadElement::Entity(e) if e.is_null => ReadParameterValue::Resource(None),
                    PayloadElement::Entity(e) => ReadParameterValue::Resource(Some(self.resource(e)?)),
                    PayloadElement::EntitySet(s) => ReadParameterValue::ResourceSet(self.resource_set(s)?),
                    multi @ (PayloadElement::PrimitiveMultiValue(_)
                    | PayloadElement::ComplexMultiValue(_)) => {
                        ReadParameterValue::Collection(self.collection(multi)?)
                    }
                    other => return Err(unexpected("a parameter", other.element_type())),
                };
                Ok(ReadParameter {
                    name: parameter.name.clone(),
                    value,
                })
            })
            .collect()
    }

    fn operation_payload(&self, payload: Option<&PayloadElement>) -> Result<Option<ReadPayload>> {
        payload.map(|p| self.convert(p)).transpose()
    }

    fn batch_parts<Op>(
        &self,
        parts: &[BatchPart<Op>],
        convert: impl Fn(&Op) -> Result<ReadOperation>,
    ) -> Result<Vec<ReadBatchPart>> {
        parts
            .iter()
            .map(|part| {
                Ok(match part {
                    BatchPart::Operation(op) => ReadBatchPart::Operation(convert(op)?),
                    BatchPart::Changeset(items) => ReadBatchPart::Changeset(
                        items
                            .iter()
                            .map(|item| {
                                Ok(match item {
                                    ChangesetItem::Operation(op) => {
                                        ReadChangesetItem::Operation(convert(op)?)
                                    }
                                    ChangesetItem::Failed(e) => {
                                        ReadChangesetItem::Failed(failed_part(e))
                                    }
                                })
                            })
                            .collect::<Result<_>>()?,
                    ),
                    BatchPart::Failed(e) => ReadBatchPart::Failed(failed_part(e)),
                })
            })
            .collect()
    }
}
