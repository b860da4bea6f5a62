use tracing::debug;

use odata_edm::{EdmModel, EdmType};
use odata_reader::collect::{
    ExpandedItem, ReadBatch, ReadBatchPart, ReadChangesetItem, ReadCollection, ReadNestedInfo,
    ReadOperation, ReadParameter, ReadParameterValue, ReadPayload, ReadResource, ReadResourceSet,
};
use odata_reader::{
    MessageLine, ODataAssociationLink, ODataComplexValue, ODataError, ODataInnerError,
    ODataOperation, ODataPrimitiveValue, ODataProperty, ODataReaderError, ODataResourceMember,
    ODataServiceDocument,
    ODataStreamReferenceValue, ODataValue,
};

use super::ConvertError;
use crate::annotations::{Annotation, Annotations};
use crate::element::{
    BatchPart, BatchRequestOperation, BatchRequestPayload, BatchResponseOperation,
    BatchResponsePayload, ChangesetItem, ComplexInstance, ComplexMultiValue, DeferredLink, ElementType,
    EntityInstance, EntitySetInstance, ErrorDetail, ErrorPayload, ExpandedLink, InnerErrorPayload,
    LinkCollection, MediaLink, NamedStreamInstance, NavigationPropertyInstance, NavigationValue,
    Parameter, ParametersPayload, PayloadElement, PrimitiveMultiValue, PrimitiveValue,
    PropertyInstance, PropertyValue, ResourceCollectionInstance, ServiceOperationDescriptor,
    WorkspaceInstance,
};

type Result<T> = std::result::Result<T, ConvertError>;

/// Object model to payload tree.
///
/// Entity properties follow the resource's wire order
/// ([`ODataResource::member_order`](odata_reader::ODataResource::member_order));
/// members it does not list follow as structural properties, then navigation
/// links, then association links.
///
/// With a model, value nodes whose declared type is known get an
/// [`Annotation::EntityModelType`]. A navigation link read without content
/// becomes a deferred link in responses (or whenever it has a URL) and an
/// empty expanded link otherwise.
pub struct ObjectModelToPayloadElement<'a> {
    model: Option<&'a EdmModel>,
    is_response: bool,
}

enum MultiValue {
    Primitive(PrimitiveMultiValue),
    Complex(ComplexMultiValue),
}

impl From<MultiValue> for PropertyValue {
    fn from(value: MultiValue) -> Self {
        match value {
            MultiValue::Primitive(m) => Self::PrimitiveCollection(m),
            MultiValue::Complex(m) => Self::ComplexCollection(m),
        }
    }
}

impl From<MultiValue> for PayloadElement {
    fn from(value: MultiValue) -> Self {
        match value {
            MultiValue::Primitive(m) => Self::PrimitiveMultiValue(m),
            MultiValue::Complex(m) => Self::ComplexMultiValue(m),
        }
    }
}

fn annotate(annotations: &mut Annotations, declared: Option<&EdmType>) {
    if let Some(t) = declared {
        annotations.set(Annotation::EntityModelType(t.clone()));
    }
}

fn primitive(value: &ODataPrimitiveValue) -> PrimitiveValue {
    PrimitiveValue::new(value.clone()).with_type_name(value.kind().full_name())
}

fn media_link(stream: &ODataStreamReferenceValue) -> MediaLink {
    MediaLink {
        source_link: stream.read_link.clone(),
        edit_link: stream.edit_link.clone(),
        content_type: stream.content_type.clone(),
        etag: stream.etag.clone(),
    }
}

fn named_stream(stream: &ODataStreamReferenceValue) -> NamedStreamInstance {
    NamedStreamInstance {
        source_link: stream.read_link.clone(),
        edit_link: stream.edit_link.clone(),
        content_type: stream.content_type.clone(),
        etag: stream.etag.clone(),
    }
}

fn association_link(link: &ODataAssociationLink) -> PropertyInstance {
    PropertyInstance::navigation(
        link.name.clone(),
        NavigationPropertyInstance::association_only(link.url.clone()),
    )
}

fn operation(op: &ODataOperation, is_action: bool) -> ServiceOperationDescriptor {
    ServiceOperationDescriptor {
        is_action,
        metadata: op.metadata.clone(),
        title: op.title.clone(),
        target: op.target.clone(),
    }
}

fn inner_error(inner: &ODataInnerError) -> InnerErrorPayload {
    InnerErrorPayload {
        message: inner.message.clone(),
        type_name: inner.type_name.clone(),
        stack_trace: inner.stack_trace.clone(),
        inner: inner.internal_error.as_deref().map(|i| Box::new(inner_error(i))),
    }
}

fn error(error: &ODataError) -> ErrorPayload {
    ErrorPayload {
        code: error.code.clone(),
        message: error.message.clone(),
        target: error.target.clone(),
        details: error
            .details
            .iter()
            .map(|d| ErrorDetail {
                code: d.code.clone(),
                message: d.message.clone(),
                target: d.target.clone(),
            })
            .collect(),
        inner_error: error.inner_error.as_ref().map(inner_error),
        annotations: Annotations::new(),
    }
}

/// The error element standing in for a batch part the reader skipped.
fn failed_part(err: &ODataReaderError) -> ErrorPayload {
    ErrorPayload {
        message: Some(err.to_string()),
        ..Default::default()
    }
}

fn workspace(document: &ODataServiceDocument) -> WorkspaceInstance {
    WorkspaceInstance {
        context_url: document.context_url.clone(),
        collections: document
            .elements
            .iter()
            .map(|e| ResourceCollectionInstance {
                kind: e.kind,
                name: e.name.clone(),
                url: e.url.clone(),
                title: e.title.clone(),
            })
            .collect(),
        annotations: Annotations::new(),
    }
}

/// `true` when a collection without non-null items should be complex.
fn names_complex_items(type_name: Option<&str>, declared: Option<&EdmType>) -> bool {
    if let Some(t) = declared {
        let item = t.item_type().unwrap_or(t);
        return matches!(item, EdmType::Complex(_));
    }
    match type_name.map(EdmType::parse) {
        Some(Ok(t)) => matches!(t.item_type().unwrap_or(&t), EdmType::Complex(_)),
        _ => false,
    }
}

impl<'a> ObjectModelToPayloadElement<'a> {
    pub fn new(model: Option<&'a EdmModel>, is_response: bool) -> Self {
        Self { model, is_response }
    }

    pub fn convert(&self, payload: &ReadPayload) -> Result<PayloadElement> {
        Ok(match payload {
            ReadPayload::Resource(r) => self.resource(r)?.into(),
            ReadPayload::ResourceSet(s) => self.resource_set(s)?.into(),
            ReadPayload::Property(p) => self.property(None, p)?.into(),
            ReadPayload::Collection(c) => self.collection(c)?,
            ReadPayload::Value(v) => primitive(v).into(),
            ReadPayload::EntityReferenceLink(l) => DeferredLink::new(l.url.clone()).into(),
            ReadPayload::EntityReferenceLinks(l) => LinkCollection {
                count: l.count,
                next_link: l.next_page_link.clone(),
                links: l.links.iter().map(|l| DeferredLink::new(l.url.clone())).collect(),
                annotations: Annotations::new(),
            }
            .into(),
            ReadPayload::ServiceDocument(d) => workspace(d).into(),
            ReadPayload::Error(e) => error(e).into(),
            ReadPayload::Parameters(p) => self.parameters(p)?.into(),
            ReadPayload::Batch(b) => self.batch(b)?,
        })
    }

    fn model_type(&self, type_name: Option<&str>) -> Option<EdmType> {
        self.model?.find_type(type_name?)
    }

    pub fn resource(&self, read: &ReadResource) -> Result<EntityInstance> {
        let r = &read.resource;
        let type_name = r.type_name.as_deref();
        let mut entity = EntityInstance {
            type_name: r.type_name.clone(),
            id: r.id.clone(),
            edit_link: r.edit_link.clone(),
            read_link: r.read_link.clone(),
            etag: r.etag.clone(),
            media: r.media_resource.as_ref().map(media_link),
            ..Default::default()
        };
        annotate(&mut entity.annotations, self.model_type(type_name).as_ref());
        if let Some(order) = &r.payload_order {
            entity.annotations.set(Annotation::PayloadOrder(order.clone()));
        }
        let mut properties = r.properties.iter();
        let mut nested = read.nested.iter();
        let mut links = r.association_links.iter();
        for member in &r.member_order {
            let next = match member {
                ODataResourceMember::Property => properties
                    .next()
                    .map(|p| self.property(type_name, p))
                    .transpose()?,
                ODataResourceMember::NestedResourceInfo => {
                    nested.next().map(|n| self.navigation(n)).transpose()?
                }
                ODataResourceMember::AssociationLink => links.next().map(association_link),
            };
            entity.properties.extend(next);
        }
        for property in properties {
            entity.properties.push(self.property(type_name, property)?);
        }
        for info in nested {
            entity.properties.push(self.navigation(info)?);
        }
        entity.properties.extend(links.map(association_link));
        entity.operations.extend(r.actions.iter().map(|op| operation(op, true)));
        entity.operations.extend(r.functions.iter().map(|op| operation(op, false)));
        Ok(entity)
    }

    pub fn resource_set(&self, read: &ReadResourceSet) -> Result<EntitySetInstance> {
        Ok(EntitySetInstance {
            count: read.set.count,
            next_link: read.set.next_page_link.clone(),
            delta_link: read.set.delta_link.clone(),
            entities: read
                .resources
                .iter()
                .map(|r| self.resource(r))
                .collect::<Result<_>>()?,
            annotations: Annotations::new(),
        })
    }

    fn navigation(&self, nested: &ReadNestedInfo) -> Result<PropertyInstance> {
        let info = &nested.info;
        let value = if nested.expanded_items.is_empty() {
            if self.is_response || info.url.is_some() {
                NavigationValue::Deferred(DeferredLink::new(info.url.clone().unwrap_or_default()))
            } else {
                NavigationValue::Expanded(ExpandedLink::new(None))
            }
        } else {
            let mut link = ExpandedLink::new(info.url.as_deref());
            for item in &nested.expanded_items {
                link.items.push(self.expanded_item(item)?);
            }
            NavigationValue::Expanded(link)
        };
        let navigation = NavigationPropertyInstance {
            value: Some(value),
            association_link: info.association_link_url.clone().map(DeferredLink::new),
            is_collection: info.is_collection,
            annotations: Annotations::new(),
        };
        Ok(PropertyInstance::navigation(info.name.clone(), navigation))
    }

    fn expanded_item(&self, item: &ExpandedItem) -> Result<PayloadElement> {
        Ok(match item {
            ExpandedItem::Resource(Some(r)) => self.resource(r)?.into(),
            ExpandedItem::Resource(None) => EntityInstance::null().into(),
            ExpandedItem::ResourceSet(s) => self.resource_set(s)?.into(),
            ExpandedItem::ReferenceLink(l) => DeferredLink::new(l.url.clone()).into(),
        })
    }

    /// `owner` is the structured type declaring `property`, when known.
    fn property(&self, owner: Option<&str>, property: &ODataProperty) -> Result<PropertyInstance> {
        let declared = match (self.model, owner) {
            (Some(model), Some(owner)) => model
                .structural_property(owner, &property.name)
                .map(|p| p.type_.clone()),
            _ => None,
        };
        let value = self.value(&property.value, declared.as_ref())?;
        Ok(PropertyInstance::new(property.name.clone(), value))
    }

    fn value(&self, value: &ODataValue, declared: Option<&EdmType>) -> Result<PropertyValue> {
        Ok(match value {
            ODataValue::Null => match declared {
                Some(EdmType::Complex(_)) => {
                    let mut complex = ComplexInstance::null(None);
                    annotate(&mut complex.annotations, declared);
                    PropertyValue::Complex(complex)
                }
                _ => {
                    let mut null = PrimitiveValue::null();
                    annotate(&mut null.annotations, declared);
                    PropertyValue::Primitive(null)
                }
            },
            ODataValue::Primitive(p) => {
                let mut value = primitive(p);
                annotate(&mut value.annotations, declared);
                PropertyValue::Primitive(value)
            }
            ODataValue::Complex(c) => {
                let mut complex = self.complex(c, declared)?;
                annotate(&mut complex.annotations, declared);
                PropertyValue::Complex(complex)
            }
            ODataValue::Collection(c) => self
                .multi_value(c.type_name.as_deref(), &c.items, declared)?
                .into(),
            ODataValue::StreamReference(s) => PropertyValue::NamedStream(named_stream(s)),
        })
    }

    fn complex(&self, value: &ODataComplexValue, declared: Option<&EdmType>) -> Result<ComplexInstance> {
        let declared_name = match declared {
            Some(EdmType::Complex(name)) => Some(name.as_str()),
            _ => None,
        };
        let owner = value.type_name.as_deref().or(declared_name);
        let mut complex = ComplexInstance::new(value.type_name.as_deref());
        for property in &value.properties {
            complex.properties.push(self.property(owner, property)?);
        }
        Ok(complex)
    }

    fn multi_value(
        &self,
        type_name: Option<&str>,
        items: &[ODataValue],
        declared: Option<&EdmType>,
    ) -> Result<MultiValue> {
        let item_declared = declared.and_then(EdmType::item_type);
        let is_complex = match items.iter().find(|v| !v.is_null()) {
            Some(ODataValue::Primitive(_)) => false,
            Some(ODataValue::Complex(_)) => true,
            Some(ODataValue::Collection(_)) => {
                return Err(ConvertError::Unsupported("a nested collection".into()))
            }
            Some(ODataValue::StreamReference(_)) => {
                return Err(ConvertError::Unsupported("a collection of streams".into()))
            }
            Some(ODataValue::Null) | None => names_complex_items(type_name, declared),
        };

        if is_complex {
            let mut collection = ComplexMultiValue::new(type_name);
            annotate(&mut collection.annotations, declared);
            for item in items {
                collection.items.push(match item {
                    ODataValue::Null => ComplexInstance::null(None),
                    ODataValue::Complex(c) => self.complex(c, item_declared)?,
                    _ => return Err(ConvertError::HeterogeneousCollection),
                });
            }
            Ok(MultiValue::Complex(collection))
        } else {
            let mut collection = PrimitiveMultiValue::new(type_name);
            annotate(&mut collection.annotations, declared);
            for item in items {
                collection.items.push(match item {
                    ODataValue::Null => PrimitiveValue::null(),
                    ODataValue::Primitive(p) => primitive(p),
                    _ => return Err(ConvertError::HeterogeneousCollection),
                });
            }
            Ok(MultiValue::Primitive(collection))
        }
    }

    fn collection(&self, read: &ReadCollection) -> Result<PayloadElement> {
        let type_name = read
            .start
            .item_type_name
            .as_ref()
            .map(|t| format!("Collection({t})"));
        let mut element: PayloadElement = self
            .multi_value(type_name.as_deref(), &read.items, None)?
            .into();
        if let Some(name) = &read.start.name {
            element
                .annotations_mut()
                .set(Annotation::CollectionName(name.clone()));
        }
        Ok(element)
    }

    fn parameters(&self, parameters: &[ReadParameter]) -> Result<ParametersPayload> {
        let mut payload = ParametersPayload::default();
        for parameter in parameters {
            let value = match &parameter.value {
                ReadParameterValue::Value(v) => match self.value(v, None)? {
                    PropertyValue::Primitive(p) => p.into(),
                    PropertyValue::Complex(c) => c.into(),
                    PropertyValue::PrimitiveCollection(m) => m.into(),
                    PropertyValue::ComplexCollection(m) => m.into(),
                    PropertyValue::Navigation(_) | PropertyValue::NamedStream(_) => {
                        return Err(ConvertError::Unsupported(format!(
                            "the stream value of parameter '{}'",
                            parameter.name
                        )))
                    }
                },
                ReadParameterValue::Resource(Some(r)) => self.resource(r)?.into(),
                ReadParameterValue::Resource(None) => EntityInstance::null().into(),
                ReadParameterValue::ResourceSet(s) => self.resource_set(s)?.into(),
                ReadParameterValue::Collection(c) => self.collection(c)?,
            };
            payload.parameters.push(Parameter {
                name: parameter.name.clone(),
                value,
            });
        }
        Ok(payload)
    }

    fn batch(&self, batch: &ReadBatch) -> Result<PayloadElement> {
        if batch.is_response {
            Ok(BatchResponsePayload {
                parts: self.batch_parts(&batch.parts, |op| self.response_operation(op))?,
                annotations: Annotations::new(),
            }
            .into())
        } else {
            Ok(BatchRequestPayload {
                parts: self.batch_parts(&batch.parts, |op| self.request_operation(op))?,
                annotations: Annotations::new(),
            }
            .into())
        }
    }

    fn batch_parts<Op>(
        &self,
        parts: &[ReadBatchPart],
        convert: impl Fn(&ReadOperation) -> Result<Op>,
    ) -> Result<Vec<BatchPart<Op>>> {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            out.push(match part {
                ReadBatchPart::Operation(op) => BatchPart::Operation(convert(op)?),
                ReadBatchPart::Changeset(items) => BatchPart::Changeset(
                    items
                        .iter()
                        .map(|item| {
                            Ok(match item {
                                ReadChangesetItem::Operation(op) => {
                                    ChangesetItem::Operation(convert(op)?)
                                }
                                ReadChangesetItem::Failed(err) => {
                                    ChangesetItem::Failed(failed_part(err))
                                }
                            })
                        })
                        .collect::<Result<_>>()?,
                ),
                ReadBatchPart::Failed(err) => BatchPart::Failed(failed_part(err)),
            });
        }
        Ok(out)
    }

    fn operation_payload(&self, op: &ReadOperation) -> Result<Option<Box<PayloadElement>>> {
        if let Some(err) = &op.error {
            debug!(error = %err, "batch operation payload was not readable");
        }
        Ok(op
            .payload
            .as_ref()
            .map(|p| self.convert(p))
            .transpose()?
            .map(Box::new))
    }

    fn request_operation(&self, op: &ReadOperation) -> Result<BatchRequestOperation> {
        let MessageLine::Request { method, url } = &op.line else {
            return Err(ConvertError::UnexpectedElement {
                context: "a request batch",
                found: ElementType::BatchResponse,
            });
        };
        Ok(BatchRequestOperation {
            method: method.clone(),
            url: url.clone(),
            headers: op.headers.clone(),
            payload: self.operation_payload(op)?,
        })
    }

    fn response_operation(&self, op: &ReadOperation) -> Result<BatchResponseOperation> {
        let MessageLine::Response { status } = &op.line else {
            return Err(ConvertError::UnexpectedElement {
                context: "a response batch",
                found: ElementType::BatchRequest,
            });
        };
        Ok(BatchResponseOperation {
            status: *status,
            headers: op.headers.clone(),
            payload: self.operation_payload(op)?,
        })
    }
}
