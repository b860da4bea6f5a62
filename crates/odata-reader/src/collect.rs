//! Drains readers into owned object-model trees.
//!
//! The pull readers report structure only through their state sequence.
//! These helpers walk that sequence once and keep what each navigation link
//! expanded to, so later consumers do not need to replay the reader.

use std::io::{Cursor, Read};

use tracing::debug;

use crate::batch::{ODataBatchOperationMessage, ODataBatchReader, ODataBatchReaderState};
use crate::collection_reader::{ODataCollectionItem, ODataCollectionReader, ODataCollectionReaderState};
use crate::error::{ODataReaderError, Result};
use crate::message::{MessageLine, ODataMessage, ODataPayloadKind};
use crate::message_reader::ODataMessageReader;
use crate::metadata::ReaderMetadata;
use crate::om::{
    ODataCollectionStart, ODataEntityReferenceLink, ODataEntityReferenceLinks, ODataError,
    ODataItem, ODataNestedResourceInfo, ODataPrimitiveValue, ODataProperty, ODataResource,
    ODataResourceSet, ODataServiceDocument, ODataValue,
};
use crate::parameter_reader::{ODataParameterReader, ODataParameterReaderState};
use crate::resource_reader::{ODataReaderState, ODataResourceReader};

#[derive(Debug, Clone, PartialEq)]
pub struct ReadResource {
    pub resource: ODataResource,
    pub nested: Vec<ReadNestedInfo>,
}

/// A navigation link and, in payload order, everything its content held.
///
/// An empty `expanded_items` list means the link was deferred.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadNestedInfo {
    pub info: ODataNestedResourceInfo,
    pub expanded_items: Vec<ExpandedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpandedItem {
    /// `None` for an expanded null.
    Resource(Option<ReadResource>),
    ResourceSet(ReadResourceSet),
    ReferenceLink(ODataEntityReferenceLink),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResourceSet {
    pub set: ODataResourceSet,
    pub resources: Vec<ReadResource>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadCollection {
    pub start: ODataCollectionStart,
    pub items: Vec<ODataValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadParameterValue {
    Value(ODataValue),
    Resource(Option<ReadResource>),
    ResourceSet(ReadResourceSet),
    Collection(ReadCollection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadParameter {
    pub name: String,
    pub value: ReadParameterValue,
}

/// One batch operation with its buffered body and, if the caller chose to
/// read it, the decoded payload or the error decoding produced.
#[derive(Debug)]
pub struct ReadOperation {
    pub line: MessageLine,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub payload: Option<ReadPayload>,
    pub error: Option<ODataReaderError>,
}

impl ReadOperation {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// A fresh message over the buffered body.
    pub fn message(&self) -> ODataBatchOperationMessage {
        ODataMessage::from_parts(self.line.clone(), self.headers.clone(), Cursor::new(self.body.clone()))
    }
}

/// An entry of a changeset.
#[derive(Debug)]
pub enum ReadChangesetItem {
    Operation(ReadOperation),
    /// A malformed part skipped inside the changeset.
    Failed(ODataReaderError),
}

impl ReadChangesetItem {
    pub fn operation(&self) -> Option<&ReadOperation> {
        match self {
            Self::Operation(op) => Some(op),
            Self::Failed(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ReadBatchPart {
    Operation(ReadOperation),
    Changeset(Vec<ReadChangesetItem>),
    /// A malformed top-level part skipped under failure isolation.
    Failed(ODataReaderError),
}

impl ReadBatchPart {
    /// The part's operations, skipping failed changeset entries.
    pub fn operations(&self) -> impl Iterator<Item = &ReadOperation> {
        let (single, items) = match self {
            Self::Operation(op) => (Some(op), Default::default()),
            Self::Changeset(items) => (None, items.as_slice()),
            Self::Failed(_) => (None, Default::default()),
        };
        single
            .into_iter()
            .chain(items.iter().filter_map(ReadChangesetItem::operation))
    }
}

#[derive(Debug)]
pub struct ReadBatch {
    pub is_response: bool,
    pub parts: Vec<ReadBatchPart>,
}

impl ReadBatch {
    pub fn operations(&self) -> impl Iterator<Item = &ReadOperation> {
        self.parts.iter().flat_map(ReadBatchPart::operations)
    }
}

/// Any payload read to completion.
#[derive(Debug)]
pub enum ReadPayload {
    Resource(ReadResource),
    ResourceSet(ReadResourceSet),
    Property(ODataProperty),
    Collection(ReadCollection),
    Value(ODataPrimitiveValue),
    EntityReferenceLink(ODataEntityReferenceLink),
    EntityReferenceLinks(ODataEntityReferenceLinks),
    ServiceDocument(ODataServiceDocument),
    Error(ODataError),
    Parameters(Vec<ReadParameter>),
    Batch(ReadBatch),
}

// ── Resource readers ──────────────────────────────────────────────────────

fn advance(reader: &mut ODataResourceReader) -> Result<ODataReaderState> {
    if !reader.read()? {
        return Err(ODataReaderError::protocol("the payload ended unexpectedly"));
    }
    Ok(reader.state())
}

fn unexpected(state: ODataReaderState) -> ODataReaderError {
    ODataReaderError::Usage(format!("unexpected reader state '{state}'"))
}

fn finish(reader: &mut ODataResourceReader) -> Result<()> {
    if reader.read()? {
        return Err(unexpected(reader.state()));
    }
    Ok(())
}

/// Reads a top-level resource to `Completed`.
pub fn read_resource(reader: &mut ODataResourceReader) -> Result<ReadResource> {
    let resource = match advance(reader)? {
        ODataReaderState::ResourceStart => resource_after_start(reader)?,
        other => return Err(unexpected(other)),
    };
    finish(reader)?;
    resource.ok_or_else(|| ODataReaderError::protocol("a top-level resource cannot be null"))
}

/// Reads a top-level resource set to `Completed`.
pub fn read_resource_set(reader: &mut ODataResourceReader) -> Result<ReadResourceSet> {
    let set = match advance(reader)? {
        ODataReaderState::ResourceSetStart => set_after_start(reader)?,
        other => return Err(unexpected(other)),
    };
    finish(reader)?;
    Ok(set)
}

fn resource_after_start(reader: &mut ODataResourceReader) -> Result<Option<ReadResource>> {
    let resource = reader.item().and_then(ODataItem::as_resource).cloned();
    let mut nested = Vec::new();
    loop {
        match advance(reader)? {
            ODataReaderState::NestedResourceInfoStart => nested.push(nested_after_start(reader)?),
            ODataReaderState::ResourceEnd => break,
            other => return Err(unexpected(other)),
        }
    }
    Ok(resource.map(|resource| ReadResource { resource, nested }))
}

fn nested_after_start(reader: &mut ODataResourceReader) -> Result<ReadNestedInfo> {
    let info = reader
        .item()
        .and_then(ODataItem::as_nested_resource_info)
        .cloned()
        .unwrap_or_default();
    let mut expanded_items = Vec::new();
    loop {
        match advance(reader)? {
            ODataReaderState::EntityReferenceLink => {
                if let Some(link) = reader.item().and_then(ODataItem::as_entity_reference_link) {
                    expanded_items.push(ExpandedItem::ReferenceLink(link.clone()));
                }
            }
            ODataReaderState::ResourceStart => {
                expanded_items.push(ExpandedItem::Resource(resource_after_start(reader)?))
            }
            ODataReaderState::ResourceSetStart => {
                expanded_items.push(ExpandedItem::ResourceSet(set_after_start(reader)?))
            }
            ODataReaderState::NestedResourceInfoEnd => break,
            other => return Err(unexpected(other)),
        }
    }
    Ok(ReadNestedInfo {
        info,
        expanded_items,
    })
}

fn set_after_start(reader: &mut ODataResourceReader) -> Result<ReadResourceSet> {
    let set = reader
        .item()
        .and_then(ODataItem::as_resource_set)
        .cloned()
        .unwrap_or_default();
    let mut resources = Vec::new();
    loop {
        match advance(reader)? {
            ODataReaderState::ResourceStart => match resource_after_start(reader)? {
                Some(resource) => resources.push(resource),
                None => {
                    return Err(ODataReaderError::protocol(
                        "a resource set cannot contain null resources",
                    ))
                }
            },
            ODataReaderState::ResourceSetEnd => break,
            other => return Err(unexpected(other)),
        }
    }
    Ok(ReadResourceSet { set, resources })
}

// ── Collection and parameter readers ──────────────────────────────────────

pub fn read_collection(reader: &mut ODataCollectionReader) -> Result<ReadCollection> {
    let mut collection = ReadCollection::default();
    while reader.read()? {
        match (reader.state(), reader.item()) {
            (ODataCollectionReaderState::CollectionStart, Some(ODataCollectionItem::Start(start))) => {
                collection.start = start.clone();
            }
            (ODataCollectionReaderState::Value, Some(ODataCollectionItem::Value(value))) => {
                collection.items.push(value.clone());
            }
            _ => {}
        }
    }
    Ok(collection)
}

pub fn read_parameters(reader: &mut ODataParameterReader) -> Result<Vec<ReadParameter>> {
    let mut parameters = Vec::new();
    while reader.read()? {
        let name = reader.name().unwrap_or_default().to_string();
        let value = match reader.state() {
            ODataParameterReaderState::Value => {
                ReadParameterValue::Value(reader.value().cloned().unwrap_or(ODataValue::Null))
            }
            ODataParameterReaderState::Resource => {
                let mut nested = reader.create_resource_reader()?;
                let resource = match advance(&mut nested)? {
                    ODataReaderState::ResourceStart => resource_after_start(&mut nested)?,
                    other => return Err(unexpected(other)),
                };
                finish(&mut nested)?;
                ReadParameterValue::Resource(resource)
            }
            ODataParameterReaderState::ResourceSet => {
                let mut nested = reader.create_resource_set_reader()?;
                ReadParameterValue::ResourceSet(read_resource_set(&mut nested)?)
            }
            ODataParameterReaderState::Collection => {
                let mut nested = reader.create_collection_reader()?;
                ReadParameterValue::Collection(read_collection(&mut nested)?)
            }
            other => {
                return Err(ODataReaderError::Usage(format!(
                    "unexpected parameter reader state '{other}'"
                )))
            }
        };
        parameters.push(ReadParameter { name, value });
    }
    Ok(parameters)
}

// ── Batch ─────────────────────────────────────────────────────────────────

/// Reads every part of a batch.
///
/// `read_body` decides how (and whether) to decode each operation body. Its
/// errors are stored on the operation and never stop the batch. Malformed
/// parts skipped by the batch reader are recorded where they occurred: as
/// [`ReadChangesetItem::Failed`] inside an open changeset, otherwise as
/// [`ReadBatchPart::Failed`].
pub fn read_batch<F>(reader: &mut ODataBatchReader, mut read_body: F) -> Result<ReadBatch>
where
    F: FnMut(ODataBatchOperationMessage) -> Result<Option<ReadPayload>>,
{
    let mut batch = ReadBatch {
        is_response: reader.is_response(),
        parts: Vec::new(),
    };
    let mut changeset: Option<Vec<ReadChangesetItem>> = None;
    loop {
        match reader.read() {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) if !reader.state().is_terminal() => {
                debug!(error = %err, in_changeset = changeset.is_some(), "batch part failed");
                match changeset.as_mut() {
                    Some(items) => items.push(ReadChangesetItem::Failed(err)),
                    None => batch.parts.push(ReadBatchPart::Failed(err)),
                }
                continue;
            }
            Err(err) => return Err(err),
        }
        match reader.state() {
            ODataBatchReaderState::ChangesetStart => changeset = Some(Vec::new()),
            ODataBatchReaderState::ChangesetEnd => {
                batch
                    .parts
                    .push(ReadBatchPart::Changeset(changeset.take().unwrap_or_default()));
            }
            ODataBatchReaderState::Operation => {
                let operation = read_operation(reader.create_operation_message()?, &mut read_body)?;
                match changeset.as_mut() {
                    Some(items) => items.push(ReadChangesetItem::Operation(operation)),
                    None => batch.parts.push(ReadBatchPart::Operation(operation)),
                }
            }
            _ => {}
        }
    }
    Ok(batch)
}

fn read_operation<F>(message: ODataBatchOperationMessage, read_body: &mut F) -> Result<ReadOperation>
where
    F: FnMut(ODataBatchOperationMessage) -> Result<Option<ReadPayload>>,
{
    let (line, headers, mut stream) = message.into_parts();
    let mut body = Vec::new();
    stream.read_to_end(&mut body)?;
    let mut operation = ReadOperation {
        line,
        headers,
        body,
        payload: None,
        error: None,
    };
    match read_body(operation.message()) {
        Ok(payload) => operation.payload = payload,
        Err(err) => {
            debug!(error = %err, "batch operation body failed to read");
            operation.error = Some(err);
        }
    }
    Ok(operation)
}

// ── Any payload ───────────────────────────────────────────────────────────

/// Runs `message_reader` for `kind` and drains the result.
///
/// Batch operation bodies are buffered but not decoded; use
/// [`read_batch`] directly to decode them.
pub fn read_payload<S: Read>(
    message_reader: &mut ODataMessageReader<S>,
    kind: ODataPayloadKind,
    metadata: ReaderMetadata,
) -> Result<ReadPayload> {
    let expected_kind = metadata.expected_type.as_ref().and_then(|t| t.as_primitive());
    Ok(match kind {
        ODataPayloadKind::Resource => {
            let mut reader = message_reader.create_resource_reader(metadata)?;
            ReadPayload::Resource(read_resource(&mut reader)?)
        }
        ODataPayloadKind::ResourceSet => {
            let mut reader = message_reader.create_resource_set_reader(metadata)?;
            ReadPayload::ResourceSet(read_resource_set(&mut reader)?)
        }
        ODataPayloadKind::Property => ReadPayload::Property(message_reader.read_property(metadata)?),
        ODataPayloadKind::Collection => {
            let mut reader = message_reader.create_collection_reader(metadata)?;
            ReadPayload::Collection(read_collection(&mut reader)?)
        }
        ODataPayloadKind::Value | ODataPayloadKind::BinaryValue => {
            ReadPayload::Value(message_reader.read_value(expected_kind)?)
        }
        ODataPayloadKind::EntityReferenceLink => {
            ReadPayload::EntityReferenceLink(message_reader.read_entity_reference_link()?)
        }
        ODataPayloadKind::EntityReferenceLinks => {
            ReadPayload::EntityReferenceLinks(message_reader.read_entity_reference_links()?)
        }
        ODataPayloadKind::ServiceDocument => {
            ReadPayload::ServiceDocument(message_reader.read_service_document()?)
        }
        ODataPayloadKind::Error => ReadPayload::Error(message_reader.read_error()?),
        ODataPayloadKind::Parameter => {
            let mut reader = message_reader.create_parameter_reader(metadata)?;
            ReadPayload::Parameters(read_parameters(&mut reader)?)
        }
        ODataPayloadKind::Batch => {
            let mut reader = message_reader.create_batch_reader()?;
            ReadPayload::Batch(read_batch(&mut reader, |_| Ok(None))?)
        }
    })
}
