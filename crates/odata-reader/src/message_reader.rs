//! Entry point: one message, one payload, one reader.

use std::io::Read;
use std::sync::Arc;

use odata_edm::{EdmModel, EdmPrimitiveKind, EdmType};
use tracing::{debug, trace};

use crate::batch::ODataBatchReader;
use crate::collection_reader::{CollectionSource, ODataCollectionReader};
use crate::deserializer::{read_error_document, ReaderContext};
use crate::error::{ODataReaderError, Result};
use crate::json::JsonValue;
use crate::message::{MediaType, ODataMessage, ODataPayloadKind};
use crate::metadata::ReaderMetadata;
use crate::om::{
    ODataEntityReferenceLink, ODataEntityReferenceLinks, ODataError, ODataPrimitiveValue,
    ODataProperty, ODataServiceDocument,
};
use crate::parameter_reader::ODataParameterReader;
use crate::primitive::parse_raw_value;
use crate::resource_reader::{ODataResourceReader, ResourceSource};
use crate::settings::ODataReaderSettings;

/// Reads the body of one [`ODataMessage`].
///
/// Exactly one `create_*`/`read_*` call is allowed per message reader. The
/// message stream stays owned by the reader until it is disposed or turned
/// back into the stream with [`ODataMessageReader::into_stream`].
#[derive(Debug)]
pub struct ODataMessageReader<S> {
    message: Option<ODataMessage<S>>,
    context: ReaderContext,
    used: bool,
    disposed: bool,
}

impl<S: Read> ODataMessageReader<S> {
    pub fn new(
        message: ODataMessage<S>,
        settings: ODataReaderSettings,
        model: Option<Arc<EdmModel>>,
    ) -> Self {
        let is_response = message.is_response();
        Self {
            message: Some(message),
            context: ReaderContext::new(model, settings, is_response),
            used: false,
            disposed: false,
        }
    }

    pub fn settings(&self) -> &ODataReaderSettings {
        &self.context.settings
    }

    pub fn model(&self) -> Option<&EdmModel> {
        self.context.model.as_deref()
    }

    pub fn is_response(&self) -> bool {
        self.context.is_response
    }

    /// Payload kinds the message's content type allows, without reading.
    pub fn detect_payload_kinds(&self) -> Result<Vec<ODataPayloadKind>> {
        if self.disposed {
            return Err(ODataReaderError::Disposed);
        }
        let media = self.media_type()?;
        Ok(media.payload_kinds(self.context.is_response))
    }

    pub fn create_resource_reader(&mut self, metadata: ReaderMetadata) -> Result<ODataResourceReader> {
        let metadata = metadata.resolve(self.context.model.as_deref())?;
        let expected = expected_entity(&metadata, false)?;
        let (bytes, _) = self.payload(ODataPayloadKind::Resource)?;
        Ok(ODataResourceReader::new(
            self.context.clone(),
            ResourceSource::Payload { bytes, is_set: false },
            expected,
        ))
    }

    pub fn create_resource_set_reader(
        &mut self,
        metadata: ReaderMetadata,
    ) -> Result<ODataResourceReader> {
        let metadata = metadata.resolve(self.context.model.as_deref())?;
        let expected = expected_entity(&metadata, true)?;
        let (bytes, _) = self.payload(ODataPayloadKind::ResourceSet)?;
        Ok(ODataResourceReader::new(
            self.context.clone(),
            ResourceSource::Payload { bytes, is_set: true },
            expected,
        ))
    }

    pub fn create_collection_reader(
        &mut self,
        metadata: ReaderMetadata,
    ) -> Result<ODataCollectionReader> {
        let metadata = metadata.resolve(self.context.model.as_deref())?;
        let name = metadata
            .structural_property
            .as_ref()
            .map(|(_, name)| name.clone())
            .or_else(|| metadata.operation_import.clone());
        let (bytes, _) = self.payload(ODataPayloadKind::Collection)?;
        Ok(ODataCollectionReader::new(
            self.context.clone(),
            CollectionSource::Payload(bytes),
            name,
            metadata.expected_type,
        ))
    }

    pub fn create_parameter_reader(
        &mut self,
        metadata: ReaderMetadata,
    ) -> Result<ODataParameterReader> {
        let metadata = metadata.resolve(self.context.model.as_deref())?;
        let operation = match (self.context.model.as_deref(), metadata.operation_import.as_deref()) {
            (Some(model), Some(import)) => model.imported_operation(import).cloned(),
            _ => None,
        };
        let (bytes, _) = self.payload(ODataPayloadKind::Parameter)?;
        Ok(ODataParameterReader::new(self.context.clone(), bytes, operation))
    }

    pub fn create_batch_reader(&mut self) -> Result<ODataBatchReader> {
        let (bytes, media) = self.payload(ODataPayloadKind::Batch)?;
        ODataBatchReader::new(
            bytes,
            &media,
            self.context.settings.as_ref().clone(),
            self.context.is_response,
        )
    }

    /// Reads a top-level property. The property name comes from the
    /// metadata's structural property, or is `value`.
    pub fn read_property(&mut self, metadata: ReaderMetadata) -> Result<ODataProperty> {
        let metadata = metadata.resolve(self.context.model.as_deref())?;
        let (bytes, _) = self.payload(ODataPayloadKind::Property)?;
        let json = JsonValue::parse(&bytes)?;
        let name = metadata
            .structural_property
            .as_ref()
            .map(|(_, name)| name.as_str())
            .unwrap_or("value");
        self.context
            .deserializer()
            .read_top_level_property(json, name, metadata.expected_type.as_ref())
    }

    /// Reads a raw `text/plain` value, or an `application/octet-stream` body
    /// as `Edm.Binary`.
    pub fn read_value(&mut self, expected: Option<EdmPrimitiveKind>) -> Result<ODataPrimitiveValue> {
        let media = self.media_type()?;
        if media.is("application", "octet-stream") {
            let (bytes, _) = self.payload(ODataPayloadKind::BinaryValue)?;
            return Ok(ODataPrimitiveValue::Binary(bytes));
        }
        let (bytes, _) = self.payload(ODataPayloadKind::Value)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ODataReaderError::protocol("a raw value must be valid UTF-8"))?;
        parse_raw_value(&text, expected)
    }

    pub fn read_error(&mut self) -> Result<ODataError> {
        let (bytes, _) = self.payload(ODataPayloadKind::Error)?;
        read_error_document(JsonValue::parse(&bytes)?)
    }

    pub fn read_entity_reference_link(&mut self) -> Result<ODataEntityReferenceLink> {
        let (bytes, _) = self.payload(ODataPayloadKind::EntityReferenceLink)?;
        self.context
            .deserializer()
            .read_entity_reference_link(JsonValue::parse(&bytes)?)
    }

    pub fn read_entity_reference_links(&mut self) -> Result<ODataEntityReferenceLinks> {
        let (bytes, _) = self.payload(ODataPayloadKind::EntityReferenceLinks)?;
        self.context
            .deserializer()
            .read_entity_reference_links(JsonValue::parse(&bytes)?)
    }

    pub fn read_service_document(&mut self) -> Result<ODataServiceDocument> {
        let (bytes, _) = self.payload(ODataPayloadKind::ServiceDocument)?;
        self.context
            .deserializer()
            .read_service_document(JsonValue::parse(&bytes)?)
    }

    /// Releases the reader. Drops (closes) the message stream only when
    /// stream disposal is enabled. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if self.context.settings.enable_message_stream_disposal {
            debug!("closing the message stream");
            self.message = None;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Gives the stream back, unless disposal already closed it.
    pub fn into_stream(self) -> Option<S> {
        self.message.map(ODataMessage::into_stream)
    }

    fn media_type(&self) -> Result<MediaType> {
        let message = self.message.as_ref().ok_or(ODataReaderError::Disposed)?;
        let content_type = message.content_type().ok_or_else(|| {
            ODataReaderError::argument("content_type", "the message has no Content-Type header")
        })?;
        MediaType::parse(content_type)
    }

    /// Validates the content type for `kind` and buffers the body, enforcing
    /// the message size quota.
    fn payload(&mut self, kind: ODataPayloadKind) -> Result<(Vec<u8>, MediaType)> {
        if self.disposed {
            return Err(ODataReaderError::Disposed);
        }
        if self.used {
            return Err(ODataReaderError::ReaderAlreadyCreated);
        }
        let media = self.media_type()?;
        if !media.payload_kinds(self.context.is_response).contains(&kind) {
            return Err(ODataReaderError::UnsupportedContentType {
                content_type: media.to_string(),
                payload_kind: kind.to_string(),
            });
        }
        self.used = true;
        self.context.ieee754_compatible = media.is_ieee754_compatible();
        let limit = self.context.settings.max_message_size;
        let message = self.message.as_mut().ok_or(ODataReaderError::Disposed)?;
        let mut bytes = Vec::new();
        message
            .stream_mut()
            .by_ref()
            .take(limit.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > limit {
            return Err(ODataReaderError::MessageSizeExceeded(limit));
        }
        trace!(payload_kind = %kind, len = bytes.len(), "buffered message body");
        Ok((bytes, media))
    }
}

fn expected_entity(metadata: &ReaderMetadata, is_set: bool) -> Result<Option<String>> {
    let Some(expected) = &metadata.expected_type else {
        return Ok(None);
    };
    let target = match (expected, is_set) {
        (EdmType::Collection(item), true) => item.as_ref(),
        (other, _) => other,
    };
    match target {
        EdmType::Entity(name) => Ok(Some(name.clone())),
        other => Err(ODataReaderError::argument(
            "expected_type",
            format!("'{}' is not an entity type", other.full_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    use super::*;
    use crate::error::ErrorKind;

    struct TrackedStream {
        inner: Cursor<Vec<u8>>,
        closed: Rc<Cell<bool>>,
    }

    impl Read for TrackedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedStream {
        fn drop(&mut self) {
            self.closed.set(true);
        }
    }

    fn tracked(body: &str) -> (ODataMessage<TrackedStream>, Rc<Cell<bool>>) {
        let closed = Rc::new(Cell::new(false));
        let stream = TrackedStream {
            inner: Cursor::new(body.as_bytes().to_vec()),
            closed: closed.clone(),
        };
        (
            ODataMessage::response(200, stream).with_content_type("application/json"),
            closed,
        )
    }

    #[test]
    fn dispose_closes_stream_once() {
        let (message, closed) = tracked("{}");
        let mut reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
        reader.dispose();
        assert!(closed.get());
        reader.dispose();
        assert!(reader.is_disposed());
        let err = reader.read_error().unwrap_err();
        assert!(matches!(err, ODataReaderError::Disposed));
        assert!(reader.into_stream().is_none());
    }

    #[test]
    fn dispose_keeps_stream_when_disposal_is_disabled() {
        let (message, closed) = tracked("{}");
        let settings = ODataReaderSettings {
            enable_message_stream_disposal: false,
            ..Default::default()
        };
        let mut reader = ODataMessageReader::new(message, settings, None);
        reader.dispose();
        reader.dispose();
        assert!(!closed.get());
        assert!(reader.into_stream().is_some());
    }

    #[test]
    fn second_read_is_a_usage_error() {
        let message = ODataMessage::response(200, Cursor::new(br#"{"value":[]}"#.to_vec()))
            .with_content_type("application/json");
        let mut reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
        reader.read_entity_reference_links().unwrap();
        let err = reader.read_entity_reference_links().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn content_type_must_match_payload_kind() {
        let message = ODataMessage::response(200, Cursor::new(b"42".to_vec()))
            .with_content_type("text/plain");
        let mut reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
        let err = reader.create_resource_reader(ReaderMetadata::new()).unwrap_err();
        assert!(matches!(err, ODataReaderError::UnsupportedContentType { .. }));
        assert_eq!(
            reader.read_value(Some(EdmPrimitiveKind::Int32)).unwrap(),
            ODataPrimitiveValue::Int32(42)
        );
    }

    #[test]
    fn size_quota_is_enforced() {
        let message = ODataMessage::response(200, Cursor::new(vec![b' '; 64]))
            .with_content_type("application/json");
        let settings = ODataReaderSettings {
            max_message_size: 16,
            ..Default::default()
        };
        let mut reader = ODataMessageReader::new(message, settings, None);
        assert!(matches!(
            reader.read_error(),
            Err(ODataReaderError::MessageSizeExceeded(16))
        ));
    }
}
