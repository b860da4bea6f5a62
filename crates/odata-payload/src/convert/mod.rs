//! Conversion between the reader's object model and the payload tree.
//!
//! The two directions are independent; each is a small stateless converter
//! carrying only the request/response direction (and, from the object model,
//! an optional schema used to attach model-type annotations).

mod from_om;
mod to_om;

use std::io::Read;

use thiserror::Error;

use odata_reader::collect;
use odata_reader::{ODataMessageReader, ODataPayloadKind, ODataReaderError, ReaderMetadata};

use crate::element::{ElementType, PayloadElement};

pub use from_om::ObjectModelToPayloadElement;
pub use to_om::PayloadElementToObjectModel;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Reader(#[from] ODataReaderError),
    #[error("collection items must be all primitive or all complex values")]
    HeterogeneousCollection,
    #[error("{0} cannot be converted")]
    Unsupported(String),
    #[error("unexpected {found} in {context}")]
    UnexpectedElement {
        context: &'static str,
        found: ElementType,
    },
}

/// Reads one payload of `kind` and converts it into a tree.
///
/// The message reader's model and direction drive the conversion.
pub fn read_payload_element<S: Read>(
    message_reader: &mut ODataMessageReader<S>,
    kind: ODataPayloadKind,
    metadata: ReaderMetadata,
) -> Result<PayloadElement, ConvertError> {
    let payload = collect::read_payload(message_reader, kind, metadata)?;
    ObjectModelToPayloadElement::new(message_reader.model(), message_reader.is_response())
        .convert(&payload)
}
