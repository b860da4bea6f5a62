//! odata-reader: a pull-style reader for OData JSON and batch payloads.
//!
//! An [`ODataMessageReader`] wraps one request or response message and hands
//! out exactly one reader (or one decoded value) for its body. The readers
//! are explicit state machines: each `read()` moves one step and the caller
//! inspects `state()` and `item()`.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use odata_reader::{
//!     ODataMessage, ODataMessageReader, ODataReaderSettings, ODataReaderState, ReaderMetadata,
//! };
//!
//! let body = br#"{"Id":1,"Orders@odata.navigationLink":"http://host/Customers(1)/Orders"}"#;
//! let message = ODataMessage::response(200, Cursor::new(body.to_vec()))
//!     .with_content_type("application/json");
//! let mut reader = ODataMessageReader::new(message, ODataReaderSettings::default(), None);
//! let mut resource = reader.create_resource_reader(ReaderMetadata::new()).unwrap();
//!
//! let mut states = Vec::new();
//! while resource.read().unwrap() {
//!     states.push(resource.state());
//! }
//! assert_eq!(
//!     states,
//!     [
//!         ODataReaderState::ResourceStart,
//!         ODataReaderState::NestedResourceInfoStart,
//!         ODataReaderState::NestedResourceInfoEnd,
//!         ODataReaderState::ResourceEnd,
//!     ]
//! );
//! assert_eq!(resource.state(), ODataReaderState::Completed);
//! ```

mod batch;
mod collection_reader;
mod deserializer;
mod error;
mod json;
mod message;
mod message_reader;
mod metadata;
mod om;
mod parameter_reader;
mod primitive;
mod resource_reader;
mod settings;

pub mod collect;

pub use batch::{ODataBatchOperationMessage, ODataBatchReader, ODataBatchReaderState};
pub use collection_reader::{ODataCollectionItem, ODataCollectionReader, ODataCollectionReaderState};
pub use error::{ErrorKind, ODataReaderError, Result};
pub use json::JsonValue;
pub use message::{MediaType, MessageLine, ODataMessage, ODataPayloadKind, CONTENT_ID, CONTENT_TYPE};
pub use message_reader::ODataMessageReader;
pub use metadata::ReaderMetadata;
pub use om::{
    ODataAssociationLink, ODataCollectionStart, ODataCollectionValue, ODataComplexValue,
    ODataEntityReferenceLink, ODataEntityReferenceLinks, ODataError, ODataErrorDetail,
    ODataInnerError, ODataItem, ODataNestedResourceInfo, ODataOperation, ODataPrimitiveValue,
    ODataProperty, ODataResource, ODataResourceMember, ODataResourceSet, ODataServiceDocument,
    ODataServiceDocumentElement, ODataStreamReferenceValue, ODataValue,
    ServiceDocumentElementKind,
};
pub use parameter_reader::{ODataParameterReader, ODataParameterReaderState};
pub use resource_reader::{ODataReaderState, ODataResourceReader};
pub use settings::ODataReaderSettings;
