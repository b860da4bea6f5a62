//! Reader error type.

use thiserror::Error;

use crate::om::ODataError;

/// Coarse classification of a [`ODataReaderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed wire content or a disallowed structure.
    Protocol,
    /// A value does not match its expected type, or a type name does not resolve.
    SchemaMismatch,
    /// The API was driven incorrectly; reader state is left untouched.
    Usage,
    /// Invalid input handed to a constructor or a `create_*` call.
    Argument,
    /// The payload itself is an OData error document.
    InStreamError,
    Io,
}

#[derive(Debug, Error)]
pub enum ODataReaderError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error while reading the message stream: {0}")]
    Io(#[from] std::io::Error),

    // ── Protocol violations ───────────────────────────────────────────────
    #[error("each navigation link may contain at most one item in its content")]
    MultipleItemsInNavigationLinkContent,
    #[error("nested collections are not supported: '{type_name}'")]
    NestedCollection { type_name: String },
    #[error(
        "Multiple properties with the name '{name}' were detected in an entry or a complex value. \
         In OData, duplicate property names are not allowed."
    )]
    DuplicateProperty { name: String },
    #[error("the annotation '{annotation}' was found more than once for '{target}'")]
    DuplicateAnnotation { target: String, annotation: String },
    #[error("the annotation '{annotation}' for property '{property}' must precede the property value")]
    AnnotationAfterProperty { property: String, annotation: String },
    #[error("the annotation '{annotation}' was found for property '{property}' which has no value")]
    OrphanPropertyAnnotation { property: String, annotation: String },
    #[error("Content-ID '{0}' was found more than once in the same changeset")]
    DuplicateContentId(String),
    #[error("the message size exceeds the configured maximum of {0} bytes")]
    MessageSizeExceeded(u64),
    #[error("the payload nesting depth exceeds the configured maximum of {0}")]
    NestingDepthExceeded(usize),
    #[error("invalid batch payload: {0}")]
    Batch(String),
    #[error("the link '{link}' cannot be resolved: {source}")]
    InvalidLink {
        link: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0}")]
    Protocol(String),

    // ── Schema mismatches ─────────────────────────────────────────────────
    #[error("Cannot convert the literal '{literal}' to the expected type '{expected}'.")]
    SchemaMismatch { literal: String, expected: String },
    #[error("the type '{0}' could not be resolved against the model")]
    UnresolvedType(String),
    #[error("the type '{actual}' is not compatible with the expected type '{expected}'")]
    IncompatibleType { actual: String, expected: String },
    #[error("the property '{property}' is not declared on the non-open type '{type_name}'")]
    UndeclaredProperty { type_name: String, property: String },

    // ── Usage errors ──────────────────────────────────────────────────────
    #[error("Read() called on a reader in state '{state}'")]
    ReadInTerminalState { state: String },
    #[error("the nested {0} reader must be created and read to completion before the parent reader advances")]
    NestedReaderNotDrained(&'static str),
    #[error("the message reader has been disposed")]
    Disposed,
    #[error("a reader or read method was already invoked on this message reader")]
    ReaderAlreadyCreated,
    #[error("{0}")]
    Usage(String),

    // ── Argument errors ───────────────────────────────────────────────────
    #[error("invalid argument '{name}': {reason}")]
    Argument { name: &'static str, reason: String },
    #[error("the content type '{content_type}' is not supported for {payload_kind} payloads")]
    UnsupportedContentType {
        content_type: String,
        payload_kind: String,
    },

    #[error("the payload is an OData error: {}", .0.message.as_deref().unwrap_or(""))]
    InStream(Box<ODataError>),
}

impl ODataReaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Json(_)
            | Self::MultipleItemsInNavigationLinkContent
            | Self::NestedCollection { .. }
            | Self::DuplicateProperty { .. }
            | Self::DuplicateAnnotation { .. }
            | Self::AnnotationAfterProperty { .. }
            | Self::OrphanPropertyAnnotation { .. }
            | Self::DuplicateContentId(_)
            | Self::MessageSizeExceeded(_)
            | Self::NestingDepthExceeded(_)
            | Self::Batch(_)
            | Self::InvalidLink { .. }
            | Self::Protocol(_) => ErrorKind::Protocol,
            Self::SchemaMismatch { .. }
            | Self::UnresolvedType(_)
            | Self::IncompatibleType { .. }
            | Self::UndeclaredProperty { .. } => ErrorKind::SchemaMismatch,
            Self::ReadInTerminalState { .. }
            | Self::NestedReaderNotDrained(_)
            | Self::Disposed
            | Self::ReaderAlreadyCreated
            | Self::Usage(_) => ErrorKind::Usage,
            Self::Argument { .. } | Self::UnsupportedContentType { .. } => ErrorKind::Argument,
            Self::InStream(_) => ErrorKind::InStreamError,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn mismatch(literal: impl ToString, expected: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            literal: literal.to_string(),
            expected: expected.into(),
        }
    }

    pub(crate) fn argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Argument {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ODataReaderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            ODataReaderError::MultipleItemsInNavigationLinkContent.to_string(),
            "each navigation link may contain at most one item in its content"
        );
        assert_eq!(
            ODataReaderError::mismatch("abc", "Edm.Int32").to_string(),
            "Cannot convert the literal 'abc' to the expected type 'Edm.Int32'."
        );
    }

    #[test]
    fn kinds_classify_variants() {
        assert_eq!(ODataReaderError::Disposed.kind(), ErrorKind::Usage);
        assert_eq!(
            ODataReaderError::NestedCollection {
                type_name: "Collection(Collection(Edm.Int32))".into()
            }
            .kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            ODataReaderError::UnresolvedType("NS.X".into()).kind(),
            ErrorKind::SchemaMismatch
        );
    }
}
