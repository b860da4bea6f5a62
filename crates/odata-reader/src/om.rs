//! Object model produced by the readers.
//!
//! These are plain owned values. Structural relationships between items
//! (which resource a nested resource info belongs to, what a navigation link
//! expands to) are expressed by the reader's state sequence, not by the
//! types; see [`crate::collect`] for owned trees.

use std::fmt;

use odata_edm::EdmPrimitiveKind;

// ── Values ────────────────────────────────────────────────────────────────

/// A non-null primitive value tagged with its `Edm` kind.
///
/// Temporal, decimal and guid values keep their validated lexical form.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataPrimitiveValue {
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    Guid(String),
    Date(String),
    DateTimeOffset(String),
    TimeOfDay(String),
    Duration(String),
}

impl ODataPrimitiveValue {
    pub fn kind(&self) -> EdmPrimitiveKind {
        match self {
            Self::Boolean(_) => EdmPrimitiveKind::Boolean,
            Self::Byte(_) => EdmPrimitiveKind::Byte,
            Self::SByte(_) => EdmPrimitiveKind::SByte,
            Self::Int16(_) => EdmPrimitiveKind::Int16,
            Self::Int32(_) => EdmPrimitiveKind::Int32,
            Self::Int64(_) => EdmPrimitiveKind::Int64,
            Self::Single(_) => EdmPrimitiveKind::Single,
            Self::Double(_) => EdmPrimitiveKind::Double,
            Self::Decimal(_) => EdmPrimitiveKind::Decimal,
            Self::String(_) => EdmPrimitiveKind::String,
            Self::Binary(_) => EdmPrimitiveKind::Binary,
            Self::Guid(_) => EdmPrimitiveKind::Guid,
            Self::Date(_) => EdmPrimitiveKind::Date,
            Self::DateTimeOffset(_) => EdmPrimitiveKind::DateTimeOffset,
            Self::TimeOfDay(_) => EdmPrimitiveKind::TimeOfDay,
            Self::Duration(_) => EdmPrimitiveKind::Duration,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().full_name()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s)
            | Self::Decimal(s)
            | Self::Guid(s)
            | Self::Date(s)
            | Self::DateTimeOffset(s)
            | Self::TimeOfDay(s)
            | Self::Duration(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ODataPrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Single(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Binary(bytes) => {
                use base64::Engine as _;
                f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            other => f.write_str(other.as_str().unwrap_or_default()),
        }
    }
}

impl From<i32> for ODataPrimitiveValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for ODataPrimitiveValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<bool> for ODataPrimitiveValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for ODataPrimitiveValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for ODataPrimitiveValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ODataPrimitiveValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ODataValue {
    Null,
    Primitive(ODataPrimitiveValue),
    Complex(ODataComplexValue),
    Collection(ODataCollectionValue),
    StreamReference(ODataStreamReferenceValue),
}

impl ODataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_primitive(&self) -> Option<&ODataPrimitiveValue> {
        match self {
            Self::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

impl From<ODataPrimitiveValue> for ODataValue {
    fn from(v: ODataPrimitiveValue) -> Self {
        Self::Primitive(v)
    }
}

macro_rules! primitive_into_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ODataValue {
                fn from(v: $t) -> Self {
                    Self::Primitive(v.into())
                }
            }
        )*
    };
}

primitive_into_value!(i32, i64, bool, f64, &str, String);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ODataComplexValue {
    pub type_name: Option<String>,
    pub properties: Vec<ODataProperty>,
}

impl ODataComplexValue {
    pub fn property(&self, name: &str) -> Option<&ODataProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ODataCollectionValue {
    /// `Collection(<item type>)` when known.
    pub type_name: Option<String>,
    pub items: Vec<ODataValue>,
}

/// Metadata of a (named or default) media stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataStreamReferenceValue {
    pub read_link: Option<String>,
    pub edit_link: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl ODataStreamReferenceValue {
    pub fn is_empty(&self) -> bool {
        self.read_link.is_none()
            && self.edit_link.is_none()
            && self.content_type.is_none()
            && self.etag.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ODataProperty {
    pub name: String,
    pub value: ODataValue,
}

impl ODataProperty {
    pub fn new(name: impl Into<String>, value: impl Into<ODataValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ── Resources ─────────────────────────────────────────────────────────────

/// An advertised action or function on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataOperation {
    /// The `#Namespace.Name` key as it appeared in the payload.
    pub metadata: String,
    pub title: Option<String>,
    pub target: Option<String>,
}

/// A relationship URL reported without navigation content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataAssociationLink {
    pub name: String,
    pub url: String,
}

/// Kind of one resource member, as listed in [`ODataResource::member_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataResourceMember {
    Property,
    NestedResourceInfo,
    AssociationLink,
}

/// An entity instance.
///
/// Carries every structural property of the payload object; navigation
/// properties are reported separately as nested resource infos.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ODataResource {
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    pub etag: Option<String>,
    /// Present on media-link entries.
    pub media_resource: Option<ODataStreamReferenceValue>,
    pub properties: Vec<ODataProperty>,
    pub actions: Vec<ODataOperation>,
    pub functions: Vec<ODataOperation>,
    pub association_links: Vec<ODataAssociationLink>,
    /// Wire order of the members: one entry per structural property, nested
    /// resource info and association link. Nested infos are reported by the
    /// reader, not stored here. Empty when the order is unknown.
    pub member_order: Vec<ODataResourceMember>,
    /// Observation order of payload items, when recording is enabled.
    pub payload_order: Option<Vec<String>>,
}

impl ODataResource {
    pub fn property(&self, name: &str) -> Option<&ODataProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataResourceSet {
    pub count: Option<i64>,
    pub next_page_link: Option<String>,
    pub delta_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataNestedResourceInfo {
    pub name: String,
    /// The navigation link URL.
    pub url: Option<String>,
    pub association_link_url: Option<String>,
    /// `Some` when known from the model or from the content shape.
    pub is_collection: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataEntityReferenceLink {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataEntityReferenceLinks {
    pub links: Vec<ODataEntityReferenceLink>,
    pub count: Option<i64>,
    pub next_page_link: Option<String>,
}

/// Start of a top-level collection payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataCollectionStart {
    pub name: Option<String>,
    pub item_type_name: Option<String>,
    pub count: Option<i64>,
    pub next_page_link: Option<String>,
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataError {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
    pub details: Vec<ODataErrorDetail>,
    pub inner_error: Option<ODataInnerError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataInnerError {
    pub message: Option<String>,
    pub type_name: Option<String>,
    pub stack_trace: Option<String>,
    pub internal_error: Option<Box<ODataInnerError>>,
}

// ── Service document ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceDocumentElementKind {
    EntitySet,
    Singleton,
    FunctionImport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataServiceDocumentElement {
    pub kind: ServiceDocumentElementKind,
    pub name: String,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataServiceDocument {
    pub context_url: Option<String>,
    pub elements: Vec<ODataServiceDocumentElement>,
}

// ── Reader items ──────────────────────────────────────────────────────────

/// The item a resource reader is positioned on.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataItem {
    Resource(ODataResource),
    ResourceSet(ODataResourceSet),
    NestedResourceInfo(ODataNestedResourceInfo),
    EntityReferenceLink(ODataEntityReferenceLink),
}

impl ODataItem {
    pub fn as_resource(&self) -> Option<&ODataResource> {
        match self {
            Self::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_resource_set(&self) -> Option<&ODataResourceSet> {
        match self {
            Self::ResourceSet(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_nested_resource_info(&self) -> Option<&ODataNestedResourceInfo> {
        match self {
            Self::NestedResourceInfo(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_entity_reference_link(&self) -> Option<&ODataEntityReferenceLink> {
        match self {
            Self::EntityReferenceLink(l) => Some(l),
            _ => None,
        }
    }
}
