//! Request/response messages and content-type handling.

use std::fmt;
use std::io::Read;

use crate::error::{ODataReaderError, Result};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ID: &str = "Content-ID";

/// Kind of payload a message body can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataPayloadKind {
    ResourceSet,
    Resource,
    Property,
    Collection,
    Value,
    BinaryValue,
    EntityReferenceLink,
    EntityReferenceLinks,
    ServiceDocument,
    Error,
    Parameter,
    Batch,
}

impl ODataPayloadKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ResourceSet => "resource set",
            Self::Resource => "resource",
            Self::Property => "property",
            Self::Collection => "collection",
            Self::Value => "value",
            Self::BinaryValue => "binary value",
            Self::EntityReferenceLink => "entity reference link",
            Self::EntityReferenceLinks => "entity reference links",
            Self::ServiceDocument => "service document",
            Self::Error => "error",
            Self::Parameter => "parameter",
            Self::Batch => "batch",
        }
    }

    /// Payload kinds a JSON body can carry. Parameters only travel in requests;
    /// errors and service documents only in responses.
    fn json_kinds(is_response: bool) -> Vec<Self> {
        let mut kinds = vec![
            Self::ResourceSet,
            Self::Resource,
            Self::Property,
            Self::Collection,
            Self::EntityReferenceLink,
            Self::EntityReferenceLinks,
        ];
        if is_response {
            kinds.push(Self::ServiceDocument);
            kinds.push(Self::Error);
        } else {
            kinds.push(Self::Parameter);
        }
        kinds
    }
}

impl fmt::Display for ODataPayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed `type/subtype; name=value` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
}

impl MediaType {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ODataReaderError::argument("content_type", format!("invalid media type '{value}'"));
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (type_, subtype) = essence.split_once('/').ok_or_else(invalid)?;
        if type_.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(invalid());
        }
        let mut parameters = Vec::new();
        for parameter in parts {
            let parameter = parameter.trim();
            if parameter.is_empty() {
                continue;
            }
            let (name, val) = parameter.split_once('=').ok_or_else(invalid)?;
            parameters.push((
                name.trim().to_ascii_lowercase(),
                val.trim().trim_matches('"').to_string(),
            ));
        }
        Ok(Self {
            type_: type_.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
            parameters,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, type_: &str, subtype: &str) -> bool {
        self.type_ == type_ && self.subtype == subtype
    }

    /// `IEEE754Compatible=true`: 64-bit integers and decimals travel as strings.
    pub fn is_ieee754_compatible(&self) -> bool {
        self.parameter("IEEE754Compatible")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Payload kinds this media type can carry.
    pub fn payload_kinds(&self, is_response: bool) -> Vec<ODataPayloadKind> {
        match (self.type_.as_str(), self.subtype.as_str()) {
            ("application", "json") => {
                if let Some(streaming) = self.parameter("odata.streaming") {
                    if !streaming.eq_ignore_ascii_case("true")
                        && !streaming.eq_ignore_ascii_case("false")
                    {
                        return Vec::new();
                    }
                }
                ODataPayloadKind::json_kinds(is_response)
            }
            ("text", "plain") => vec![ODataPayloadKind::Value],
            ("application", "octet-stream") => vec![ODataPayloadKind::BinaryValue],
            ("multipart", "mixed") => vec![ODataPayloadKind::Batch],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

/// Request line or status line of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLine {
    Request { method: String, url: String },
    Response { status: u16 },
}

/// A request or response with headers and an exclusively owned body stream.
#[derive(Debug)]
pub struct ODataMessage<S> {
    line: MessageLine,
    headers: Vec<(String, String)>,
    stream: S,
}

impl<S: Read> ODataMessage<S> {
    pub fn request(method: impl Into<String>, url: impl Into<String>, stream: S) -> Self {
        Self {
            line: MessageLine::Request {
                method: method.into(),
                url: url.into(),
            },
            headers: Vec::new(),
            stream,
        }
    }

    pub fn response(status: u16, stream: S) -> Self {
        Self {
            line: MessageLine::Response { status },
            headers: Vec::new(),
            stream,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_content_type(self, value: impl Into<String>) -> Self {
        self.with_header(CONTENT_TYPE, value)
    }

    /// Replaces any header of the same (case-insensitive) name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }
}

impl<S> ODataMessage<S> {
    pub(crate) fn from_parts(line: MessageLine, headers: Vec<(String, String)>, stream: S) -> Self {
        Self {
            line,
            headers,
            stream,
        }
    }

    pub fn line(&self) -> &MessageLine {
        &self.line
    }

    pub fn is_response(&self) -> bool {
        matches!(self.line, MessageLine::Response { .. })
    }

    pub fn method(&self) -> Option<&str> {
        match &self.line {
            MessageLine::Request { method, .. } => Some(method),
            MessageLine::Response { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.line {
            MessageLine::Request { url, .. } => Some(url),
            MessageLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.line {
            MessageLine::Response { status } => Some(status),
            MessageLine::Request { .. } => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    pub fn content_id(&self) -> Option<&str> {
        self.header(CONTENT_ID)
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    pub(crate) fn into_parts(self) -> (MessageLine, Vec<(String, String)>, S) {
        (self.line, self.headers, self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parameters() {
        let media = MediaType::parse("Application/JSON; odata.metadata=minimal; charset=\"utf-8\"").unwrap();
        assert!(media.is("application", "json"));
        assert_eq!(media.parameter("charset"), Some("utf-8"));
        assert_eq!(media.parameter("ODATA.METADATA"), Some("minimal"));
        assert!(!media.is_ieee754_compatible());
        assert!(MediaType::parse("application/json;IEEE754Compatible=TRUE")
            .unwrap()
            .is_ieee754_compatible());
        assert!(MediaType::parse("json").is_err());
    }

    #[test]
    fn payload_kinds_depend_on_direction() {
        let json = MediaType::parse("application/json").unwrap();
        assert!(json.payload_kinds(false).contains(&ODataPayloadKind::Parameter));
        assert!(!json.payload_kinds(false).contains(&ODataPayloadKind::Error));
        assert!(json.payload_kinds(true).contains(&ODataPayloadKind::Error));
        let batch = MediaType::parse("multipart/mixed; boundary=b").unwrap();
        assert_eq!(batch.payload_kinds(true), vec![ODataPayloadKind::Batch]);
        assert!(MediaType::parse("image/png").unwrap().payload_kinds(true).is_empty());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let message = ODataMessage::request("POST", "http://host/Orders", std::io::empty())
            .with_header("content-type", "application/json")
            .with_header("Content-Type", "text/plain");
        assert_eq!(message.content_type(), Some("text/plain"));
        assert_eq!(message.headers().len(), 1);
        assert_eq!(message.method(), Some("POST"));
        assert_eq!(message.status(), None);
    }
}
