use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use super::multipart::{Delimiter, MultipartCursor};
use crate::error::{ODataReaderError, Result};
use crate::message::{MediaType, MessageLine, ODataMessage, CONTENT_ID, CONTENT_TYPE};
use crate::settings::ODataReaderSettings;

/// A batch operation's request or response, with its body buffered.
pub type ODataBatchOperationMessage = ODataMessage<Cursor<Vec<u8>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataBatchReaderState {
    Initial,
    Operation,
    ChangesetStart,
    ChangesetEnd,
    Exception,
    Completed,
}

impl ODataBatchReaderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exception)
    }
}

impl fmt::Display for ODataBatchReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn request_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(GET|POST|PUT|PATCH|MERGE|DELETE) (\S+) HTTP/1\.[01]$")
            .expect("static pattern compiles")
    })
}

fn status_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^HTTP/1\.[01] (\d{3})( .*)?$").expect("static pattern compiles")
    })
}

/// Where the cursor sits relative to the innermost boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Preamble,
    /// Just past a part delimiter; part headers follow.
    AtPart,
    /// Just past a close delimiter.
    AtClose,
}

/// Reads a `multipart/mixed` batch body one operation at a time.
///
/// A malformed part makes only the `read()` that reached it fail when
/// [`ODataReaderSettings::batch_part_failure_isolation`] is set: the cursor
/// has already moved past the part, so the next `read()` continues with the
/// following one. Errors inside an operation's body are never seen here; they
/// surface only when the caller reads the operation message.
#[derive(Debug)]
pub struct ODataBatchReader {
    settings: ODataReaderSettings,
    is_response: bool,
    cursor: MultipartCursor,
    boundaries: Vec<String>,
    position: Position,
    state: ODataBatchReaderState,
    operation: Option<ODataBatchOperationMessage>,
    content_ids: HashSet<String>,
    parts: usize,
    changeset_operations: usize,
}

impl ODataBatchReader {
    pub(crate) fn new(
        body: Vec<u8>,
        content_type: &MediaType,
        settings: ODataReaderSettings,
        is_response: bool,
    ) -> Result<Self> {
        let boundary = content_type.parameter("boundary").ok_or_else(|| {
            ODataReaderError::argument("content_type", "a batch content type requires a boundary")
        })?;
        validate_boundary(boundary)?;
        Ok(Self {
            settings,
            is_response,
            cursor: MultipartCursor::new(body),
            boundaries: vec![boundary.to_string()],
            position: Position::Preamble,
            state: ODataBatchReaderState::Initial,
            operation: None,
            content_ids: HashSet::new(),
            parts: 0,
            changeset_operations: 0,
        })
    }

    pub fn state(&self) -> ODataBatchReaderState {
        self.state
    }

    pub fn is_response(&self) -> bool {
        self.is_response
    }

    pub fn in_changeset(&self) -> bool {
        self.boundaries.len() > 1
    }

    /// The current operation, before it is taken.
    pub fn operation(&self) -> Option<&ODataBatchOperationMessage> {
        self.operation.as_ref()
    }

    /// Takes the current operation's message. Only valid once per operation.
    pub fn create_operation_message(&mut self) -> Result<ODataBatchOperationMessage> {
        if self.state != ODataBatchReaderState::Operation {
            return Err(ODataReaderError::Usage(format!(
                "an operation message cannot be created in batch reader state '{}'",
                self.state
            )));
        }
        self.operation.take().ok_or_else(|| {
            ODataReaderError::Usage("the operation message was already created".into())
        })
    }

    pub fn read(&mut self) -> Result<bool> {
        if self.state.is_terminal() {
            return Err(ODataReaderError::ReadInTerminalState {
                state: self.state.to_string(),
            });
        }
        self.operation = None;
        match self.step() {
            Ok(advanced) => {
                trace!(state = %self.state, "batch reader advanced");
                Ok(advanced)
            }
            Err(PartError::Part(err)) if self.settings.batch_part_failure_isolation => {
                debug!(error = %err, "skipping malformed batch part");
                Err(err)
            }
            Err(PartError::Part(err)) | Err(PartError::Fatal(err)) => {
                self.state = ODataBatchReaderState::Exception;
                Err(err)
            }
        }
    }

    fn step(&mut self) -> std::result::Result<bool, PartError> {
        if self.position == Position::Preamble {
            let boundary = self.boundaries[0].clone();
            let (_, delimiter) = self.cursor.until_delimiter(&boundary).map_err(PartError::Fatal)?;
            self.position = position_after(delimiter);
        }
        if self.position == Position::AtClose {
            if self.in_changeset() {
                self.boundaries.pop();
                self.content_ids.clear();
                self.changeset_operations = 0;
                self.advance_to_next_delimiter().map_err(PartError::Fatal)?;
                self.state = ODataBatchReaderState::ChangesetEnd;
                return Ok(true);
            }
            self.state = ODataBatchReaderState::Completed;
            return Ok(false);
        }
        self.count_part()?;
        let headers = match self.cursor.headers() {
            Ok(headers) => headers,
            Err(err) => return Err(self.skip_part(err)),
        };
        let content_type = header(&headers, CONTENT_TYPE)
            .map(MediaType::parse)
            .transpose()
            .map_err(|err| self.skip_part(err))?;
        match content_type {
            Some(media) if media.is("multipart", "mixed") => self.enter_changeset(&media),
            Some(media) if media.is("application", "http") => self.read_operation(&headers),
            other => {
                let found = other.map(|m| m.to_string()).unwrap_or_else(|| "none".into());
                Err(self.skip_part(ODataReaderError::Batch(format!(
                    "a batch part must have content type 'application/http' or 'multipart/mixed', found '{found}'"
                ))))
            }
        }
    }

    fn count_part(&mut self) -> std::result::Result<(), PartError> {
        if self.in_changeset() {
            self.changeset_operations += 1;
            if self.changeset_operations > self.settings.max_operations_per_changeset {
                return Err(PartError::Fatal(ODataReaderError::Batch(format!(
                    "the changeset contains more than {} operations",
                    self.settings.max_operations_per_changeset
                ))));
            }
        } else {
            self.parts += 1;
            if self.parts > self.settings.max_parts_per_batch {
                return Err(PartError::Fatal(ODataReaderError::Batch(format!(
                    "the batch contains more than {} parts",
                    self.settings.max_parts_per_batch
                ))));
            }
        }
        Ok(())
    }

    fn enter_changeset(&mut self, media: &MediaType) -> std::result::Result<bool, PartError> {
        if self.in_changeset() {
            return Err(self.skip_part(ODataReaderError::Batch(
                "changesets cannot be nested".into(),
            )));
        }
        let boundary = match media.parameter("boundary") {
            Some(b) => b.to_string(),
            None => {
                return Err(self.skip_part(ODataReaderError::Batch(
                    "a changeset content type requires a boundary".into(),
                )))
            }
        };
        if let Err(err) = validate_boundary(&boundary) {
            return Err(self.skip_part(err));
        }
        self.boundaries.push(boundary);
        self.content_ids.clear();
        self.changeset_operations = 0;
        self.advance_to_next_delimiter().map_err(PartError::Fatal)?;
        self.state = ODataBatchReaderState::ChangesetStart;
        Ok(true)
    }

    fn read_operation(&mut self, part_headers: &[(String, String)]) -> std::result::Result<bool, PartError> {
        let body = self.advance_to_next_delimiter().map_err(PartError::Fatal)?;
        let message = self.parse_operation(body, part_headers).map_err(PartError::Part)?;
        self.operation = Some(message);
        self.state = ODataBatchReaderState::Operation;
        Ok(true)
    }

    fn parse_operation(
        &mut self,
        body: Vec<u8>,
        part_headers: &[(String, String)],
    ) -> Result<ODataBatchOperationMessage> {
        let mut inner = MultipartCursor::new(body);
        let line = inner
            .line()
            .ok_or_else(|| ODataReaderError::Batch("an operation part is empty".into()))?;
        let line = std::str::from_utf8(line)
            .map_err(|_| ODataReaderError::Batch("the operation line must be valid UTF-8".into()))?
            .trim()
            .to_string();
        let line = if self.is_response {
            let captures = status_line_re().captures(&line).ok_or_else(|| {
                ODataReaderError::Batch(format!("invalid response status line '{line}'"))
            })?;
            let status = captures[1]
                .parse()
                .map_err(|_| ODataReaderError::Batch(format!("invalid status code in '{line}'")))?;
            MessageLine::Response { status }
        } else {
            let captures = request_line_re().captures(&line).ok_or_else(|| {
                ODataReaderError::Batch(format!("invalid request line '{line}'"))
            })?;
            let method = captures[1].to_string();
            if self.in_changeset() && method == "GET" {
                return Err(ODataReaderError::Batch(
                    "GET requests are not allowed inside a changeset".into(),
                ));
            }
            MessageLine::Request {
                method,
                url: self.settings.resolve_link(&captures[2])?,
            }
        };
        let mut headers = inner.headers()?;
        if header(&headers, CONTENT_ID).is_none() {
            if let Some(id) = header(part_headers, CONTENT_ID) {
                headers.push((CONTENT_ID.to_string(), id.to_string()));
            }
        }
        if self.in_changeset() {
            if let Some(id) = header(&headers, CONTENT_ID) {
                if !self.content_ids.insert(id.to_string()) {
                    return Err(ODataReaderError::DuplicateContentId(id.to_string()));
                }
            }
        }
        let rest = inner.remaining();
        Ok(ODataMessage::from_parts(line, headers, Cursor::new(rest)))
    }

    /// Moves the cursor past the rest of a malformed part.
    fn skip_part(&mut self, err: ODataReaderError) -> PartError {
        match self.advance_to_next_delimiter() {
            Ok(_) => PartError::Part(err),
            Err(fatal) => PartError::Fatal(fatal),
        }
    }

    fn advance_to_next_delimiter(&mut self) -> Result<Vec<u8>> {
        let boundary = self
            .boundaries
            .last()
            .cloned()
            .unwrap_or_default();
        let (body, delimiter) = self.cursor.until_delimiter(&boundary)?;
        self.position = position_after(delimiter);
        Ok(body)
    }
}

#[derive(Debug)]
enum PartError {
    /// Confined to one part; the cursor is already past it.
    Part(ODataReaderError),
    /// The multipart structure itself is broken.
    Fatal(ODataReaderError),
}

fn position_after(delimiter: Delimiter) -> Position {
    match delimiter {
        Delimiter::Part => Position::AtPart,
        Delimiter::Close => Position::AtClose,
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn validate_boundary(boundary: &str) -> Result<()> {
    if boundary.is_empty() || boundary.len() > 70 || boundary.ends_with(' ') {
        return Err(ODataReaderError::argument(
            "content_type",
            format!("invalid multipart boundary '{boundary}'"),
        ));
    }
    Ok(())
}
