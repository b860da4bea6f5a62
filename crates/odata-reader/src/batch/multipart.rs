//! Line-oriented cursor over a `multipart/mixed` body.

use crate::error::{ODataReaderError, Result};

/// What a boundary delimiter line announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delimiter {
    /// `--boundary`: another part follows.
    Part,
    /// `--boundary--`: the multipart body is closed.
    Close,
}

/// A byte cursor that reads CRLF- or LF-terminated lines.
#[derive(Debug)]
pub(crate) struct MultipartCursor {
    data: Vec<u8>,
    x: usize,
}

impl MultipartCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, x: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.x >= self.data.len()
    }

    /// Everything after the cursor.
    pub fn remaining(&self) -> Vec<u8> {
        self.data[self.x.min(self.data.len())..].to_vec()
    }

    /// Reads one line without its terminator; `None` at end of input.
    pub fn line(&mut self) -> Option<&[u8]> {
        if self.is_at_end() {
            return None;
        }
        let start = self.x;
        let rest = &self.data[start..];
        let (len, advance) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) if i > 0 && rest[i - 1] == b'\r' => (i - 1, i + 1),
            Some(i) => (i, i + 1),
            None => (rest.len(), rest.len()),
        };
        self.x += advance;
        Some(&self.data[start..start + len])
    }

    /// Reads a header block up to and including the empty line.
    pub fn headers(&mut self) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::new();
        loop {
            let line = self
                .line()
                .ok_or_else(|| ODataReaderError::Batch("unexpected end of input in headers".into()))?;
            if line.is_empty() {
                return Ok(headers);
            }
            let text = std::str::from_utf8(line)
                .map_err(|_| ODataReaderError::Batch("headers must be valid UTF-8".into()))?;
            let (name, value) = text.split_once(':').ok_or_else(|| {
                ODataReaderError::Batch(format!("malformed header line '{text}'"))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    /// Advances past the next delimiter line of `boundary` and returns the
    /// bytes that preceded it, minus the line break that belongs to the
    /// delimiter.
    pub fn until_delimiter(&mut self, boundary: &str) -> Result<(Vec<u8>, Delimiter)> {
        let start = self.x;
        loop {
            let line_start = self.x;
            let Some(line) = self.line() else {
                return Err(ODataReaderError::Batch(format!(
                    "missing closing delimiter for boundary '{boundary}'"
                )));
            };
            if let Some(delimiter) = classify(line, boundary) {
                let mut end = line_start;
                if end > start && self.data[end - 1] == b'\n' {
                    end -= 1;
                    if end > start && self.data[end - 1] == b'\r' {
                        end -= 1;
                    }
                }
                return Ok((self.data[start..end].to_vec(), delimiter));
            }
        }
    }
}

fn classify(line: &[u8], boundary: &str) -> Option<Delimiter> {
    let rest = line.strip_prefix(b"--")?.strip_prefix(boundary.as_bytes())?;
    let rest = trim_trailing_whitespace(rest);
    match rest {
        b"" => Some(Delimiter::Part),
        b"--" => Some(Delimiter::Close),
        _ => None,
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    &bytes[..end]
}
