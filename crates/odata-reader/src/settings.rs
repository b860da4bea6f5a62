//! Reader configuration.

use serde::Deserialize;
use url::Url;

use crate::error::{ODataReaderError, Result};

/// Options controlling a message reader and every reader created from it.
///
/// All fields have defaults, so partial TOML/JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ODataReaderSettings {
    /// Drop (close) the message stream when the message reader is disposed.
    pub enable_message_stream_disposal: bool,
    /// Accept repeated property names: the last value wins, positioned where
    /// the name first appeared.
    pub allow_duplicate_property_names: bool,
    /// Accept properties a non-open model type does not declare.
    pub allow_undeclared_properties: bool,
    /// Record the order in which items were observed on each resource.
    pub record_payload_order: bool,
    /// A malformed batch part fails only the `read()` that reached it; the
    /// batch reader stays usable and skips to the next part.
    pub batch_part_failure_isolation: bool,
    pub max_nesting_depth: usize,
    pub max_parts_per_batch: usize,
    pub max_operations_per_changeset: usize,
    pub max_message_size: u64,
    /// Base against which relative links in the payload are resolved.
    pub base_uri: Option<String>,
}

impl Default for ODataReaderSettings {
    fn default() -> Self {
        Self {
            enable_message_stream_disposal: true,
            allow_duplicate_property_names: false,
            allow_undeclared_properties: false,
            record_payload_order: false,
            batch_part_failure_isolation: true,
            max_nesting_depth: 100,
            max_parts_per_batch: 100,
            max_operations_per_changeset: 1000,
            max_message_size: 1024 * 1024,
            base_uri: None,
        }
    }
}

impl ODataReaderSettings {
    /// Parses settings from TOML. A configured `base_uri` must be an absolute URL.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)
            .map_err(|err| ODataReaderError::argument("settings", err.to_string()))?;
        if let Some(base) = settings.base_uri.as_deref() {
            service_root(base)?;
        }
        Ok(settings)
    }

    /// Resolves `link` against [`Self::base_uri`] following RFC 3986.
    ///
    /// The base is treated as a service root, so a missing trailing `/` is
    /// added before joining. Absolute links come back normalized.
    pub fn resolve_link(&self, link: &str) -> Result<String> {
        let Some(base) = self.base_uri.as_deref() else {
            return Ok(link.to_string());
        };
        service_root(base)?
            .join(link)
            .map(String::from)
            .map_err(|source| ODataReaderError::InvalidLink {
                link: link.to_string(),
                source,
            })
    }
}

fn service_root(base: &str) -> Result<Url> {
    let mut url =
        Url::parse(base).map_err(|err| ODataReaderError::argument("base_uri", err.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
