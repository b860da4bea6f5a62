//! Pull reader over a collection of primitive or complex values.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use odata_edm::EdmType;
use tracing::trace;

use crate::deserializer::{expect_object, scan_object, ReaderContext};
use crate::error::{ErrorKind, ODataReaderError, Result};
use crate::json::JsonValue;
use crate::om::{ODataCollectionStart, ODataValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataCollectionReaderState {
    Start,
    CollectionStart,
    Value,
    CollectionEnd,
    Exception,
    Completed,
}

impl ODataCollectionReaderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exception)
    }
}

impl fmt::Display for ODataCollectionReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ODataCollectionItem {
    Start(ODataCollectionStart),
    Value(ODataValue),
}

#[derive(Debug)]
pub(crate) enum CollectionSource {
    /// Top-level `{"value": [...]}` payload bytes.
    Payload(Vec<u8>),
    /// A bare array inside a parameter payload.
    Items(Vec<JsonValue>),
}

/// Reads `CollectionStart → Value* → CollectionEnd → Completed`.
#[derive(Debug)]
pub struct ODataCollectionReader {
    context: ReaderContext,
    source: Option<CollectionSource>,
    name: Option<String>,
    item_type: Option<EdmType>,
    state: ODataCollectionReaderState,
    item: Option<ODataCollectionItem>,
    start: Option<ODataCollectionStart>,
    items: std::vec::IntoIter<JsonValue>,
    complex_items: Option<bool>,
    drained: Option<Rc<Cell<bool>>>,
}

impl ODataCollectionReader {
    /// `expected` may be the collection type or its item type.
    pub(crate) fn new(
        context: ReaderContext,
        source: CollectionSource,
        name: Option<String>,
        expected: Option<EdmType>,
    ) -> Self {
        let item_type = match expected {
            Some(EdmType::Collection(item)) => Some(*item),
            other => other,
        };
        Self {
            context,
            source: Some(source),
            name,
            item_type,
            state: ODataCollectionReaderState::Start,
            item: None,
            start: None,
            items: Vec::new().into_iter(),
            complex_items: None,
            drained: None,
        }
    }

    pub(crate) fn with_drain_flag(mut self, flag: Rc<Cell<bool>>) -> Self {
        self.drained = Some(flag);
        self
    }

    pub fn state(&self) -> ODataCollectionReaderState {
        self.state
    }

    pub fn item(&self) -> Option<&ODataCollectionItem> {
        self.item.as_ref()
    }

    /// The current value, when positioned on [`ODataCollectionReaderState::Value`].
    pub fn value(&self) -> Option<&ODataValue> {
        match self.item.as_ref()? {
            ODataCollectionItem::Value(v) => Some(v),
            ODataCollectionItem::Start(_) => None,
        }
    }

    pub fn read(&mut self) -> Result<bool> {
        if self.state.is_terminal() {
            return Err(ODataReaderError::ReadInTerminalState {
                state: self.state.to_string(),
            });
        }
        match self.step() {
            Ok(advanced) => {
                trace!(state = %self.state, "collection reader advanced");
                if self.state.is_terminal() {
                    self.mark_drained();
                }
                Ok(advanced)
            }
            Err(err) if err.kind() == ErrorKind::Usage => Err(err),
            Err(err) => {
                self.state = ODataCollectionReaderState::Exception;
                self.item = None;
                self.mark_drained();
                Err(err)
            }
        }
    }

    fn mark_drained(&self) {
        if let Some(flag) = &self.drained {
            flag.set(true);
        }
    }

    fn step(&mut self) -> Result<bool> {
        match self.state {
            ODataCollectionReaderState::Start => self.begin(),
            ODataCollectionReaderState::CollectionStart | ODataCollectionReaderState::Value => {
                if let Some(ODataCollectionItem::Start(start)) = self.item.take() {
                    self.start = Some(start);
                }
                match self.items.next() {
                    Some(json) => {
                        self.check_homogeneous(&json)?;
                        let value = self
                            .context
                            .deserializer()
                            .read_collection_item(json, self.item_type.as_ref())?;
                        self.state = ODataCollectionReaderState::Value;
                        self.item = Some(ODataCollectionItem::Value(value));
                        Ok(true)
                    }
                    None => {
                        self.state = ODataCollectionReaderState::CollectionEnd;
                        self.item = self.start.take().map(ODataCollectionItem::Start);
                        Ok(true)
                    }
                }
            }
            ODataCollectionReaderState::CollectionEnd => {
                self.state = ODataCollectionReaderState::Completed;
                self.item = None;
                Ok(false)
            }
            ODataCollectionReaderState::Completed | ODataCollectionReaderState::Exception => {
                Err(ODataReaderError::ReadInTerminalState {
                    state: self.state.to_string(),
                })
            }
        }
    }

    fn begin(&mut self) -> Result<bool> {
        if let Some(item) = &self.item_type {
            if item.is_collection() {
                return Err(ODataReaderError::NestedCollection {
                    type_name: EdmType::collection(item.clone()).full_name(),
                });
            }
            if let EdmType::Entity(name) = item {
                return Err(ODataReaderError::protocol(format!(
                    "a collection of entity type '{name}' must be read with a resource set reader"
                )));
            }
        }
        let source = self
            .source
            .take()
            .ok_or_else(|| ODataReaderError::Usage("the reader has no payload".into()))?;
        let mut start = ODataCollectionStart {
            name: self.name.clone(),
            item_type_name: self.item_type.as_ref().map(EdmType::full_name),
            ..Default::default()
        };
        let items = match source {
            CollectionSource::Items(items) => items,
            CollectionSource::Payload(bytes) => {
                let json = JsonValue::parse(&bytes)?;
                let members = expect_object(json, "collection")?;
                let mut scanned = scan_object(members, &self.context.settings)?;
                if let Some(count) = scanned.take_instance_annotation("odata.count") {
                    start.count = Some(count.expect_i64("odata.count", self.context.ieee754_compatible)?);
                }
                if let Some(next) = scanned.take_instance_annotation("odata.nextLink") {
                    start.next_page_link = Some(
                        self.context
                            .settings
                            .resolve_link(next.expect_str("odata.nextLink")?)?,
                    );
                }
                if let Some(type_name) = scanned.take_instance_annotation("odata.type") {
                    let resolved = self.context.deserializer().resolve_type_annotation(
                        type_name.expect_str("odata.type")?,
                        self.item_type.clone().map(EdmType::collection).as_ref(),
                    )?;
                    match resolved {
                        EdmType::Collection(item) if item.is_collection() => {
                            return Err(ODataReaderError::NestedCollection {
                                type_name: EdmType::Collection(item).full_name(),
                            })
                        }
                        EdmType::Collection(item) => {
                            start.item_type_name = Some(item.full_name());
                            self.item_type = Some(*item);
                        }
                        other => {
                            return Err(ODataReaderError::IncompatibleType {
                                actual: other.full_name(),
                                expected: "Collection".to_string(),
                            })
                        }
                    }
                }
                let value = scanned
                    .take_property("value")
                    .and_then(|p| p.value)
                    .ok_or_else(|| {
                        ODataReaderError::protocol("a collection payload requires a 'value' property")
                    })?;
                if let Some(extra) = scanned.properties.first() {
                    return Err(ODataReaderError::protocol(format!(
                        "unexpected property '{}' in a collection payload",
                        extra.name
                    )));
                }
                match value {
                    JsonValue::Array(items) => items,
                    other => {
                        return Err(ODataReaderError::protocol(format!(
                            "the 'value' of a collection must be an array but found {}",
                            other.kind_name()
                        )))
                    }
                }
            }
        };
        self.items = items.into_iter();
        self.state = ODataCollectionReaderState::CollectionStart;
        self.item = Some(ODataCollectionItem::Start(start));
        Ok(true)
    }

    fn check_homogeneous(&mut self, json: &JsonValue) -> Result<()> {
        if json.is_null() {
            return Ok(());
        }
        let is_complex = matches!(json, JsonValue::Object(_));
        match self.complex_items {
            Some(previous) if previous != is_complex => Err(ODataReaderError::protocol(
                "collection items must all be primitive or all be complex",
            )),
            _ => {
                self.complex_items = Some(is_complex);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use odata_edm::EdmPrimitiveKind;

    use super::*;
    use crate::settings::ODataReaderSettings;

    fn reader(payload: &str, expected: Option<EdmType>) -> ODataCollectionReader {
        let context = ReaderContext::new(None, ODataReaderSettings::default(), true);
        ODataCollectionReader::new(
            context,
            CollectionSource::Payload(payload.as_bytes().to_vec()),
            None,
            expected,
        )
    }

    #[test]
    fn reads_values_in_order() {
        let mut r = reader(
            r#"{"@odata.count":2,"value":[1,2]}"#,
            Some(EdmType::collection(EdmPrimitiveKind::Int64.into())),
        );
        assert!(r.read().unwrap());
        match r.item() {
            Some(ODataCollectionItem::Start(start)) => {
                assert_eq!(start.count, Some(2));
                assert_eq!(start.item_type_name.as_deref(), Some("Edm.Int64"));
            }
            other => panic!("unexpected item {other:?}"),
        }
        assert!(r.read().unwrap());
        assert_eq!(r.value(), Some(&ODataValue::from(1_i64)));
        assert!(r.read().unwrap());
        assert!(r.read().unwrap());
        assert_eq!(r.state(), ODataCollectionReaderState::CollectionEnd);
        assert!(!r.read().unwrap());
        assert_eq!(r.state(), ODataCollectionReaderState::Completed);
    }

    #[test]
    fn mixed_items_are_rejected() {
        let mut r = reader(r#"{"value":[1,{"A":1}]}"#, None);
        r.read().unwrap();
        r.read().unwrap();
        assert!(r.read().is_err());
        assert_eq!(r.state(), ODataCollectionReaderState::Exception);
    }
}
