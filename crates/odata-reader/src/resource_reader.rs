//! Pull reader over resources, resource sets and navigation links.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::deserializer::{NavContent, PendingNestedInfo, ReaderContext};
use crate::error::{ErrorKind, ODataReaderError, Result};
use crate::json::JsonValue;
use crate::om::{
    ODataItem, ODataNestedResourceInfo, ODataResource, ODataResourceSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataReaderState {
    Start,
    ResourceSetStart,
    ResourceSetEnd,
    ResourceStart,
    ResourceEnd,
    NestedResourceInfoStart,
    NestedResourceInfoEnd,
    EntityReferenceLink,
    Exception,
    Completed,
}

impl ODataReaderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exception)
    }
}

impl fmt::Display for ODataReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the reader gets its JSON from.
#[derive(Debug)]
pub(crate) enum ResourceSource {
    /// Top-level payload bytes, parsed on the first read.
    Payload { bytes: Vec<u8>, is_set: bool },
    /// A bare resource value inside a parameter payload.
    Resource(JsonValue),
    /// A bare array of resources inside a parameter payload.
    ResourceSet(Vec<JsonValue>),
}

#[derive(Debug)]
enum Scope {
    ResourceSet {
        set: Option<ODataResourceSet>,
        items: std::vec::IntoIter<JsonValue>,
        expected_type: Option<String>,
        depth: usize,
    },
    Resource {
        resource: Option<ODataResource>,
        nested: std::vec::IntoIter<PendingNestedInfo>,
        depth: usize,
    },
    NestedInfo {
        info: Option<ODataNestedResourceInfo>,
        content: std::vec::IntoIter<NavContent>,
        target_type: Option<String>,
        entered: usize,
        depth: usize,
    },
}

/// Reads a resource or a resource set one item at a time.
///
/// `read()` returns `Ok(true)` each time it moves to a new item and
/// `Ok(false)` when it reaches [`ODataReaderState::Completed`]. Once the
/// reader is `Completed` or in `Exception`, every further `read()` fails with
/// a usage error and leaves the state alone.
#[derive(Debug)]
pub struct ODataResourceReader {
    context: ReaderContext,
    source: Option<ResourceSource>,
    expected_type: Option<String>,
    state: ODataReaderState,
    item: Option<ODataItem>,
    scopes: Vec<Scope>,
    drained: Option<Rc<Cell<bool>>>,
}

impl ODataResourceReader {
    pub(crate) fn new(
        context: ReaderContext,
        source: ResourceSource,
        expected_type: Option<String>,
    ) -> Self {
        Self {
            context,
            source: Some(source),
            expected_type,
            state: ODataReaderState::Start,
            item: None,
            scopes: Vec::new(),
            drained: None,
        }
    }

    pub(crate) fn with_drain_flag(mut self, flag: Rc<Cell<bool>>) -> Self {
        self.drained = Some(flag);
        self
    }

    pub fn state(&self) -> ODataReaderState {
        self.state
    }

    /// The current item. `None` before the first read, in terminal states,
    /// and on `ResourceStart`/`ResourceEnd` of an expanded null resource.
    pub fn item(&self) -> Option<&ODataItem> {
        self.item.as_ref()
    }

    pub fn read(&mut self) -> Result<bool> {
        if self.state.is_terminal() {
            return Err(ODataReaderError::ReadInTerminalState {
                state: self.state.to_string(),
            });
        }
        match self.step() {
            Ok(advanced) => {
                trace!(state = %self.state, "resource reader advanced");
                if self.state.is_terminal() {
                    self.mark_drained();
                }
                Ok(advanced)
            }
            Err(err) if err.kind() == ErrorKind::Usage => Err(err),
            Err(err) => {
                trace!(error = %err, "resource reader failed");
                self.state = ODataReaderState::Exception;
                self.item = None;
                self.scopes.clear();
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
        if self.state == ODataReaderState::Start {
            return self.start();
        }
        self.stash_current();
        let Some(top) = self.scopes.pop() else {
            self.state = ODataReaderState::Completed;
            self.item = None;
            return Ok(false);
        };
        match top {
            Scope::ResourceSet {
                set,
                mut items,
                expected_type,
                depth,
            } => match items.next() {
                Some(json) => {
                    let next_type = expected_type.clone();
                    self.scopes.push(Scope::ResourceSet {
                        set,
                        items,
                        expected_type,
                        depth,
                    });
                    self.enter_resource(json, next_type, depth + 1)
                }
                None => {
                    self.state = ODataReaderState::ResourceSetEnd;
                    self.item = set.map(ODataItem::ResourceSet);
                    Ok(true)
                }
            },
            Scope::Resource {
                resource,
                mut nested,
                depth,
            } => match nested.next() {
                Some(pending) => {
                    self.scopes.push(Scope::Resource {
                        resource,
                        nested,
                        depth,
                    });
                    self.scopes.push(Scope::NestedInfo {
                        info: None,
                        content: pending.content.into_iter(),
                        target_type: pending.target_type,
                        entered: 0,
                        depth,
                    });
                    self.state = ODataReaderState::NestedResourceInfoStart;
                    self.item = Some(ODataItem::NestedResourceInfo(pending.info));
                    Ok(true)
                }
                None => {
                    self.state = ODataReaderState::ResourceEnd;
                    self.item = resource.map(ODataItem::Resource);
                    Ok(true)
                }
            },
            Scope::NestedInfo {
                info,
                mut content,
                target_type,
                entered,
                depth,
            } => {
                let Some(next) = content.next() else {
                    self.state = ODataReaderState::NestedResourceInfoEnd;
                    self.item = info.map(ODataItem::NestedResourceInfo);
                    return Ok(true);
                };
                let entered = entered + 1;
                if self.context.is_response && entered > 1 {
                    return Err(ODataReaderError::MultipleItemsInNavigationLinkContent);
                }
                let child_type = target_type.clone();
                self.scopes.push(Scope::NestedInfo {
                    info,
                    content,
                    target_type,
                    entered,
                    depth,
                });
                match next {
                    NavContent::ReferenceLink(link) => {
                        self.state = ODataReaderState::EntityReferenceLink;
                        self.item = Some(ODataItem::EntityReferenceLink(link));
                        Ok(true)
                    }
                    NavContent::Resource(json) => self.enter_resource(json, child_type, depth + 1),
                    NavContent::ResourceSet { set, items } => {
                        self.context.deserializer().check_depth(depth + 1)?;
                        self.scopes.push(Scope::ResourceSet {
                            set: None,
                            items: items.into_iter(),
                            expected_type: child_type,
                            depth: depth + 1,
                        });
                        self.state = ODataReaderState::ResourceSetStart;
                        self.item = Some(ODataItem::ResourceSet(set));
                        Ok(true)
                    }
                }
            }
        }
    }

    fn start(&mut self) -> Result<bool> {
        let source = self
            .source
            .take()
            .ok_or_else(|| ODataReaderError::Usage("the reader has no payload".into()))?;
        let expected = self.expected_type.clone();
        match source {
            ResourceSource::Payload { bytes, is_set } => {
                let json = JsonValue::parse(&bytes)?;
                let deserializer = self.context.deserializer();
                if is_set {
                    let (set, items) = deserializer.read_resource_set_wrapper(json)?;
                    self.enter_resource_set(set, items, expected)
                } else {
                    deserializer.check_top_level_resource(&json)?;
                    if json.is_null() {
                        return Err(ODataReaderError::protocol(
                            "a top-level resource payload cannot be null",
                        ));
                    }
                    self.enter_resource(json, expected, 1)
                }
            }
            ResourceSource::Resource(json) => self.enter_resource(json, expected, 1),
            ResourceSource::ResourceSet(items) => {
                self.enter_resource_set(ODataResourceSet::default(), items, expected)
            }
        }
    }

    fn enter_resource_set(
        &mut self,
        set: ODataResourceSet,
        items: Vec<JsonValue>,
        expected_type: Option<String>,
    ) -> Result<bool> {
        self.scopes.push(Scope::ResourceSet {
            set: None,
            items: items.into_iter(),
            expected_type,
            depth: 1,
        });
        self.state = ODataReaderState::ResourceSetStart;
        self.item = Some(ODataItem::ResourceSet(set));
        Ok(true)
    }

    fn enter_resource(
        &mut self,
        json: JsonValue,
        expected_type: Option<String>,
        depth: usize,
    ) -> Result<bool> {
        if json.is_null() {
            self.scopes.push(Scope::Resource {
                resource: None,
                nested: Vec::new().into_iter(),
                depth,
            });
            self.state = ODataReaderState::ResourceStart;
            self.item = None;
            return Ok(true);
        }
        let parts = self
            .context
            .deserializer()
            .read_resource(json, expected_type.as_deref(), depth)?;
        self.scopes.push(Scope::Resource {
            resource: None,
            nested: parts.nested.into_iter(),
            depth,
        });
        self.state = ODataReaderState::ResourceStart;
        self.item = Some(ODataItem::Resource(parts.resource));
        Ok(true)
    }

    /// Moves the item reported by a `*Start` state back into its scope so the
    /// matching `*End` state can report it again.
    fn stash_current(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        match (self.state, item, self.scopes.last_mut()) {
            (
                ODataReaderState::ResourceStart,
                ODataItem::Resource(r),
                Some(Scope::Resource { resource, .. }),
            ) => *resource = Some(r),
            (
                ODataReaderState::ResourceSetStart,
                ODataItem::ResourceSet(s),
                Some(Scope::ResourceSet { set, .. }),
            ) => *set = Some(s),
            (
                ODataReaderState::NestedResourceInfoStart,
                ODataItem::NestedResourceInfo(i),
                Some(Scope::NestedInfo { info, .. }),
            ) => *info = Some(i),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ODataReaderSettings;

    fn reader(payload: &str, is_set: bool, is_response: bool) -> ODataResourceReader {
        let context = ReaderContext::new(None, ODataReaderSettings::default(), is_response);
        ODataResourceReader::new(
            context,
            ResourceSource::Payload {
                bytes: payload.as_bytes().to_vec(),
                is_set,
            },
            None,
        )
    }

    fn states(reader: &mut ODataResourceReader) -> Vec<ODataReaderState> {
        let mut out = Vec::new();
        while reader.read().unwrap() {
            out.push(reader.state());
        }
        out.push(reader.state());
        out
    }

    #[test]
    fn flat_resource() {
        use ODataReaderState::*;
        let mut r = reader(r#"{"Id":1,"Name":"a"}"#, false, true);
        assert_eq!(states(&mut r), [ResourceStart, ResourceEnd, Completed]);
    }

    #[test]
    fn end_state_reports_the_same_item() {
        let mut r = reader(
            r#"{"Id":1,"Nav@odata.navigationLink":"http://x/y"}"#,
            false,
            true,
        );
        r.read().unwrap();
        let start = r.item().cloned();
        r.read().unwrap();
        assert_eq!(r.state(), ODataReaderState::NestedResourceInfoStart);
        let info = r.item().cloned();
        r.read().unwrap();
        assert_eq!(r.item().cloned(), info);
        r.read().unwrap();
        assert_eq!(r.state(), ODataReaderState::ResourceEnd);
        assert_eq!(r.item().cloned(), start);
    }

    #[test]
    fn expanded_set_in_resource_set() {
        use ODataReaderState::*;
        let mut r = reader(
            r#"{"value":[{"Id":1,"Items@odata.navigationLink":"Items","Items":[{"Id":2}]}]}"#,
            true,
            true,
        );
        assert_eq!(
            states(&mut r),
            [
                ResourceSetStart,
                ResourceStart,
                NestedResourceInfoStart,
                ResourceSetStart,
                ResourceStart,
                ResourceEnd,
                ResourceSetEnd,
                NestedResourceInfoEnd,
                ResourceEnd,
                ResourceSetEnd,
                Completed
            ]
        );
    }

    #[test]
    fn malformed_json_moves_to_exception() {
        let mut r = reader("{", false, true);
        assert!(r.read().is_err());
        assert_eq!(r.state(), ODataReaderState::Exception);
        let err = r.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(r.state(), ODataReaderState::Exception);
    }
}
