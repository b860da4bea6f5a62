//! Pull reader over action parameter payloads.
//!
//! Primitive and complex parameters are reported directly as values.
//! Resource, resource-set and collection parameters each require a nested
//! reader, which must be read to completion before the parameter reader
//! advances again.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use odata_edm::{EdmOperation, EdmType};
use tracing::trace;

use crate::collection_reader::{CollectionSource, ODataCollectionReader};
use crate::deserializer::{expect_object, scan_object, ReaderContext, ScannedProperty};
use crate::error::{ErrorKind, ODataReaderError, Result};
use crate::json::JsonValue;
use crate::om::ODataValue;
use crate::resource_reader::{ODataResourceReader, ResourceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ODataParameterReaderState {
    Start,
    Value,
    Resource,
    ResourceSet,
    Collection,
    Exception,
    Completed,
}

impl ODataParameterReaderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exception)
    }

    fn nested_reader_name(self) -> Option<&'static str> {
        match self {
            Self::Resource => Some("resource"),
            Self::ResourceSet => Some("resource set"),
            Self::Collection => Some("collection"),
            _ => None,
        }
    }
}

impl fmt::Display for ODataParameterReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
struct Pending {
    name: String,
    declared: Option<EdmType>,
    json: JsonValue,
}

/// Reads `Start → (Value | Resource | ResourceSet | Collection)* → Completed`.
#[derive(Debug)]
pub struct ODataParameterReader {
    context: ReaderContext,
    operation: Option<EdmOperation>,
    payload: Option<Vec<u8>>,
    parameters: std::vec::IntoIter<Pending>,
    state: ODataParameterReaderState,
    name: Option<String>,
    value: Option<ODataValue>,
    nested: Option<(Option<EdmType>, JsonValue)>,
    drained: Option<Rc<Cell<bool>>>,
}

impl ODataParameterReader {
    pub(crate) fn new(context: ReaderContext, payload: Vec<u8>, operation: Option<EdmOperation>) -> Self {
        Self {
            context,
            operation,
            payload: Some(payload),
            parameters: Vec::new().into_iter(),
            state: ODataParameterReaderState::Start,
            name: None,
            value: None,
            nested: None,
            drained: None,
        }
    }

    pub fn state(&self) -> ODataParameterReaderState {
        self.state
    }

    /// Name of the current parameter.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Value of the current parameter, in [`ODataParameterReaderState::Value`].
    pub fn value(&self) -> Option<&ODataValue> {
        self.value.as_ref()
    }

    pub fn read(&mut self) -> Result<bool> {
        if self.state.is_terminal() {
            return Err(ODataReaderError::ReadInTerminalState {
                state: self.state.to_string(),
            });
        }
        if let Some(reader) = self.state.nested_reader_name() {
            let drained = self.drained.as_ref().map(|f| f.get()).unwrap_or(false);
            if !drained {
                return Err(ODataReaderError::NestedReaderNotDrained(reader));
            }
        }
        match self.step() {
            Ok(advanced) => {
                trace!(state = %self.state, parameter = ?self.name, "parameter reader advanced");
                Ok(advanced)
            }
            Err(err) if err.kind() == ErrorKind::Usage => Err(err),
            Err(err) => {
                self.state = ODataParameterReaderState::Exception;
                self.name = None;
                self.value = None;
                self.nested = None;
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<bool> {
        if self.state == ODataParameterReaderState::Start {
            self.scan()?;
        }
        self.value = None;
        self.nested = None;
        self.drained = None;
        let Some(pending) = self.parameters.next() else {
            self.state = ODataParameterReaderState::Completed;
            self.name = None;
            return Ok(false);
        };
        let state = classify(pending.declared.as_ref(), &pending.json);
        self.name = Some(pending.name);
        match state {
            ODataParameterReaderState::Value => {
                let value = self.context.deserializer().read_value(
                    pending.json,
                    pending.declared.as_ref(),
                    None,
                    1,
                )?;
                self.value = Some(value);
            }
            _ => self.nested = Some((pending.declared, pending.json)),
        }
        self.state = state;
        Ok(true)
    }

    fn scan(&mut self) -> Result<()> {
        let bytes = self
            .payload
            .take()
            .ok_or_else(|| ODataReaderError::Usage("the reader has no payload".into()))?;
        let json = JsonValue::parse(&bytes)?;
        let members = expect_object(json, "parameter")?;
        let scanned = scan_object(members, &self.context.settings)?;
        let mut pending = Vec::with_capacity(scanned.properties.len());
        for entry in scanned.properties {
            pending.push(self.pending_parameter(entry)?);
        }
        if let Some(operation) = &self.operation {
            let skip = usize::from(operation.is_bound);
            for parameter in operation.parameters.iter().skip(skip) {
                let present = pending.iter().any(|p| p.name == parameter.name);
                if !present && !parameter.nullable {
                    return Err(ODataReaderError::protocol(format!(
                        "the non-nullable parameter '{}' of operation '{}' is missing",
                        parameter.name, operation.name
                    )));
                }
            }
        }
        self.parameters = pending.into_iter();
        Ok(())
    }

    fn pending_parameter(&self, mut entry: ScannedProperty) -> Result<Pending> {
        let declared = match &self.operation {
            Some(operation) => {
                let mut declared = operation.parameters.iter();
                // Bound operations receive their binding parameter from the URL.
                if operation.is_bound {
                    declared.next();
                }
                let parameter = declared.find(|p| p.name == entry.name).ok_or_else(|| {
                    ODataReaderError::protocol(format!(
                        "the parameter '{}' is not declared by operation '{}'",
                        entry.name, operation.name
                    ))
                })?;
                Some(parameter.type_.clone())
            }
            None => None,
        };
        let json = entry.value.take().ok_or_else(|| ODataReaderError::OrphanPropertyAnnotation {
            property: entry.name.clone(),
            annotation: entry
                .annotations
                .first()
                .map(|(n, _)| n.clone())
                .unwrap_or_default(),
        })?;
        Ok(Pending {
            name: entry.name,
            declared,
            json,
        })
    }

    fn take_nested(&mut self, wanted: ODataParameterReaderState) -> Result<(Option<EdmType>, JsonValue)> {
        if self.state != wanted {
            return Err(ODataReaderError::Usage(format!(
                "a {} reader cannot be created in parameter reader state '{}'",
                wanted.nested_reader_name().unwrap_or("nested"),
                self.state
            )));
        }
        let nested = self.nested.take().ok_or_else(|| {
            ODataReaderError::Usage(format!(
                "the {} reader for parameter '{}' was already created",
                wanted.nested_reader_name().unwrap_or("nested"),
                self.name.as_deref().unwrap_or_default()
            ))
        })?;
        Ok(nested)
    }

    fn drain_flag(&mut self) -> Rc<Cell<bool>> {
        let flag = Rc::new(Cell::new(false));
        self.drained = Some(flag.clone());
        flag
    }

    pub fn create_resource_reader(&mut self) -> Result<ODataResourceReader> {
        let (declared, json) = self.take_nested(ODataParameterReaderState::Resource)?;
        let expected = match declared {
            Some(EdmType::Entity(name)) => Some(name),
            _ => None,
        };
        let flag = self.drain_flag();
        Ok(
            ODataResourceReader::new(self.context.clone(), ResourceSource::Resource(json), expected)
                .with_drain_flag(flag),
        )
    }

    pub fn create_resource_set_reader(&mut self) -> Result<ODataResourceReader> {
        let (declared, json) = self.take_nested(ODataParameterReaderState::ResourceSet)?;
        let expected = match declared.as_ref().and_then(EdmType::item_type) {
            Some(EdmType::Entity(name)) => Some(name.clone()),
            _ => None,
        };
        let JsonValue::Array(items) = json else {
            return Err(ODataReaderError::protocol("a resource set parameter must be an array"));
        };
        let flag = self.drain_flag();
        Ok(ODataResourceReader::new(
            self.context.clone(),
            ResourceSource::ResourceSet(items),
            expected,
        )
        .with_drain_flag(flag))
    }

    pub fn create_collection_reader(&mut self) -> Result<ODataCollectionReader> {
        let (declared, json) = self.take_nested(ODataParameterReaderState::Collection)?;
        let JsonValue::Array(items) = json else {
            return Err(ODataReaderError::protocol("a collection parameter must be an array"));
        };
        let flag = self.drain_flag();
        Ok(ODataCollectionReader::new(
            self.context.clone(),
            CollectionSource::Items(items),
            self.name.clone(),
            declared,
        )
        .with_drain_flag(flag))
    }
}

fn classify(declared: Option<&EdmType>, json: &JsonValue) -> ODataParameterReaderState {
    match declared {
        Some(EdmType::Entity(_)) => ODataParameterReaderState::Resource,
        Some(EdmType::Collection(item)) => match item.as_ref() {
            EdmType::Entity(_) => ODataParameterReaderState::ResourceSet,
            _ if json.is_null() => ODataParameterReaderState::Value,
            _ => ODataParameterReaderState::Collection,
        },
        Some(_) => ODataParameterReaderState::Value,
        None => match json {
            JsonValue::Array(_) => ODataParameterReaderState::Collection,
            _ => ODataParameterReaderState::Value,
        },
    }
}
