//! JSON payload decoding shared by every reader.
//!
//! The readers own the state machines; this module turns JSON members into
//! object-model values. Navigation content is *not* decoded here: it is
//! handed back as [`NavContent`] so the resource reader can walk it lazily.

use std::sync::Arc;

use odata_edm::{EdmModel, EdmNavigationProperty, EdmOperationKind, EdmPrimitiveKind, EdmType};
use tracing::{trace, warn};

use crate::error::{ODataReaderError, Result};
use crate::json::JsonValue;
use crate::om::{
    ODataAssociationLink, ODataCollectionValue, ODataComplexValue, ODataEntityReferenceLink,
    ODataEntityReferenceLinks, ODataError, ODataErrorDetail, ODataInnerError,
    ODataNestedResourceInfo, ODataOperation, ODataProperty, ODataResource, ODataResourceMember,
    ODataResourceSet, ODataServiceDocument, ODataServiceDocumentElement, ODataStreamReferenceValue,
    ODataValue, ServiceDocumentElementKind,
};
use crate::primitive::{convert_primitive, infer_primitive};
use crate::settings::ODataReaderSettings;

pub(crate) const ODATA_PREFIX: &str = "odata.";

const NAVIGATION_LINK: &str = "odata.navigationLink";
const ASSOCIATION_LINK: &str = "odata.associationLink";
const BIND: &str = "odata.bind";
const TYPE: &str = "odata.type";
const COUNT: &str = "odata.count";
const NEXT_LINK: &str = "odata.nextLink";
const DELTA_LINK: &str = "odata.deltaLink";
const MEDIA_EDIT_LINK: &str = "odata.mediaEditLink";
const MEDIA_READ_LINK: &str = "odata.mediaReadLink";
const MEDIA_CONTENT_TYPE: &str = "odata.mediaContentType";
const MEDIA_ETAG: &str = "odata.mediaEtag";

// ── Member scanning ───────────────────────────────────────────────────────

/// One property of an object together with the annotations that preceded it.
#[derive(Debug)]
pub(crate) struct ScannedProperty {
    pub name: String,
    pub annotations: Vec<(String, JsonValue)>,
    pub value: Option<JsonValue>,
}

impl ScannedProperty {
    fn annotation(&self, name: &str) -> Option<&JsonValue> {
        self.annotations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn take_annotation(&mut self, name: &str) -> Option<JsonValue> {
        let idx = self.annotations.iter().position(|(n, _)| n == name)?;
        Some(self.annotations.remove(idx).1)
    }
}

#[derive(Debug)]
enum OrderEntry {
    Annotation(String),
    Member(usize),
    Operation(String),
}

/// An object split into instance annotations, operations and properties.
#[derive(Debug, Default)]
pub(crate) struct ScannedObject {
    pub instance_annotations: Vec<(String, JsonValue)>,
    pub operations: Vec<(String, JsonValue)>,
    pub properties: Vec<ScannedProperty>,
    order: Vec<OrderEntry>,
}

impl ScannedObject {
    pub fn instance_annotation(&self, name: &str) -> Option<&JsonValue> {
        self.instance_annotations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn take_instance_annotation(&mut self, name: &str) -> Option<JsonValue> {
        let idx = self
            .instance_annotations
            .iter()
            .position(|(n, _)| n == name)?;
        Some(self.instance_annotations.remove(idx).1)
    }

    pub fn take_property(&mut self, name: &str) -> Option<ScannedProperty> {
        let idx = self.properties.iter().position(|p| p.name == name)?;
        self.order.retain(|e| !matches!(e, OrderEntry::Member(i) if *i == idx));
        for entry in &mut self.order {
            if let OrderEntry::Member(i) = entry {
                if *i > idx {
                    *i -= 1;
                }
            }
        }
        Some(self.properties.remove(idx))
    }
}

pub(crate) fn scan_object(
    members: Vec<(String, JsonValue)>,
    settings: &ODataReaderSettings,
) -> Result<ScannedObject> {
    let mut scanned = ScannedObject::default();
    for (key, value) in members {
        if let Some(annotation) = key.strip_prefix('@') {
            if scanned.instance_annotation(annotation).is_some() {
                return Err(ODataReaderError::DuplicateAnnotation {
                    target: String::new(),
                    annotation: annotation.to_string(),
                });
            }
            scanned
                .order
                .push(OrderEntry::Annotation(annotation.to_string()));
            scanned
                .instance_annotations
                .push((annotation.to_string(), value));
        } else if key.starts_with('#') {
            scanned.order.push(OrderEntry::Operation(key.clone()));
            scanned.operations.push((key, value));
        } else if let Some((property, annotation)) = key.split_once('@') {
            let idx = member_index(&mut scanned, property);
            let entry = &mut scanned.properties[idx];
            if entry.value.is_some() {
                if !settings.allow_duplicate_property_names {
                    return Err(ODataReaderError::AnnotationAfterProperty {
                        property: property.to_string(),
                        annotation: annotation.to_string(),
                    });
                }
                // A repeated property starts over in the first one's slot.
                entry.value = None;
                entry.annotations.clear();
            }
            if entry.annotation(annotation).is_some() {
                return Err(ODataReaderError::DuplicateAnnotation {
                    target: property.to_string(),
                    annotation: annotation.to_string(),
                });
            }
            entry.annotations.push((annotation.to_string(), value));
        } else {
            let idx = member_index(&mut scanned, &key);
            let entry = &mut scanned.properties[idx];
            if entry.value.is_some() {
                if !settings.allow_duplicate_property_names {
                    return Err(ODataReaderError::DuplicateProperty { name: key });
                }
                trace!(property = %key, "duplicate property replaced");
                entry.annotations.clear();
            }
            entry.value = Some(value);
        }
    }
    Ok(scanned)
}

fn member_index(scanned: &mut ScannedObject, name: &str) -> usize {
    if let Some(idx) = scanned.properties.iter().position(|p| p.name == name) {
        return idx;
    }
    scanned.properties.push(ScannedProperty {
        name: name.to_string(),
        annotations: Vec::new(),
        value: None,
    });
    let idx = scanned.properties.len() - 1;
    scanned.order.push(OrderEntry::Member(idx));
    idx
}

// ── Navigation content ────────────────────────────────────────────────────

/// One item inside a navigation link's content region.
#[derive(Debug)]
pub(crate) enum NavContent {
    ReferenceLink(ODataEntityReferenceLink),
    /// Expanded single resource; `JsonValue::Null` for an expanded null.
    Resource(JsonValue),
    ResourceSet {
        set: ODataResourceSet,
        items: Vec<JsonValue>,
    },
}

#[derive(Debug)]
pub(crate) struct PendingNestedInfo {
    pub info: ODataNestedResourceInfo,
    pub target_type: Option<String>,
    pub content: Vec<NavContent>,
}

/// A decoded resource plus its not-yet-walked navigation links.
#[derive(Debug)]
pub(crate) struct ResourceParts {
    pub resource: ODataResource,
    pub nested: Vec<PendingNestedInfo>,
}

// ── Decoder ───────────────────────────────────────────────────────────────

/// Owned configuration shared by a message reader and every reader it creates.
#[derive(Debug, Clone)]
pub(crate) struct ReaderContext {
    pub model: Option<Arc<EdmModel>>,
    pub settings: Arc<ODataReaderSettings>,
    pub is_response: bool,
    /// The content type carries `IEEE754Compatible=true`: `Edm.Int64` and
    /// `Edm.Decimal` values (and counts) are sent as JSON strings.
    pub ieee754_compatible: bool,
}

impl ReaderContext {
    pub fn new(model: Option<Arc<EdmModel>>, settings: ODataReaderSettings, is_response: bool) -> Self {
        Self {
            model,
            settings: Arc::new(settings),
            is_response,
            ieee754_compatible: false,
        }
    }

    pub fn deserializer(&self) -> JsonDeserializer<'_> {
        JsonDeserializer::new(self.model.as_deref(), &self.settings, self.ieee754_compatible)
    }
}

/// Decoding context: model, settings and the numeric encoding in use.
#[derive(Clone, Copy)]
pub(crate) struct JsonDeserializer<'a> {
    pub model: Option<&'a EdmModel>,
    pub settings: &'a ODataReaderSettings,
    pub ieee754_compatible: bool,
}

impl<'a> JsonDeserializer<'a> {
    pub fn new(
        model: Option<&'a EdmModel>,
        settings: &'a ODataReaderSettings,
        ieee754_compatible: bool,
    ) -> Self {
        Self {
            model,
            settings,
            ieee754_compatible,
        }
    }

    pub fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.settings.max_nesting_depth {
            return Err(ODataReaderError::NestingDepthExceeded(
                self.settings.max_nesting_depth,
            ));
        }
        Ok(())
    }

    fn link(&self, value: JsonValue, what: &str) -> Result<String> {
        self.settings.resolve_link(&value.into_string(what)?)
    }

    /// Resolves a payload `odata.type` value and checks it against `expected`.
    pub fn resolve_type_annotation(
        &self,
        annotation: &str,
        expected: Option<&EdmType>,
    ) -> Result<EdmType> {
        let name = annotation.strip_prefix('#').unwrap_or(annotation);
        let actual = match self.model {
            Some(model) => model
                .find_type(name)
                .ok_or_else(|| ODataReaderError::UnresolvedType(name.to_string()))?,
            None => EdmType::parse(name)
                .map_err(|_| ODataReaderError::UnresolvedType(name.to_string()))?,
        };
        if let Some(expected) = expected {
            if !self.is_compatible(&actual, expected) {
                return Err(ODataReaderError::IncompatibleType {
                    actual: actual.full_name(),
                    expected: expected.full_name(),
                });
            }
        }
        Ok(actual)
    }

    fn is_compatible(&self, actual: &EdmType, expected: &EdmType) -> bool {
        match (actual, expected) {
            (EdmType::Collection(a), EdmType::Collection(e)) => self.is_compatible(a, e),
            (EdmType::Primitive(a), EdmType::Primitive(e)) => a == e,
            (EdmType::Entity(a), EdmType::Entity(e)) | (EdmType::Complex(a), EdmType::Complex(e)) => {
                match self.model {
                    Some(model) => model.is_assignable(a, e),
                    None => true,
                }
            }
            // Without a model every structured name parses as complex.
            (EdmType::Complex(_), EdmType::Entity(_)) => self.model.is_none(),
            _ => false,
        }
    }

    // ── Values ────────────────────────────────────────────────────────────

    /// Reads any property value.
    pub fn read_value(
        &self,
        json: JsonValue,
        expected: Option<&EdmType>,
        type_annotation: Option<&str>,
        depth: usize,
    ) -> Result<ODataValue> {
        self.check_depth(depth)?;
        let annotated = match type_annotation {
            Some(name) => Some(self.resolve_type_annotation(name, expected)?),
            None => None,
        };
        let effective = annotated.as_ref().or(expected);
        if json.is_null() {
            return Ok(ODataValue::Null);
        }
        match effective {
            Some(t @ EdmType::Collection(item)) => {
                if item.is_collection() {
                    return Err(ODataReaderError::NestedCollection {
                        type_name: t.full_name(),
                    });
                }
                match json {
                    JsonValue::Array(items) => Ok(ODataValue::Collection(self.read_collection(
                        items,
                        Some(item),
                        depth + 1,
                    )?)),
                    other => Err(ODataReaderError::mismatch(other.literal(), t.full_name())),
                }
            }
            Some(EdmType::Primitive(kind)) => match json {
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    Err(ODataReaderError::mismatch(json.literal(), kind.full_name()))
                }
                literal => Ok(ODataValue::Primitive(convert_primitive(
                    &literal,
                    *kind,
                    self.ieee754_compatible,
                )?)),
            },
            Some(EdmType::Complex(name)) => match json {
                JsonValue::Object(members) => Ok(ODataValue::Complex(self.read_complex(
                    members,
                    Some(name),
                    depth + 1,
                )?)),
                other => Err(ODataReaderError::mismatch(other.literal(), name.clone())),
            },
            Some(EdmType::Entity(name)) => Err(ODataReaderError::protocol(format!(
                "a value of entity type '{name}' cannot appear as a property value"
            ))),
            None => match json {
                JsonValue::Array(items) => Ok(ODataValue::Collection(self.read_collection(
                    items,
                    None,
                    depth + 1,
                )?)),
                JsonValue::Object(members) => Ok(ODataValue::Complex(self.read_complex(
                    members,
                    None,
                    depth + 1,
                )?)),
                literal => Ok(ODataValue::Primitive(infer_primitive(&literal)?)),
            },
        }
    }

    pub fn read_complex(
        &self,
        members: Vec<(String, JsonValue)>,
        declared: Option<&str>,
        depth: usize,
    ) -> Result<ODataComplexValue> {
        self.check_depth(depth)?;
        let mut scanned = scan_object(members, self.settings)?;
        let declared_type = declared.map(|d| EdmType::Complex(d.to_string()));
        let type_name = match scanned.take_instance_annotation(TYPE) {
            Some(annotation) => {
                let name = annotation.into_string(TYPE)?;
                Some(
                    self.resolve_type_annotation(&name, declared_type.as_ref())?
                        .full_name(),
                )
            }
            None => declared.map(str::to_string),
        };
        let mut properties = Vec::with_capacity(scanned.properties.len());
        for entry in scanned.properties {
            properties.push(self.read_structural_property(entry, type_name.as_deref(), depth)?);
        }
        Ok(ODataComplexValue {
            type_name,
            properties,
        })
    }

    /// Reads a homogeneous collection; items must not be collections.
    pub fn read_collection(
        &self,
        items: Vec<JsonValue>,
        item_type: Option<&EdmType>,
        depth: usize,
    ) -> Result<ODataCollectionValue> {
        self.check_depth(depth)?;
        if let Some(item) = item_type {
            if item.is_collection() {
                return Err(ODataReaderError::NestedCollection {
                    type_name: EdmType::collection(item.clone()).full_name(),
                });
            }
        }
        let mut values = Vec::with_capacity(items.len());
        let mut complex_items: Option<bool> = None;
        for json in items {
            if let JsonValue::Array(_) = json {
                return Err(ODataReaderError::NestedCollection {
                    type_name: item_type
                        .map(|t| EdmType::collection(t.clone()).full_name())
                        .unwrap_or_else(|| "Collection(Collection)".to_string()),
                });
            }
            let is_complex = matches!(json, JsonValue::Object(_));
            if !json.is_null() {
                match complex_items {
                    Some(previous) if previous != is_complex => {
                        return Err(ODataReaderError::protocol(
                            "collection items must all be primitive or all be complex",
                        ));
                    }
                    _ => complex_items = Some(is_complex),
                }
            }
            values.push(self.read_value(json, item_type, None, depth)?);
        }
        Ok(ODataCollectionValue {
            type_name: item_type.map(|t| EdmType::collection(t.clone()).full_name()),
            items: values,
        })
    }

    fn declared_property_type(
        &self,
        owner: Option<&str>,
        property: &str,
    ) -> Result<Option<EdmType>> {
        let (Some(model), Some(owner)) = (self.model, owner) else {
            return Ok(None);
        };
        if let Some(declared) = model.structural_property(owner, property) {
            return Ok(Some(declared.type_.clone()));
        }
        if model.find_structured_type(owner).is_some()
            && !model.is_open(owner)
            && !self.settings.allow_undeclared_properties
        {
            return Err(ODataReaderError::UndeclaredProperty {
                type_name: owner.to_string(),
                property: property.to_string(),
            });
        }
        Ok(None)
    }

    fn read_structural_property(
        &self,
        mut entry: ScannedProperty,
        owner: Option<&str>,
        depth: usize,
    ) -> Result<ODataProperty> {
        let expected = self.declared_property_type(owner, &entry.name)?;
        let Some(value) = entry.value.take() else {
            if let Some(stream) = self.stream_reference(&mut entry)? {
                return Ok(ODataProperty {
                    name: entry.name,
                    value: ODataValue::StreamReference(stream),
                });
            }
            let annotation = entry
                .annotations
                .first()
                .map(|(n, _)| n.clone())
                .unwrap_or_default();
            return Err(ODataReaderError::OrphanPropertyAnnotation {
                property: entry.name,
                annotation,
            });
        };
        if matches!(expected, Some(EdmType::Primitive(EdmPrimitiveKind::Stream))) {
            return Err(ODataReaderError::protocol(format!(
                "the stream property '{}' cannot carry a value",
                entry.name
            )));
        }
        let type_annotation = match entry.take_annotation(TYPE) {
            Some(v) => Some(v.into_string(TYPE)?),
            None => None,
        };
        for (annotation, _) in &entry.annotations {
            trace!(property = %entry.name, %annotation, "ignoring property annotation");
        }
        let value = self.read_value(value, expected.as_ref(), type_annotation.as_deref(), depth)?;
        Ok(ODataProperty {
            name: entry.name,
            value,
        })
    }

    fn stream_reference(
        &self,
        entry: &mut ScannedProperty,
    ) -> Result<Option<ODataStreamReferenceValue>> {
        let mut stream = ODataStreamReferenceValue::default();
        if let Some(v) = entry.take_annotation(MEDIA_EDIT_LINK) {
            stream.edit_link = Some(self.link(v, MEDIA_EDIT_LINK)?);
        }
        if let Some(v) = entry.take_annotation(MEDIA_READ_LINK) {
            stream.read_link = Some(self.link(v, MEDIA_READ_LINK)?);
        }
        if let Some(v) = entry.take_annotation(MEDIA_CONTENT_TYPE) {
            stream.content_type = Some(v.into_string(MEDIA_CONTENT_TYPE)?);
        }
        if let Some(v) = entry.take_annotation(MEDIA_ETAG) {
            stream.etag = Some(v.into_string(MEDIA_ETAG)?);
        }
        Ok((!stream.is_empty()).then_some(stream))
    }

    // ── Resources ─────────────────────────────────────────────────────────

    /// Decodes one resource object.
    ///
    /// `expected_type` is the entity type the context implies (entity set,
    /// navigation target); a payload `odata.type` may narrow it.
    pub fn read_resource(
        &self,
        json: JsonValue,
        expected_type: Option<&str>,
        depth: usize,
    ) -> Result<ResourceParts> {
        self.check_depth(depth)?;
        let members = match json {
            JsonValue::Object(members) => members,
            other => {
                return Err(ODataReaderError::protocol(format!(
                    "expected a resource object but found {}",
                    other.kind_name()
                )))
            }
        };
        let mut scanned = scan_object(members, self.settings)?;
        let mut resource = ODataResource::default();

        let expected = expected_type.map(|t| EdmType::Entity(t.to_string()));
        resource.type_name = match scanned.take_instance_annotation(TYPE) {
            Some(annotation) => {
                let name = annotation.into_string(TYPE)?;
                let resolved = self.resolve_type_annotation(&name, expected.as_ref())?;
                match (self.model, &resolved) {
                    (Some(_), EdmType::Entity(_)) | (None, _) => {}
                    _ => {
                        return Err(ODataReaderError::IncompatibleType {
                            actual: resolved.full_name(),
                            expected: expected_type.unwrap_or("an entity type").to_string(),
                        })
                    }
                }
                Some(resolved.full_name())
            }
            None => expected_type.map(str::to_string),
        };
        let type_name = resource.type_name.clone();
        let type_name = type_name.as_deref();

        let mut media = ODataStreamReferenceValue::default();
        for (name, value) in std::mem::take(&mut scanned.instance_annotations) {
            match name.as_str() {
                "odata.id" => resource.id = Some(self.link(value, "odata.id")?),
                "odata.etag" => resource.etag = Some(value.into_string("odata.etag")?),
                "odata.editLink" => resource.edit_link = Some(self.link(value, "odata.editLink")?),
                "odata.readLink" => resource.read_link = Some(self.link(value, "odata.readLink")?),
                MEDIA_EDIT_LINK => media.edit_link = Some(self.link(value, MEDIA_EDIT_LINK)?),
                MEDIA_READ_LINK => media.read_link = Some(self.link(value, MEDIA_READ_LINK)?),
                MEDIA_CONTENT_TYPE => {
                    media.content_type = Some(value.into_string(MEDIA_CONTENT_TYPE)?)
                }
                MEDIA_ETAG => media.etag = Some(value.into_string(MEDIA_ETAG)?),
                "odata.context" | "odata.metadataEtag" => {}
                other if other.starts_with(ODATA_PREFIX) => {
                    warn!(annotation = %other, "ignoring unknown odata annotation on resource");
                }
                other => trace!(annotation = %other, "ignoring custom instance annotation"),
            }
        }
        let declares_stream = match (self.model, type_name) {
            (Some(model), Some(t)) => model.has_stream(t),
            _ => false,
        };
        if !media.is_empty() || declares_stream {
            resource.media_resource = Some(media);
        }

        for (key, value) in std::mem::take(&mut scanned.operations) {
            self.read_operations(&mut resource, key, value)?;
        }

        let mut labels: Vec<Option<String>> = Vec::with_capacity(scanned.properties.len());
        let mut nested = Vec::new();
        for entry in std::mem::take(&mut scanned.properties) {
            let nav = match (self.model, type_name) {
                (Some(model), Some(t)) => model.navigation_property(t, &entry.name),
                _ => None,
            };
            let looks_like_nav = entry.annotation(NAVIGATION_LINK).is_some()
                || entry.annotation(BIND).is_some()
                || entry.annotation(ASSOCIATION_LINK).is_some();
            if nav.is_none() && !looks_like_nav {
                labels.push(Some(format!("Property:{}", entry.name)));
                let property = self.read_structural_property(entry, type_name, depth)?;
                resource.properties.push(property);
                resource.member_order.push(ODataResourceMember::Property);
                continue;
            }
            let association_only = entry.value.is_none()
                && entry.annotation(NAVIGATION_LINK).is_none()
                && entry.annotation(BIND).is_none()
                && entry.annotation(ASSOCIATION_LINK).is_some();
            if association_only {
                let mut entry = entry;
                let url = entry
                    .take_annotation(ASSOCIATION_LINK)
                    .map(|v| self.link(v, ASSOCIATION_LINK))
                    .transpose()?
                    .unwrap_or_default();
                labels.push(Some(format!("AssociationLink:{}", entry.name)));
                resource.association_links.push(ODataAssociationLink {
                    name: entry.name,
                    url,
                });
                resource.member_order.push(ODataResourceMember::AssociationLink);
                continue;
            }
            labels.push(Some(format!("NavigationLink:{}", entry.name)));
            nested.push(self.read_nested_info(entry, nav)?);
            resource.member_order.push(ODataResourceMember::NestedResourceInfo);
        }

        if self.settings.record_payload_order {
            let mut order = Vec::with_capacity(scanned.order.len());
            for entry in &scanned.order {
                match entry {
                    OrderEntry::Annotation(name) => order.push(name.clone()),
                    OrderEntry::Operation(name) => order.push(format!("Operation:{name}")),
                    OrderEntry::Member(idx) => {
                        if let Some(Some(label)) = labels.get(*idx) {
                            order.push(label.clone());
                        }
                    }
                }
            }
            resource.payload_order = Some(order);
        }

        Ok(ResourceParts { resource, nested })
    }

    fn read_operations(
        &self,
        resource: &mut ODataResource,
        key: String,
        value: JsonValue,
    ) -> Result<()> {
        let name = key.rsplit('#').next().unwrap_or_default();
        let kind = self
            .model
            .and_then(|m| m.find_operation(name))
            .map(|op| op.kind)
            .unwrap_or(EdmOperationKind::Action);
        let targets = match value {
            JsonValue::Array(items) => items,
            object @ JsonValue::Object(_) => vec![object],
            other => {
                return Err(ODataReaderError::protocol(format!(
                    "the operation '{key}' must be an object or an array but found {}",
                    other.kind_name()
                )))
            }
        };
        for target in targets {
            let JsonValue::Object(members) = target else {
                return Err(ODataReaderError::protocol(format!(
                    "the operation '{key}' must contain objects"
                )));
            };
            let mut operation = ODataOperation {
                metadata: key.clone(),
                title: None,
                target: None,
            };
            for (member, value) in members {
                match member.as_str() {
                    "title" => operation.title = Some(value.into_string("title")?),
                    "target" => operation.target = Some(self.link(value, "target")?),
                    other => {
                        return Err(ODataReaderError::protocol(format!(
                            "unexpected property '{other}' in operation '{key}'"
                        )))
                    }
                }
            }
            match kind {
                EdmOperationKind::Action => resource.actions.push(operation),
                EdmOperationKind::Function => resource.functions.push(operation),
            }
        }
        Ok(())
    }

    fn read_nested_info(
        &self,
        mut entry: ScannedProperty,
        nav: Option<&EdmNavigationProperty>,
    ) -> Result<PendingNestedInfo> {
        let mut info = ODataNestedResourceInfo {
            name: entry.name.clone(),
            is_collection: nav.map(|n| n.is_collection),
            ..Default::default()
        };
        if let Some(v) = entry.take_annotation(NAVIGATION_LINK) {
            info.url = Some(self.link(v, NAVIGATION_LINK)?);
        }
        if let Some(v) = entry.take_annotation(ASSOCIATION_LINK) {
            info.association_link_url = Some(self.link(v, ASSOCIATION_LINK)?);
        }
        let mut content = Vec::new();
        if let Some(bind) = entry.take_annotation(BIND) {
            match bind {
                JsonValue::String(url) => {
                    if info.is_collection == Some(true) {
                        return Err(ODataReaderError::protocol(format!(
                            "the odata.bind annotation of collection-valued navigation property '{}' must be an array",
                            info.name
                        )));
                    }
                    info.is_collection.get_or_insert(false);
                    content.push(NavContent::ReferenceLink(ODataEntityReferenceLink {
                        url: self.settings.resolve_link(&url)?,
                    }));
                }
                JsonValue::Array(urls) => {
                    if info.is_collection == Some(false) {
                        return Err(ODataReaderError::protocol(format!(
                            "the odata.bind annotation of single-valued navigation property '{}' must be a string",
                            info.name
                        )));
                    }
                    info.is_collection = Some(true);
                    for url in urls {
                        content.push(NavContent::ReferenceLink(ODataEntityReferenceLink {
                            url: self.link(url, BIND)?,
                        }));
                    }
                }
                other => {
                    return Err(ODataReaderError::protocol(format!(
                        "the odata.bind annotation must be a string or an array but found {}",
                        other.kind_name()
                    )))
                }
            }
        }
        let mut set = ODataResourceSet::default();
        if let Some(v) = entry.take_annotation(COUNT) {
            set.count = Some(v.expect_i64(COUNT, self.ieee754_compatible)?);
        }
        if let Some(v) = entry.take_annotation(NEXT_LINK) {
            set.next_page_link = Some(self.link(v, NEXT_LINK)?);
        }
        if let Some(v) = entry.take_annotation(DELTA_LINK) {
            set.delta_link = Some(self.link(v, DELTA_LINK)?);
        }
        for (annotation, _) in &entry.annotations {
            trace!(property = %info.name, %annotation, "ignoring navigation annotation");
        }
        match entry.value.take() {
            None => {}
            Some(JsonValue::Array(items)) => {
                if info.is_collection == Some(false) && nav.is_some() {
                    return Err(ODataReaderError::protocol(format!(
                        "a resource set was found for the single-valued navigation property '{}'",
                        info.name
                    )));
                }
                info.is_collection = Some(true);
                content.push(NavContent::ResourceSet { set, items });
            }
            Some(value @ (JsonValue::Object(_) | JsonValue::Null)) => {
                if nav.map(|n| n.is_collection).unwrap_or(false) {
                    return Err(ODataReaderError::protocol(format!(
                        "a single resource was found for the collection-valued navigation property '{}'",
                        info.name
                    )));
                }
                info.is_collection.get_or_insert(false);
                content.push(NavContent::Resource(value));
            }
            Some(other) => {
                return Err(ODataReaderError::protocol(format!(
                    "the navigation property '{}' has an invalid value of kind {}",
                    info.name,
                    other.kind_name()
                )))
            }
        }
        Ok(PendingNestedInfo {
            info,
            target_type: nav.map(|n| n.target.clone()),
            content,
        })
    }

    /// Decodes a top-level resource-set wrapper into its item and entries.
    pub fn read_resource_set_wrapper(
        &self,
        json: JsonValue,
    ) -> Result<(ODataResourceSet, Vec<JsonValue>)> {
        let members = expect_object(json, "resource set")?;
        let mut scanned = scan_object(members, self.settings)?;
        check_in_stream_error(&mut scanned)?;
        let mut set = ODataResourceSet::default();
        for (name, value) in std::mem::take(&mut scanned.instance_annotations) {
            match name.as_str() {
                COUNT => set.count = Some(value.expect_i64(COUNT, self.ieee754_compatible)?),
                NEXT_LINK => set.next_page_link = Some(self.link(value, NEXT_LINK)?),
                DELTA_LINK => set.delta_link = Some(self.link(value, DELTA_LINK)?),
                other => trace!(annotation = %other, "ignoring resource set annotation"),
            }
        }
        let value = scanned
            .take_property("value")
            .and_then(|p| p.value)
            .ok_or_else(|| {
                ODataReaderError::protocol("a resource set payload requires a 'value' property")
            })?;
        if let Some(extra) = scanned.properties.first() {
            return Err(ODataReaderError::protocol(format!(
                "unexpected property '{}' in a resource set payload",
                extra.name
            )));
        }
        match value {
            JsonValue::Array(items) => Ok((set, items)),
            other => Err(ODataReaderError::protocol(format!(
                "the 'value' of a resource set must be an array but found {}",
                other.kind_name()
            ))),
        }
    }

    /// Checks a top-level resource object for an in-stream error.
    pub fn check_top_level_resource(&self, json: &JsonValue) -> Result<()> {
        if let Some(members) = json.as_object() {
            if members.len() == 1 && members[0].0 == "error" {
                return Err(ODataReaderError::InStream(Box::new(read_error_body(
                    members[0].1.clone(),
                )?)));
            }
        }
        Ok(())
    }

    // ── Other payload kinds ───────────────────────────────────────────────

    pub fn read_entity_reference_link(&self, json: JsonValue) -> Result<ODataEntityReferenceLink> {
        let members = expect_object(json, "entity reference link")?;
        let mut url = None;
        for (name, value) in members {
            match name.as_str() {
                "@odata.id" => url = Some(self.link(value, "odata.id")?),
                "@odata.context" => {}
                other if other.starts_with('@') => {
                    trace!(annotation = %other, "ignoring entity reference link annotation")
                }
                other => {
                    return Err(ODataReaderError::protocol(format!(
                        "unexpected property '{other}' in an entity reference link"
                    )))
                }
            }
        }
        url.map(|url| ODataEntityReferenceLink { url })
            .ok_or_else(|| ODataReaderError::protocol("an entity reference link requires '@odata.id'"))
    }

    pub fn read_entity_reference_links(
        &self,
        json: JsonValue,
    ) -> Result<ODataEntityReferenceLinks> {
        let members = expect_object(json, "entity reference links")?;
        let mut links = ODataEntityReferenceLinks::default();
        let mut seen_value = false;
        for (name, value) in members {
            match name.as_str() {
                "value" => {
                    if seen_value {
                        return Err(ODataReaderError::DuplicateProperty { name });
                    }
                    seen_value = true;
                    let JsonValue::Array(items) = value else {
                        return Err(ODataReaderError::protocol(
                            "the 'value' of entity reference links must be an array",
                        ));
                    };
                    for item in items {
                        links.links.push(self.read_entity_reference_link(item)?);
                    }
                }
                "@odata.count" => links.count = Some(value.expect_i64(COUNT, self.ieee754_compatible)?),
                "@odata.nextLink" => links.next_page_link = Some(self.link(value, NEXT_LINK)?),
                other if other.starts_with('@') => {
                    trace!(annotation = %other, "ignoring entity reference links annotation")
                }
                other => {
                    return Err(ODataReaderError::protocol(format!(
                        "unexpected property '{other}' in entity reference links"
                    )))
                }
            }
        }
        if !seen_value {
            return Err(ODataReaderError::protocol(
                "entity reference links require a 'value' property",
            ));
        }
        Ok(links)
    }

    pub fn read_service_document(&self, json: JsonValue) -> Result<ODataServiceDocument> {
        let members = expect_object(json, "service document")?;
        let mut document = ODataServiceDocument::default();
        let mut value = None;
        for (name, member) in members {
            match name.as_str() {
                "@odata.context" => document.context_url = Some(member.into_string("odata.context")?),
                "value" => value = Some(member),
                other if other.starts_with('@') => {}
                other => {
                    return Err(ODataReaderError::protocol(format!(
                        "unexpected property '{other}' in a service document"
                    )))
                }
            }
        }
        let Some(JsonValue::Array(elements)) = value else {
            return Err(ODataReaderError::protocol(
                "a service document requires a 'value' array",
            ));
        };
        for element in elements {
            let members = expect_object(element, "service document element")?;
            let mut name = None;
            let mut url = None;
            let mut title = None;
            let mut kind = ServiceDocumentElementKind::EntitySet;
            for (key, value) in members {
                match key.as_str() {
                    "name" => name = Some(value.into_string("name")?),
                    "url" => url = Some(value.into_string("url")?),
                    "title" => title = Some(value.into_string("title")?),
                    "kind" => {
                        kind = match value.expect_str("kind")? {
                            "EntitySet" => ServiceDocumentElementKind::EntitySet,
                            "Singleton" => ServiceDocumentElementKind::Singleton,
                            "FunctionImport" => ServiceDocumentElementKind::FunctionImport,
                            other => {
                                return Err(ODataReaderError::protocol(format!(
                                    "unknown service document element kind '{other}'"
                                )))
                            }
                        }
                    }
                    other => trace!(member = %other, "ignoring service document member"),
                }
            }
            let (Some(name), Some(url)) = (name, url) else {
                return Err(ODataReaderError::protocol(
                    "service document elements require 'name' and 'url'",
                ));
            };
            document.elements.push(ODataServiceDocumentElement {
                kind,
                name,
                url,
                title,
            });
        }
        Ok(document)
    }

    /// Reads a top-level property payload.
    pub fn read_top_level_property(
        &self,
        json: JsonValue,
        name: &str,
        expected: Option<&EdmType>,
    ) -> Result<ODataProperty> {
        let is_complex = match expected {
            Some(EdmType::Complex(_)) => true,
            Some(_) => false,
            None => json.get("value").is_none(),
        };
        if is_complex {
            let JsonValue::Object(mut members) = json else {
                return Err(ODataReaderError::protocol("a property payload must be an object"));
            };
            members.retain(|(k, _)| k != "@odata.context");
            if members.iter().any(|(k, _)| k == "@odata.null") {
                return Ok(ODataProperty::new(name, ODataValue::Null));
            }
            let value = self.read_value(JsonValue::Object(members), expected, None, 1)?;
            return Ok(ODataProperty::new(name, value));
        }
        let members = expect_object(json, "property")?;
        let mut scanned = scan_object(members, self.settings)?;
        if let Some(JsonValue::Bool(true)) = scanned.instance_annotation("odata.null") {
            return Ok(ODataProperty::new(name, ODataValue::Null));
        }
        let type_annotation = match scanned.take_instance_annotation(TYPE) {
            Some(v) => Some(v.into_string(TYPE)?),
            None => None,
        };
        let mut value_entry = scanned
            .take_property("value")
            .ok_or_else(|| ODataReaderError::protocol("a property payload requires a 'value' property"))?;
        if let Some(extra) = scanned.properties.first() {
            return Err(ODataReaderError::protocol(format!(
                "unexpected property '{}' in a property payload",
                extra.name
            )));
        }
        let type_annotation = match value_entry.take_annotation(TYPE) {
            Some(v) => Some(v.into_string(TYPE)?),
            None => type_annotation,
        };
        let json = value_entry.value.take().ok_or_else(|| {
            ODataReaderError::protocol("a property payload requires a 'value' property")
        })?;
        let value = self.read_value(json, expected, type_annotation.as_deref(), 1)?;
        Ok(ODataProperty::new(name, value))
    }

    /// Reads one collection item of a top-level collection payload.
    pub fn read_collection_item(
        &self,
        json: JsonValue,
        item_type: Option<&EdmType>,
    ) -> Result<ODataValue> {
        if let JsonValue::Array(_) = json {
            return Err(ODataReaderError::NestedCollection {
                type_name: item_type
                    .map(|t| EdmType::collection(t.clone()).full_name())
                    .unwrap_or_else(|| "Collection(Collection)".to_string()),
            });
        }
        self.read_value(json, item_type, None, 1)
    }
}

pub(crate) fn expect_object(json: JsonValue, what: &str) -> Result<Vec<(String, JsonValue)>> {
    match json {
        JsonValue::Object(members) => Ok(members),
        other => Err(ODataReaderError::protocol(format!(
            "expected a {what} object but found {}",
            other.kind_name()
        ))),
    }
}

fn check_in_stream_error(scanned: &mut ScannedObject) -> Result<()> {
    if scanned.properties.len() == 1 && scanned.properties[0].name == "error" {
        if let Some(body) = scanned.properties[0].value.take() {
            return Err(ODataReaderError::InStream(Box::new(read_error_body(body)?)));
        }
    }
    Ok(())
}

/// Reads a `{"error": {...}}` document.
pub(crate) fn read_error_document(json: JsonValue) -> Result<ODataError> {
    let members = expect_object(json, "error document")?;
    let mut error = None;
    for (name, value) in members {
        match name.as_str() {
            "error" => {
                if error.is_some() {
                    return Err(ODataReaderError::DuplicateProperty { name });
                }
                error = Some(read_error_body(value)?);
            }
            other if other.starts_with('@') => {}
            other => {
                return Err(ODataReaderError::protocol(format!(
                    "unexpected property '{other}' in an error payload"
                )))
            }
        }
    }
    error.ok_or_else(|| ODataReaderError::protocol("an error payload requires an 'error' property"))
}

fn read_error_body(json: JsonValue) -> Result<ODataError> {
    let members = expect_object(json, "error")?;
    let mut error = ODataError::default();
    for (name, value) in members {
        match name.as_str() {
            "code" => error.code = Some(value.into_string("code")?),
            "message" => error.message = Some(value.into_string("message")?),
            "target" => error.target = Some(value.into_string("target")?),
            "details" => {
                let JsonValue::Array(items) = value else {
                    return Err(ODataReaderError::protocol("error 'details' must be an array"));
                };
                for item in items {
                    let mut detail = ODataErrorDetail::default();
                    for (key, v) in expect_object(item, "error detail")? {
                        match key.as_str() {
                            "code" => detail.code = Some(v.into_string("code")?),
                            "message" => detail.message = Some(v.into_string("message")?),
                            "target" => detail.target = Some(v.into_string("target")?),
                            _ => {}
                        }
                    }
                    error.details.push(detail);
                }
            }
            "innererror" => error.inner_error = Some(read_inner_error(value)?),
            other => trace!(member = %other, "ignoring error member"),
        }
    }
    Ok(error)
}

fn read_inner_error(json: JsonValue) -> Result<ODataInnerError> {
    let mut inner = ODataInnerError::default();
    for (name, value) in expect_object(json, "inner error")? {
        match name.as_str() {
            "message" => inner.message = Some(value.into_string("message")?),
            "type" => inner.type_name = Some(value.into_string("type")?),
            "stacktrace" => inner.stack_trace = Some(value.into_string("stacktrace")?),
            "internalexception" => {
                inner.internal_error = Some(Box::new(read_inner_error(value)?))
            }
            _ => {}
        }
    }
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> JsonValue {
        JsonValue::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn scan_groups_annotations_with_properties() {
        let settings = ODataReaderSettings::default();
        let members = expect_object(
            parse(r##"{"@odata.id":"x","Name@odata.type":"#Edm.String","Name":"n","#NS.Act":{}}"##),
            "t",
        )
        .unwrap();
        let scanned = scan_object(members, &settings).unwrap();
        assert_eq!(scanned.instance_annotations.len(), 1);
        assert_eq!(scanned.operations.len(), 1);
        assert_eq!(scanned.properties.len(), 1);
        assert_eq!(scanned.properties[0].annotations.len(), 1);
    }

    #[test]
    fn annotation_after_value_is_rejected() {
        let settings = ODataReaderSettings::default();
        let members = expect_object(parse(r##"{"Name":"n","Name@odata.type":"#Edm.String"}"##), "t")
            .unwrap();
        assert!(matches!(
            scan_object(members, &settings),
            Err(ODataReaderError::AnnotationAfterProperty { .. })
        ));
    }

    #[test]
    fn duplicate_replace_keeps_first_position() {
        let settings = ODataReaderSettings {
            allow_duplicate_property_names: true,
            ..Default::default()
        };
        let members = expect_object(parse(r#"{"A":1,"B":2,"A":3}"#), "t").unwrap();
        let scanned = scan_object(members, &settings).unwrap();
        let names: Vec<_> = scanned.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(
            scanned.properties[0].value,
            Some(JsonValue::Number(3.into()))
        );
    }

    #[test]
    fn error_document_with_inner_error() {
        let error = read_error_document(parse(
            r#"{"error":{"code":"400","message":"bad","innererror":{"message":"m","internalexception":{"type":"T"}}}}"#,
        ))
        .unwrap();
        assert_eq!(error.code.as_deref(), Some("400"));
        let inner = error.inner_error.unwrap();
        assert_eq!(
            inner.internal_error.unwrap().type_name.as_deref(),
            Some("T")
        );
    }
}
