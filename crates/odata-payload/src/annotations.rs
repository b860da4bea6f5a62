//! Side-channel facts attached to payload elements.

use odata_edm::EdmType;

/// The closed set of annotation kinds. A node holds at most one annotation
/// of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    CollectionName,
    EntityModelType,
    PayloadOrder,
    SerializationTypeName,
    ContentType,
}

impl AnnotationKind {
    const COUNT: usize = 5;

    fn slot(self) -> usize {
        match self {
            Self::CollectionName => 0,
            Self::EntityModelType => 1,
            Self::PayloadOrder => 2,
            Self::SerializationTypeName => 3,
            Self::ContentType => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Name of a top-level collection, where the wire format carries one.
    CollectionName(String),
    /// Schema type the element was read against.
    EntityModelType(EdmType),
    /// Order in which items of a resource were observed on the wire.
    PayloadOrder(Vec<String>),
    /// Type name as serialized (`None` when the wire omitted it).
    SerializationTypeName(Option<String>),
    ContentType(String),
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::CollectionName(_) => AnnotationKind::CollectionName,
            Self::EntityModelType(_) => AnnotationKind::EntityModelType,
            Self::PayloadOrder(_) => AnnotationKind::PayloadOrder,
            Self::SerializationTypeName(_) => AnnotationKind::SerializationTypeName,
            Self::ContentType(_) => AnnotationKind::ContentType,
        }
    }
}

/// Fixed-capacity annotation bag, one slot per [`AnnotationKind`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Annotations {
    slots: [Option<Annotation>; AnnotationKind::COUNT],
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn get(&self, kind: AnnotationKind) -> Option<&Annotation> {
        self.slots[kind.slot()].as_ref()
    }

    pub fn get_mut(&mut self, kind: AnnotationKind) -> Option<&mut Annotation> {
        self.slots[kind.slot()].as_mut()
    }

    /// Stores `annotation`, returning the one of the same kind it replaced.
    pub fn set(&mut self, annotation: Annotation) -> Option<Annotation> {
        let slot = annotation.kind().slot();
        self.slots[slot].replace(annotation)
    }

    pub fn remove(&mut self, kind: AnnotationKind) -> Option<Annotation> {
        self.slots[kind.slot()].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.slots.iter().flatten()
    }

    pub fn collection_name(&self) -> Option<&str> {
        match self.get(AnnotationKind::CollectionName)? {
            Annotation::CollectionName(name) => Some(name),
            _ => None,
        }
    }

    pub fn model_type(&self) -> Option<&EdmType> {
        match self.get(AnnotationKind::EntityModelType)? {
            Annotation::EntityModelType(t) => Some(t),
            _ => None,
        }
    }

    pub fn payload_order(&self) -> Option<&[String]> {
        match self.get(AnnotationKind::PayloadOrder)? {
            Annotation::PayloadOrder(order) => Some(order),
            _ => None,
        }
    }
}

impl FromIterator<Annotation> for Annotations {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        let mut bag = Self::new();
        for annotation in iter {
            bag.set(annotation);
        }
        bag
    }
}
