//! Primitive kinds and type references.

use std::fmt;
use std::str::FromStr;

use crate::EdmError;

const COLLECTION_PREFIX: &str = "Collection(";

/// Built-in `Edm.*` primitive kinds understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdmPrimitiveKind {
    Binary,
    Boolean,
    Byte,
    Date,
    DateTimeOffset,
    Decimal,
    Double,
    Duration,
    Guid,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    Stream,
    String,
    TimeOfDay,
}

impl EdmPrimitiveKind {
    pub const ALL: [EdmPrimitiveKind; 17] = [
        Self::Binary,
        Self::Boolean,
        Self::Byte,
        Self::Date,
        Self::DateTimeOffset,
        Self::Decimal,
        Self::Double,
        Self::Duration,
        Self::Guid,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::SByte,
        Self::Single,
        Self::Stream,
        Self::String,
        Self::TimeOfDay,
    ];

    /// Qualified name, e.g. `Edm.Int32`.
    pub fn full_name(self) -> &'static str {
        match self {
            Self::Binary => "Edm.Binary",
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::Date => "Edm.Date",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::Decimal => "Edm.Decimal",
            Self::Double => "Edm.Double",
            Self::Duration => "Edm.Duration",
            Self::Guid => "Edm.Guid",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::SByte => "Edm.SByte",
            Self::Single => "Edm.Single",
            Self::Stream => "Edm.Stream",
            Self::String => "Edm.String",
            Self::TimeOfDay => "Edm.TimeOfDay",
        }
    }

    /// Looks up a primitive kind by qualified name.
    pub fn from_full_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.full_name() == name)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::SByte | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Self::Single | Self::Double)
    }
}

impl fmt::Display for EdmPrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// A reference to a type: primitive, named structured type or collection.
///
/// Structured types are referenced by qualified name; whether a name resolves
/// is a question for [`crate::EdmModel`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdmType {
    Primitive(EdmPrimitiveKind),
    Complex(String),
    Entity(String),
    Collection(Box<EdmType>),
}

impl EdmType {
    pub fn collection(item: EdmType) -> Self {
        Self::Collection(Box::new(item))
    }

    /// Canonical qualified name; collections print as `Collection(<item>)`.
    pub fn full_name(&self) -> String {
        match self {
            Self::Primitive(kind) => kind.full_name().to_string(),
            Self::Complex(name) | Self::Entity(name) => name.clone(),
            Self::Collection(item) => format!("{COLLECTION_PREFIX}{})", item.full_name()),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    pub fn item_type(&self) -> Option<&EdmType> {
        match self {
            Self::Collection(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<EdmPrimitiveKind> {
        match self {
            Self::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Parses a type name without a model.
    ///
    /// `Edm.*` names become primitives; every other qualified name is assumed
    /// to be complex. Use [`crate::EdmModel::find_type`] to classify names
    /// against a schema.
    pub fn parse(name: &str) -> Result<Self, EdmError> {
        match split_collection(name)? {
            Some(inner) => Ok(Self::collection(Self::parse(inner)?)),
            None => {
                let name = name.trim();
                if let Some(kind) = EdmPrimitiveKind::from_full_name(name) {
                    return Ok(Self::Primitive(kind));
                }
                if name.starts_with("Edm.") {
                    return Err(EdmError::UnknownPrimitive(name.to_string()));
                }
                if !is_qualified_name(name) {
                    return Err(EdmError::InvalidTypeName(name.to_string()));
                }
                Ok(Self::Complex(name.to_string()))
            }
        }
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for EdmType {
    type Err = EdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<EdmPrimitiveKind> for EdmType {
    fn from(kind: EdmPrimitiveKind) -> Self {
        Self::Primitive(kind)
    }
}

/// Returns the inner name of `Collection(...)`, or `None` for a plain name.
pub(crate) fn split_collection(name: &str) -> Result<Option<&str>, EdmError> {
    let name = name.trim();
    match name.strip_prefix(COLLECTION_PREFIX) {
        Some(rest) => match rest.strip_suffix(')') {
            Some(inner) if !inner.trim().is_empty() => Ok(Some(inner.trim())),
            _ => Err(EdmError::InvalidTypeName(name.to_string())),
        },
        None => Ok(None),
    }
}

fn is_qualified_name(name: &str) -> bool {
    let mut segments = 0;
    for segment in name.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_and_collection_names() {
        assert_eq!(
            EdmType::parse("Edm.Int32").unwrap(),
            EdmType::Primitive(EdmPrimitiveKind::Int32)
        );
        let nested = EdmType::parse("Collection(Collection(Edm.Int32))").unwrap();
        assert_eq!(nested.full_name(), "Collection(Collection(Edm.Int32))");
        assert!(nested.item_type().unwrap().is_collection());
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(matches!(
            EdmType::parse("Collection(Edm.Int32"),
            Err(EdmError::InvalidTypeName(_))
        ));
        assert!(matches!(
            EdmType::parse("Edm.Nope"),
            Err(EdmError::UnknownPrimitive(_))
        ));
        assert!(EdmType::parse("NoNamespace").is_err());
    }

    #[test]
    fn unknown_qualified_name_defaults_to_complex() {
        assert_eq!(
            EdmType::parse("NS.Address").unwrap(),
            EdmType::Complex("NS.Address".into())
        );
    }
}
