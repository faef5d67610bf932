// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property values.
//!
//! Every property holds a [`Value`], a closed tagged union mirroring the
//! document node model: typed leaves, ordered lists, keyed maps, binary
//! blobs, owned child objects and id-based reference tokens.

use crate::object::Object;
use crate::reference::Reference;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Semantic type of a property, fixed when the property is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Double-precision float.
    Float,
    /// UTF-8 string.
    String,
    /// Ordered list of values.
    List,
    /// Keyed map of values.
    Map,
    /// Binary payload.
    Blob,
    /// Owned child object.
    Object,
    /// Id-based reference token.
    Reference,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Blob => "blob",
            ValueKind::Object => "object",
            ValueKind::Reference => "reference",
        };
        write!(f, "{name}")
    }
}

/// Binary payload carried by a property.
///
/// A blob is either held inline in memory or points at an external sidecar
/// file written next to the owning document. External blobs are read back
/// through the document crate's file-system abstraction.
#[derive(Debug, Clone)]
pub enum Blob {
    /// Bytes held in memory.
    Inline(Arc<Vec<u8>>),
    /// Bytes stored in a sidecar file, relative to the owning document.
    External {
        /// Path of the sidecar file, relative to the owning document.
        path: PathBuf,
        /// Size of the payload in bytes.
        size: u64,
    },
}

impl Blob {
    /// Create an inline blob from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Inline(Arc::new(bytes.into()))
    }

    /// Create an empty inline blob.
    pub fn empty() -> Self {
        Self::Inline(Arc::new(Vec::new()))
    }

    /// Payload size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Blob::Inline(bytes) => bytes.len() as u64,
            Blob::External { size, .. } => *size,
        }
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the bytes if they are held inline.
    pub fn inline_bytes(&self) -> Option<&[u8]> {
        match self {
            Blob::Inline(bytes) => Some(bytes),
            Blob::External { .. } => None,
        }
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Blob::Inline(a), Blob::Inline(b)) => a == b,
            (
                Blob::External { path: pa, size: sa },
                Blob::External { path: pb, size: sb },
            ) => pa == pb && sa == sb,
            _ => false,
        }
    }
}

/// A property value.
///
/// Object-valued entries own their target; reference-valued entries carry
/// an id token resolved lazily against the object registry. Equality on
/// objects is identity equality; use [`Object::content_equals`] for deep
/// comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit absence.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Keyed map of values.
    Map(IndexMap<String, Value>),
    /// Binary payload.
    Blob(Blob),
    /// Owned child object.
    Object(Object),
    /// Id-based reference token.
    Reference(Reference),
}

impl Value {
    /// Semantic kind of this value, `None` for [`Value::Null`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::String(_) => Some(ValueKind::String),
            Value::List(_) => Some(ValueKind::List),
            Value::Map(_) => Some(ValueKind::Map),
            Value::Blob(_) => Some(ValueKind::Blob),
            Value::Object(_) => Some(ValueKind::Object),
            Value::Reference(_) => Some(ValueKind::Reference),
        }
    }

    /// Check whether this value can be stored in a slot of `kind`.
    ///
    /// `Null` fits every kind. A reference token fits an object-typed slot:
    /// back-references produced by cycle-safe serialization and plain
    /// reference-mode nodes land in object slots as tokens.
    pub fn fits(&self, kind: ValueKind) -> bool {
        match self.kind() {
            None => true,
            Some(ValueKind::Reference) => {
                kind == ValueKind::Reference || kind == ValueKind::Object
            }
            Some(own) => own == kind,
        }
    }

    /// Check for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the contained object, if any.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the contained reference token, if any.
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Deep equality that compares owned objects by content rather than
    /// identity. References compare by id, blobs by payload.
    pub fn content_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.content_equals(b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.content_equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, x)| {
                        b.get(k).is_some_and(|y| x.content_equals(y))
                    })
            }
            (a, b) => a == b,
        }
    }

    /// Collect the objects directly owned by this value.
    ///
    /// Walks lists and maps but does not descend into owned objects.
    pub fn owned_objects(&self, out: &mut Vec<Object>) {
        match self {
            Value::Object(obj) => out.push(obj.clone()),
            Value::List(items) => {
                for item in items {
                    item.owned_objects(out);
                }
            }
            Value::Map(entries) => {
                for item in entries.values() {
                    item.owned_objects(out);
                }
            }
            _ => {}
        }
    }
}

/// Conversion between Rust types and property values.
///
/// Implemented for the closed set of semantic types; the typed
/// [`crate::Property`] API uses it so that storing a value of the wrong
/// semantic type fails to compile.
pub trait PropertyValue: Sized {
    /// Semantic kind this type maps to.
    const KIND: ValueKind;

    /// Wrap into a [`Value`].
    fn into_value(self) -> Value;

    /// Unwrap from a [`Value`], `None` on kind mismatch.
    fn from_value(value: Value) -> Option<Self>;
}

impl PropertyValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl PropertyValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for Vec<Value> {
    const KIND: ValueKind = ValueKind::List;

    fn into_value(self) -> Value {
        Value::List(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for IndexMap<String, Value> {
    const KIND: ValueKind = ValueKind::Map;

    fn into_value(self) -> Value {
        Value::Map(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for Blob {
    const KIND: ValueKind = ValueKind::Blob;

    fn into_value(self) -> Value {
        Value::Blob(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyValue for Object {
    const KIND: ValueKind = ValueKind::Object;

    fn into_value(self) -> Value {
        Value::Object(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }
}

/// Object slot that may be empty. Declare object-typed properties through
/// this when absence is meaningful; `None` maps to the null sentinel.
impl PropertyValue for Option<Object> {
    const KIND: ValueKind = ValueKind::Object;

    fn into_value(self) -> Value {
        match self {
            Some(object) => Value::Object(object),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(v) => Some(Some(v)),
            Value::Null => Some(None),
            _ => None,
        }
    }
}

impl PropertyValue for Reference {
    const KIND: ValueKind = ValueKind::Reference;

    fn into_value(self) -> Value {
        Value::Reference(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Reference(v) => Some(v),
            Value::Null => Some(Reference::null()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_checks() {
        assert!(Value::Null.fits(ValueKind::Float));
        assert!(Value::Int(3).fits(ValueKind::Int));
        assert!(!Value::Int(3).fits(ValueKind::Float));
        assert!(Value::Reference(Reference::null()).fits(ValueKind::Object));
    }

    #[test]
    fn test_float_accepts_int() {
        assert_eq!(f64::from_value(Value::Int(2)), Some(2.0));
    }

    #[test]
    fn test_blob_equality() {
        let a = Blob::from_bytes(vec![1, 2, 3]);
        let b = Blob::from_bytes(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, Blob::empty());
    }
}
