// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property descriptors.
//!
//! Declaring a property fixes its name, semantic type, default value and
//! attributes once per owner class. Subclasses may override only the
//! default, registered on their [`crate::ObjectClass`] rather than by
//! re-declaring the property. The typed [`Property`] handle makes get/set
//! statically type-checked; the untyped [`PropertyDef`] is what classes,
//! serializers and codecs work with.

use crate::value::{PropertyValue, Value, ValueKind};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_PROPERTY_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique identifier for a property declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(u32);

/// Validation rule attached to a property.
///
/// An optional coercion step runs first (e.g. clamping), then the check.
/// A check returning `Some(message)` rejects the value.
#[derive(Clone)]
pub struct Validator {
    coerce: Option<Arc<dyn Fn(Value) -> Value + Send + Sync>>,
    check: Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>,
}

impl Validator {
    /// Create a validator from a check function.
    pub fn new(
        check: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            coerce: None,
            check: Arc::new(check),
        }
    }

    /// Add a coercion step that runs before the check.
    pub fn with_coerce(
        mut self,
        coerce: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.coerce = Some(Arc::new(coerce));
        self
    }

    /// A validator that clamps float values into `[min, max]`.
    pub fn clamp_float(min: f64, max: f64) -> Self {
        Self::new(|_| None).with_coerce(move |value| match value {
            Value::Float(v) => Value::Float(v.clamp(min, max)),
            other => other,
        })
    }

    /// Run coercion and check, returning the stored value or a message.
    pub fn apply(&self, value: Value) -> Result<Value, String> {
        let value = match &self.coerce {
            Some(coerce) => coerce(value),
            None => value,
        };
        match (self.check)(&value) {
            None => Ok(value),
            Some(message) => Err(message),
        }
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Validator")
    }
}

/// Untyped property declaration.
#[derive(Debug)]
pub struct PropertyDef {
    id: PropertyId,
    name: &'static str,
    owner: &'static str,
    kind: ValueKind,
    default: Value,
    transient: bool,
    codec: Option<&'static str>,
    validator: Option<Validator>,
    declared_class: Option<&'static str>,
}

impl PropertyDef {
    /// Process-unique id of this declaration.
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Property name, unique within the declaring class and its ancestors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the declaring class.
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// Semantic type of the property.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Base default value; subclasses may override it on their class.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether the property is excluded from serialization.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Key of the custom codec handling this property, if any.
    pub fn codec(&self) -> Option<&'static str> {
        self.codec
    }

    /// Validation rule, if any.
    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Declared class of object-typed values (also used for list elements).
    ///
    /// When the concrete class of a serialized value differs from this, a
    /// type discriminator is written alongside the node.
    pub fn declared_class(&self) -> Option<&'static str> {
        self.declared_class
    }
}

/// Typed handle to a property declaration.
pub struct Property<T> {
    def: PropertyDef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PropertyValue> Property<T> {
    /// Start declaring a property on `owner`.
    pub fn builder(name: &'static str, owner: &'static str) -> PropertyBuilder<T> {
        PropertyBuilder {
            name,
            owner,
            default: None,
            transient: false,
            codec: None,
            validator: None,
            declared_class: None,
            _marker: PhantomData,
        }
    }

    /// Untyped declaration backing this handle.
    pub fn def(&self) -> &PropertyDef {
        &self.def
    }
}

impl<T> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property").field("def", &self.def).finish()
    }
}

/// Builder for a property declaration.
pub struct PropertyBuilder<T> {
    name: &'static str,
    owner: &'static str,
    default: Option<Value>,
    transient: bool,
    codec: Option<&'static str>,
    validator: Option<Validator>,
    declared_class: Option<&'static str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PropertyValue> PropertyBuilder<T> {
    /// Set the default value.
    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value.into_value());
        self
    }

    /// Exclude the property from serialization.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Route the property through a custom codec registered under `key`.
    pub fn codec(mut self, key: &'static str) -> Self {
        self.codec = Some(key);
        self
    }

    /// Attach a validation rule.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Declare the class of object-typed values (and list elements).
    pub fn declared_class(mut self, class_name: &'static str) -> Self {
        self.declared_class = Some(class_name);
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Property<T> {
        let default = self
            .default
            .unwrap_or_else(|| kind_default(T::KIND));
        Property {
            def: PropertyDef {
                id: PropertyId(NEXT_PROPERTY_ID.fetch_add(1, Ordering::Relaxed)),
                name: self.name,
                owner: self.owner,
                kind: T::KIND,
                default,
                transient: self.transient,
                codec: self.codec,
                validator: self.validator,
                declared_class: self.declared_class,
            },
            _marker: PhantomData,
        }
    }
}

/// Built-in default for a kind when the declaration does not provide one.
fn kind_default(kind: ValueKind) -> Value {
    match kind {
        ValueKind::Bool => Value::Bool(false),
        ValueKind::Int => Value::Int(0),
        ValueKind::Float => Value::Float(0.0),
        ValueKind::String => Value::String(String::new()),
        ValueKind::List => Value::List(Vec::new()),
        ValueKind::Map => Value::Map(indexmap::IndexMap::new()),
        ValueKind::Blob => Value::Blob(crate::value::Blob::empty()),
        ValueKind::Object => Value::Null,
        ValueKind::Reference => Value::Reference(crate::reference::Reference::null()),
    }
}
