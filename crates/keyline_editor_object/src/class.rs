// SPDX-License-Identifier: MIT OR Apache-2.0
//! Class descriptors and the polymorphic type registry.
//!
//! An [`ObjectClass`] describes one concrete object kind: its name (used as
//! the wire discriminator), its property declarations, per-class default
//! overrides, an optional storable spec and a factory. Classes form a
//! single-inheritance chain of property lists. The [`ClassRegistry`] maps
//! discriminator names back to classes for instantiation during reading.

use crate::id::ObjectId;
use crate::object::Object;
use crate::property::{PropertyDef, PropertyId};
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Marks a class as independently persistable.
#[derive(Debug, Clone, Copy)]
pub struct StorableSpec {
    /// File extension for units of this kind, without the leading dot.
    pub extension: &'static str,
}

/// Descriptor of one concrete object kind.
pub struct ObjectClass {
    name: &'static str,
    parent: Option<&'static ObjectClass>,
    own_properties: Vec<&'static PropertyDef>,
    default_overrides: HashMap<PropertyId, Value>,
    storable: Option<StorableSpec>,
    factory: Option<fn() -> Object>,
}

impl ObjectClass {
    /// Start describing a class.
    pub fn builder(name: &'static str) -> ClassBuilder {
        ClassBuilder {
            name,
            parent: None,
            properties: Vec::new(),
            overrides: Vec::new(),
            storable: None,
            factory: None,
        }
    }

    /// Class name, used as the wire discriminator.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parent class, if any.
    pub fn parent(&self) -> Option<&'static ObjectClass> {
        self.parent
    }

    /// Storable spec when units of this class persist to their own file.
    pub fn storable(&self) -> Option<&StorableSpec> {
        self.storable.as_ref()
    }

    /// Check whether units of this class own a persistent location.
    pub fn is_storable(&self) -> bool {
        self.storable.is_some()
    }

    /// All property declarations, inherited first, in declaration order.
    pub fn properties(&self) -> Vec<&'static PropertyDef> {
        let mut out = match self.parent {
            Some(parent) => parent.properties(),
            None => Vec::new(),
        };
        out.extend(self.own_properties.iter().copied());
        out
    }

    /// Look up a property declaration by name, including inherited ones.
    pub fn find_property(&self, name: &str) -> Option<&'static PropertyDef> {
        self.own_properties
            .iter()
            .copied()
            .find(|def| def.name() == name)
            .or_else(|| self.parent.and_then(|p| p.find_property(name)))
    }

    /// Effective default for a property on this class.
    ///
    /// Walks the override chain from this class up before falling back to
    /// the declaration's own default.
    pub fn default_for(&self, def: &PropertyDef) -> Value {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(value) = current.default_overrides.get(&def.id()) {
                return value.clone();
            }
            class = current.parent;
        }
        def.default_value().clone()
    }

    /// Check whether this class is `other` or derives from it.
    pub fn derives_from(&self, other: &ObjectClass) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if std::ptr::eq(current, other) {
                return true;
            }
            class = current.parent;
        }
        false
    }

    /// Create a fresh instance of this class.
    ///
    /// Uses the registered factory when present, otherwise a bare object
    /// with a new id and all defaults.
    pub fn instantiate(&'static self) -> Object {
        match self.factory {
            Some(factory) => factory(),
            None => Object::new(self),
        }
    }

    /// Create an instance carrying a specific id.
    pub fn instantiate_with_id(&'static self, id: ObjectId) -> Object {
        let object = self.instantiate();
        object.set_id(id);
        object
    }
}

impl std::fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("parent", &self.parent.map(ObjectClass::name))
            .field("storable", &self.storable)
            .finish()
    }
}

/// Builder for an [`ObjectClass`].
pub struct ClassBuilder {
    name: &'static str,
    parent: Option<&'static ObjectClass>,
    properties: Vec<&'static PropertyDef>,
    overrides: Vec<(&'static PropertyDef, Value)>,
    storable: Option<StorableSpec>,
    factory: Option<fn() -> Object>,
}

impl ClassBuilder {
    /// Inherit the property list of a parent class.
    pub fn inherit(mut self, parent: &'static ObjectClass) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declare a property on this class.
    pub fn property(mut self, def: &'static PropertyDef) -> Self {
        self.properties.push(def);
        self
    }

    /// Override the default of an inherited property for this class.
    pub fn override_default(mut self, def: &'static PropertyDef, value: Value) -> Self {
        self.overrides.push((def, value));
        self
    }

    /// Mark units of this class as independently persistable.
    pub fn storable(mut self, extension: &'static str) -> Self {
        self.storable = Some(StorableSpec { extension });
        self
    }

    /// Install a custom factory.
    pub fn factory(mut self, factory: fn() -> Object) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Finish the class. Panics on duplicate property names (including
    /// inherited ones) or on a default override of the wrong kind; both
    /// are programmer errors in the class declaration.
    pub fn build(self) -> ObjectClass {
        let class = ObjectClass {
            name: self.name,
            parent: self.parent,
            own_properties: self.properties,
            default_overrides: self
                .overrides
                .into_iter()
                .map(|(def, value)| {
                    assert!(
                        value.fits(def.kind()),
                        "default override for `{}.{}` has kind {:?}, expected {}",
                        self.name,
                        def.name(),
                        value.kind(),
                        def.kind(),
                    );
                    (def.id(), value)
                })
                .collect(),
            storable: self.storable,
            factory: self.factory,
        };

        let mut seen = std::collections::HashSet::new();
        for def in class.properties() {
            assert!(
                seen.insert(def.name()),
                "duplicate property `{}` on class `{}`",
                def.name(),
                class.name,
            );
        }
        class
    }
}

/// Registry of classes keyed by discriminator name.
pub struct ClassRegistry {
    classes: RwLock<IndexMap<&'static str, &'static ObjectClass>>,
}

impl ClassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(IndexMap::new()),
        }
    }

    /// The process-wide registry used by document reading.
    pub fn global() -> &'static ClassRegistry {
        static GLOBAL: Lazy<ClassRegistry> = Lazy::new(ClassRegistry::new);
        &GLOBAL
    }

    /// Register a class under its name.
    pub fn register(&self, class: &'static ObjectClass) {
        self.classes.write().insert(class.name(), class);
    }

    /// Look up a class by discriminator name.
    pub fn get(&self, name: &str) -> Option<&'static ObjectClass> {
        self.classes.read().get(name).copied()
    }

    /// Instantiate a class by discriminator name.
    pub fn instantiate(&self, name: &str) -> Option<Object> {
        self.get(name).map(ObjectClass::instantiate)
    }

    /// Names of all registered classes, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.classes.read().keys().copied().collect()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
