// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifiable objects.
//!
//! An [`Object`] is a shared handle to one domain entity: a stable id, a
//! class descriptor, a typed property bag, a weak link to its hierarchical
//! parent and strong ownership of its children. Property changes emit
//! structured `(property, old, new)` notifications to subscribed listeners.
//!
//! Containment is acyclic: setting an object-valued property adopts the
//! target as a hierarchical child only when the target is unparented and
//! adoption would not create a cycle; otherwise the value is stored as a
//! plain link. Attach registers the attached subtree with the process-wide
//! registry, detach unregisters it.

use crate::class::ObjectClass;
use crate::id::ObjectId;
use crate::property::{Property, PropertyDef, PropertyId};
use crate::registry::ObjectRegistry;
use crate::value::{PropertyValue, Value, ValueKind};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Errors from property and hierarchy operations.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The value's semantic kind does not match the declaration.
    #[error("value of kind {actual:?} cannot be assigned to `{property}` ({expected})")]
    KindMismatch {
        /// Property name.
        property: &'static str,
        /// Declared kind.
        expected: ValueKind,
        /// Kind of the rejected value, `None` for null.
        actual: Option<ValueKind>,
    },

    /// The property's validation rule rejected the value.
    #[error("property `{property}` rejected value: {message}")]
    Validation {
        /// Property name.
        property: &'static str,
        /// Message produced by the validator.
        message: String,
    },

    /// Attaching would make an object its own ancestor.
    #[error("attaching {child} under {parent} would create a containment cycle")]
    ContainmentCycle {
        /// Id of the child being attached.
        child: ObjectId,
        /// Id of the would-be parent.
        parent: ObjectId,
    },
}

/// Structured change notification delivered to listeners.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// The object whose property changed.
    pub object: Object,
    /// The changed property.
    pub property: &'static PropertyDef,
    /// Value before the change.
    pub old: Value,
    /// Value after the change.
    pub new: Value,
}

type Listener = Arc<dyn Fn(&PropertyChange) + Send + Sync>;

/// Handle returned by [`Object::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy)]
pub struct Subscription(usize);

struct ObjectState {
    id: ObjectId,
    parent: Option<WeakObject>,
    children: Vec<Object>,
    values: IndexMap<PropertyId, Value>,
    uri: Option<PathBuf>,
    dirty: bool,
    registered: bool,
}

struct ObjectInner {
    class: &'static ObjectClass,
    state: RwLock<ObjectState>,
    listeners: RwLock<Vec<Option<Listener>>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.registered {
            ObjectRegistry::global().reclaim(state.id);
        }
    }
}

/// Strong handle to an identifiable object.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

/// Weak handle to an identifiable object.
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// Upgrade to a strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    /// Check whether two weak handles point at the same object.
    pub fn ptr_eq(&self, other: &WeakObject) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl std::fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakObject")
    }
}

impl Object {
    /// Create a fresh object of `class` with a new id and all defaults.
    pub fn new(class: &'static ObjectClass) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                class,
                state: RwLock::new(ObjectState {
                    id: ObjectId::new(),
                    parent: None,
                    children: Vec::new(),
                    values: IndexMap::new(),
                    uri: None,
                    dirty: true,
                    registered: false,
                }),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Stable id of this object.
    pub fn id(&self) -> ObjectId {
        self.inner.state.read().id
    }

    /// Reassign the id.
    ///
    /// Only intended for cross-document merge. When the object is
    /// registered, the registry mapping moves to the new id and any
    /// resolutions pending under it fire.
    pub fn set_id(&self, id: ObjectId) {
        let (old, registered) = {
            let mut state = self.inner.state.write();
            let old = state.id;
            state.id = id;
            (old, state.registered)
        };
        if registered && old != id {
            ObjectRegistry::global().reassign(old, id, self);
        }
    }

    /// Class descriptor of this object.
    pub fn class(&self) -> &'static ObjectClass {
        self.inner.class
    }

    /// Check whether this object can persist to its own file.
    pub fn is_storable(&self) -> bool {
        self.inner.class.is_storable()
    }

    /// Persistent location, when assigned.
    pub fn uri(&self) -> Option<PathBuf> {
        self.inner.state.read().uri.clone()
    }

    /// Assign or clear the persistent location.
    pub fn set_uri(&self, uri: Option<PathBuf>) {
        self.inner.state.write().uri = uri;
    }

    /// Downgrade to a weak handle.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    /// Current value of a property declaration.
    ///
    /// Falls back to the class default when the instance holds no explicit
    /// value.
    pub fn raw_value(&self, def: &PropertyDef) -> Value {
        let state = self.inner.state.read();
        match state.values.get(&def.id()) {
            Some(value) => value.clone(),
            None => self.inner.class.default_for(def),
        }
    }

    /// Typed property read.
    pub fn get<T: PropertyValue>(&self, property: &Property<T>) -> T {
        let def = property.def();
        T::from_value(self.raw_value(def)).unwrap_or_else(|| {
            T::from_value(self.inner.class.default_for(def))
                .expect("class default matches the declared property kind")
        })
    }

    /// Typed property write.
    ///
    /// The semantic kind is guaranteed by the type system; the validation
    /// rule can still reject the value.
    pub fn set<T: PropertyValue>(
        &self,
        property: &'static Property<T>,
        value: T,
    ) -> Result<(), ObjectError> {
        self.set_raw(property.def(), value.into_value())
    }

    /// Untyped property write, used by deserialization and codecs.
    ///
    /// Checks the semantic kind, applies the validation rule, adopts newly
    /// owned objects, releases previously owned ones and notifies
    /// listeners when the stored value changed.
    pub fn set_raw(
        &self,
        def: &'static PropertyDef,
        value: Value,
    ) -> Result<(), ObjectError> {
        if !value.fits(def.kind()) {
            return Err(ObjectError::KindMismatch {
                property: def.name(),
                expected: def.kind(),
                actual: value.kind(),
            });
        }
        let value = match def.validator() {
            Some(validator) => {
                validator
                    .apply(value)
                    .map_err(|message| ObjectError::Validation {
                        property: def.name(),
                        message,
                    })?
            }
            None => value,
        };

        let old = {
            let mut state = self.inner.state.write();
            let old = match state.values.get(&def.id()) {
                Some(value) => value.clone(),
                None => self.inner.class.default_for(def),
            };
            if old == value {
                return Ok(());
            }
            state.values.insert(def.id(), value.clone());
            state.dirty = true;
            old
        };

        self.rebind_owned(&old, &value);
        self.mark_ancestors_dirty();
        self.notify(PropertyChange {
            object: self.clone(),
            property: def,
            old,
            new: value,
        });
        Ok(())
    }

    /// Reset a property to its class default.
    pub fn clear(&self, def: &'static PropertyDef) {
        let default = self.inner.class.default_for(def);
        // Kind and validation both hold for the declared default.
        let _ = self.set_raw(def, default);
    }

    /// Release objects owned by the old value and adopt ones owned by the
    /// new value.
    fn rebind_owned(&self, old: &Value, new: &Value) {
        let mut old_objects = Vec::new();
        old.owned_objects(&mut old_objects);
        let mut new_objects = Vec::new();
        new.owned_objects(&mut new_objects);

        for previous in &old_objects {
            let kept = new_objects.iter().any(|o| o == previous);
            if !kept && previous.parent().as_ref() == Some(self) {
                self.detach_child(previous);
            }
        }
        for adopted in new_objects {
            if &adopted == self {
                continue;
            }
            if adopted.parent().is_none() && !adopted.is_ancestor_of(self) {
                // Unparented and acyclic: containment edge.
                let _ = self.attach_child(&adopted);
            }
        }
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Hierarchical parent, if attached and alive.
    pub fn parent(&self) -> Option<Object> {
        self.inner
            .state
            .read()
            .parent
            .as_ref()
            .and_then(WeakObject::upgrade)
    }

    /// Strongly owned hierarchical children.
    pub fn children(&self) -> Vec<Object> {
        self.inner.state.read().children.clone()
    }

    /// Root of the containment tree this object belongs to.
    pub fn root(&self) -> Object {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Check whether `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &Object) -> bool {
        let mut current = Some(other.clone());
        while let Some(object) = current {
            if &object == self {
                return true;
            }
            current = object.parent();
        }
        false
    }

    /// Attach `child` under this object.
    ///
    /// A child attached elsewhere is moved. The attached subtree registers
    /// with the process-wide registry.
    pub fn attach_child(&self, child: &Object) -> Result<(), ObjectError> {
        if child.is_ancestor_of(self) {
            return Err(ObjectError::ContainmentCycle {
                child: child.id(),
                parent: self.id(),
            });
        }
        if let Some(previous) = child.parent() {
            if &previous == self {
                return Ok(());
            }
            previous.detach_child(child);
        }
        child.inner.state.write().parent = Some(self.downgrade());
        self.inner.state.write().children.push(child.clone());
        self.mark_dirty();
        register_tree(child);
        Ok(())
    }

    /// Detach `child` from this object.
    ///
    /// The detached subtree unregisters, purging any resolutions still
    /// pending under its ids. Idempotent: detaching an object that is not
    /// a child returns `false`.
    pub fn detach_child(&self, child: &Object) -> bool {
        let removed = {
            let mut state = self.inner.state.write();
            let before = state.children.len();
            state.children.retain(|c| c != child);
            state.children.len() != before
        };
        if removed {
            child.inner.state.write().parent = None;
            self.mark_dirty();
            unregister_tree(child);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Registry hooks
    // ------------------------------------------------------------------

    /// Register this object (alone) with the process-wide registry.
    pub fn register(&self) {
        ObjectRegistry::global().register(self);
    }

    /// Remove this object (alone) from the process-wide registry.
    pub fn unregister(&self) {
        ObjectRegistry::global().unregister(self);
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.inner.state.write().registered = registered;
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    /// Check whether this object changed since its last flush.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.read().dirty
    }

    /// Mark this object and its ancestors as changed.
    pub fn mark_dirty(&self) {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let mut state = object.inner.state.write();
            if state.dirty {
                break;
            }
            state.dirty = true;
            drop(state);
            current = object.parent();
        }
    }

    fn mark_ancestors_dirty(&self) {
        if let Some(parent) = self.parent() {
            parent.mark_dirty();
        }
    }

    /// Clear the dirty flag on this object and its descendants.
    ///
    /// Called after a flush; best-effort bookkeeping for the
    /// skip-rewrite-if-unchanged optimization, not a correctness
    /// guarantee.
    pub fn clear_dirty(&self) {
        let mut stack = vec![self.clone()];
        while let Some(object) = stack.pop() {
            object.inner.state.write().dirty = false;
            stack.extend(object.children());
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribe to property change notifications.
    pub fn subscribe(
        &self,
        listener: impl Fn(&PropertyChange) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.inner.listeners.write();
        listeners.push(Some(Arc::new(listener)));
        Subscription(listeners.len() - 1)
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut listeners = self.inner.listeners.write();
        if let Some(slot) = listeners.get_mut(subscription.0) {
            *slot = None;
        }
    }

    fn notify(&self, change: PropertyChange) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .iter()
            .flatten()
            .cloned()
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Deep comparison: same id, same class and content-equal values for
    /// every declared property.
    pub fn content_equals(&self, other: &Object) -> bool {
        if self.id() != other.id()
            || !std::ptr::eq(self.inner.class, other.inner.class)
        {
            return false;
        }
        self.inner.class.properties().iter().all(|def| {
            self.raw_value(def).content_equals(&other.raw_value(def))
        })
    }
}

/// Identity equality: two handles are equal when they point at the same
/// live object.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Object {}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.inner.class.name())
            .field("id", &self.id())
            .finish()
    }
}

fn register_tree(object: &Object) {
    let registry = ObjectRegistry::global();
    let mut stack = vec![object.clone()];
    while let Some(current) = stack.pop() {
        registry.register(&current);
        stack.extend(current.children());
    }
}

fn unregister_tree(object: &Object) {
    let registry = ObjectRegistry::global();
    let mut stack = vec![object.clone()];
    while let Some(current) = stack.pop() {
        registry.unregister(&current);
        stack.extend(current.children());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Validator;
    use crate::value::Blob;
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NAME: Lazy<Property<String>> =
        Lazy::new(|| Property::builder("name", "Node").build());

    static OPACITY: Lazy<Property<f64>> = Lazy::new(|| {
        Property::builder("opacity", "Node")
            .default_value(1.0)
            .validator(Validator::clamp_float(0.0, 1.0))
            .build()
    });

    static PAYLOAD: Lazy<Property<Blob>> =
        Lazy::new(|| Property::builder("payload", "Node").build());

    static CHILD: Lazy<Property<Vec<Value>>> =
        Lazy::new(|| Property::builder("items", "Node").build());

    static NODE: Lazy<ObjectClass> = Lazy::new(|| {
        ObjectClass::builder("Node")
            .property(NAME.def())
            .property(OPACITY.def())
            .property(PAYLOAD.def())
            .property(CHILD.def())
            .build()
    });

    #[test]
    fn test_defaults_and_typed_access() {
        let node = Object::new(&NODE);
        assert_eq!(node.get(&OPACITY), 1.0);
        node.set(&OPACITY, 0.25).unwrap();
        assert_eq!(node.get(&OPACITY), 0.25);
    }

    #[test]
    fn test_clear_restores_default() {
        let node = Object::new(&NODE);
        node.set(&OPACITY, 0.25).unwrap();
        node.clear(OPACITY.def());
        assert_eq!(node.get(&OPACITY), 1.0);
    }

    #[test]
    fn test_validator_coerces() {
        let node = Object::new(&NODE);
        node.set(&OPACITY, 4.0).unwrap();
        assert_eq!(node.get(&OPACITY), 1.0);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let node = Object::new(&NODE);
        let err = node.set_raw(OPACITY.def(), Value::String("x".into()));
        assert!(matches!(err, Err(ObjectError::KindMismatch { .. })));
    }

    #[test]
    fn test_change_notification() {
        let node = Object::new(&NODE);
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        node.subscribe(move |change| {
            assert_eq!(change.property.name(), "opacity");
            assert_eq!(change.old, Value::Float(1.0));
            assert_eq!(change.new, Value::Float(0.5));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        node.set(&OPACITY, 0.5).unwrap();
        // Unchanged set does not notify.
        node.set(&OPACITY, 0.5).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let node = Object::new(&NODE);
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let sub = node.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        node.unsubscribe(sub);
        node.set(&OPACITY, 0.5).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_adoption_on_set() {
        let parent = Object::new(&NODE);
        let child = Object::new(&NODE);
        parent
            .set_raw(CHILD.def(), Value::List(vec![Value::Object(child.clone())]))
            .unwrap();
        assert_eq!(child.parent().unwrap(), parent);
        assert_eq!(parent.children(), vec![child.clone()]);

        // Overwriting releases the previous child.
        parent.set_raw(CHILD.def(), Value::List(Vec::new())).unwrap();
        assert!(child.parent().is_none());
        assert!(parent.children().is_empty());
    }

    #[test]
    fn test_back_link_does_not_reparent() {
        let a = Object::new(&NODE);
        let b = Object::new(&NODE);
        a.set_raw(CHILD.def(), Value::List(vec![Value::Object(b.clone())]))
            .unwrap();
        // b now owned by a; linking a from b must not create a cycle.
        b.set_raw(CHILD.def(), Value::List(vec![Value::Object(a.clone())]))
            .unwrap();
        assert!(a.parent().is_none());
        assert_eq!(b.parent().unwrap(), a);
    }

    #[test]
    fn test_attach_cycle_rejected() {
        let a = Object::new(&NODE);
        let b = Object::new(&NODE);
        a.attach_child(&b).unwrap();
        let err = b.attach_child(&a);
        assert!(matches!(err, Err(ObjectError::ContainmentCycle { .. })));
    }

    #[test]
    fn test_detach_is_idempotent() {
        let a = Object::new(&NODE);
        let b = Object::new(&NODE);
        a.attach_child(&b).unwrap();
        assert!(a.detach_child(&b));
        assert!(!a.detach_child(&b));
    }

    #[test]
    fn test_dirty_propagates_to_ancestors() {
        let a = Object::new(&NODE);
        let b = Object::new(&NODE);
        a.attach_child(&b).unwrap();
        a.clear_dirty();
        assert!(!a.is_dirty());
        b.set(&OPACITY, 0.1).unwrap();
        assert!(b.is_dirty());
        assert!(a.is_dirty());
    }

    #[test]
    fn test_content_equality() {
        let a = Object::new(&NODE);
        a.set(&NAME, "clip".to_string()).unwrap();
        let b = Object::new(&NODE);
        b.set(&NAME, "clip".to_string()).unwrap();
        // Different ids: not content-equal.
        assert!(!a.content_equals(&b));
        b.set_id(a.id());
        assert!(a.content_equals(&b));
        b.set(&OPACITY, 0.7).unwrap();
        assert!(!a.content_equals(&b));
    }
}
