// SPDX-License-Identifier: MIT OR Apache-2.0
//! Object model for the Keyline Editor.
//!
//! This crate provides the foundation every document entity is built on:
//! - Identifiable objects with stable 128-bit ids
//! - Typed property descriptors with defaults, validation and flags
//! - Class descriptors and a factory registry for polymorphic instantiation
//! - A hierarchy of weak parent links and strongly owned children
//! - A process-wide weak object registry with deferred id resolution

pub mod class;
pub mod id;
pub mod object;
pub mod property;
pub mod reference;
pub mod registry;
pub mod value;

pub use class::{ClassBuilder, ClassRegistry, ObjectClass, StorableSpec};
pub use id::ObjectId;
pub use object::{Object, ObjectError, PropertyChange, Subscription, WeakObject};
pub use property::{Property, PropertyBuilder, PropertyDef, PropertyId, Validator};
pub use reference::Reference;
pub use registry::ObjectRegistry;
pub use value::{Blob, PropertyValue, Value, ValueKind};
