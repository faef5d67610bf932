// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared base class for project items.

use keyline_editor_object::{Object, ObjectClass, Property};
use once_cell::sync::Lazy;

/// Display name, shared by every project item.
pub static NAME: Lazy<Property<String>> =
    Lazy::new(|| Property::builder("name", "Item").build());

/// Base class every project item derives from.
pub static ITEM_CLASS: Lazy<ObjectClass> =
    Lazy::new(|| ObjectClass::builder("Item").property(NAME.def()).build());

/// Read an item's display name.
pub fn name_of(object: &Object) -> String {
    object.get(&NAME)
}
