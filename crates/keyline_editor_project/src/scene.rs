// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scenes.
//!
//! A scene owns the elements on its timeline and a local library of
//! effects. `effects` is declared after `elements`, so an element's effect
//! token usually appears in the document before its target; resolution
//! happens after the structural pass.

use crate::item::{self, ITEM_CLASS};
use keyline_editor_object::{Object, ObjectClass, Property, Value};
use once_cell::sync::Lazy;

/// File extension for scene units.
pub const SCENE_EXTENSION: &str = "klscene";

/// Scene duration in seconds.
pub static DURATION: Lazy<Property<f64>> = Lazy::new(|| {
    Property::builder("duration", "Scene")
        .default_value(5.0)
        .build()
});

/// Elements on the scene timeline, in stacking order.
pub static ELEMENTS: Lazy<Property<Vec<Value>>> = Lazy::new(|| {
    Property::builder("elements", "Scene")
        .declared_class("Element")
        .build()
});

/// Effects defined by this scene.
pub static EFFECTS: Lazy<Property<Vec<Value>>> = Lazy::new(|| {
    Property::builder("effects", "Scene")
        .declared_class("Effect")
        .build()
});

/// Class of scene units.
pub static SCENE_CLASS: Lazy<ObjectClass> = Lazy::new(|| {
    ObjectClass::builder("Scene")
        .inherit(&ITEM_CLASS)
        .property(DURATION.def())
        .property(ELEMENTS.def())
        .property(EFFECTS.def())
        .override_default(item::NAME.def(), Value::String("Scene".into()))
        .storable(SCENE_EXTENSION)
        .build()
});

/// Create a scene with the given duration.
pub fn create(duration: f64) -> Object {
    let scene = Object::new(&SCENE_CLASS);
    scene
        .set(&DURATION, duration)
        .expect("`duration` carries no validation rule");
    scene
}

/// Append an element to the scene timeline.
pub fn push_element(scene: &Object, element: &Object) {
    let mut elements = scene.get(&ELEMENTS);
    elements.push(Value::Object(element.clone()));
    scene
        .set(&ELEMENTS, elements)
        .expect("`elements` carries no validation rule");
}

/// Add an effect to the scene's library.
pub fn push_effect(scene: &Object, effect: &Object) {
    let mut effects = scene.get(&EFFECTS);
    effects.push(Value::Object(effect.clone()));
    scene
        .set(&EFFECTS, effects)
        .expect("`effects` carries no validation rule");
}

/// Elements currently on the timeline.
pub fn elements(scene: &Object) -> Vec<Object> {
    scene
        .get(&ELEMENTS)
        .into_iter()
        .filter_map(|value| value.as_object().cloned())
        .collect()
}
