// SPDX-License-Identifier: MIT OR Apache-2.0
//! Projects.
//!
//! The project is the top of the containment tree: it owns its scenes and
//! is the unit a whole editing session saves and restores.

use crate::item::{self, ITEM_CLASS};
use keyline_editor_object::{Object, ObjectClass, Property, Value};
use once_cell::sync::Lazy;

/// File extension for project units.
pub const PROJECT_EXTENSION: &str = "klproj";

/// Frames per second for the whole project.
pub static FRAME_RATE: Lazy<Property<i64>> = Lazy::new(|| {
    Property::builder("frame_rate", "Project")
        .default_value(30)
        .build()
});

/// Scenes owned by the project, in presentation order.
pub static ITEMS: Lazy<Property<Vec<Value>>> = Lazy::new(|| {
    Property::builder("items", "Project")
        .declared_class("Scene")
        .build()
});

/// Class of project units.
pub static PROJECT_CLASS: Lazy<ObjectClass> = Lazy::new(|| {
    ObjectClass::builder("Project")
        .inherit(&ITEM_CLASS)
        .property(FRAME_RATE.def())
        .property(ITEMS.def())
        .override_default(item::NAME.def(), Value::String("Project".into()))
        .storable(PROJECT_EXTENSION)
        .build()
});

/// Create a named project.
pub fn create(name: &str) -> Object {
    let project = Object::new(&PROJECT_CLASS);
    project
        .set(&item::NAME, name.to_string())
        .expect("`name` carries no validation rule");
    project
}

/// Append a scene to the project.
pub fn push_scene(project: &Object, scene: &Object) {
    let mut items = project.get(&ITEMS);
    items.push(Value::Object(scene.clone()));
    project
        .set(&ITEMS, items)
        .expect("`items` carries no validation rule");
}

/// Scenes owned by the project.
pub fn scenes(project: &Object) -> Vec<Object> {
    project
        .get(&ITEMS)
        .into_iter()
        .filter_map(|value| value.as_object().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene;

    #[test]
    fn test_project_owns_scenes() {
        let project = create("demo");
        let scene = scene::create(8.0);
        push_scene(&project, &scene);
        assert_eq!(scenes(&project), vec![scene.clone()]);
        assert_eq!(scene.parent().unwrap(), project);
        assert_eq!(item::name_of(&project), "demo");
    }
}
