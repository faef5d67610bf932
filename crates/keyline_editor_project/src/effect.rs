// SPDX-License-Identifier: MIT OR Apache-2.0
//! Effect definitions.
//!
//! Effects are storable units referenced by elements through id tokens;
//! an effect defined in one document can be applied by elements in any
//! other.

use crate::item::{self, ITEM_CLASS};
use keyline_editor_object::{
    Object, ObjectClass, Property, Validator, Value,
};
use once_cell::sync::Lazy;

/// File extension for effect units.
pub const EFFECT_EXTENSION: &str = "kleffect";

/// Kind of processing the effect applies.
pub static KIND: Lazy<Property<String>> = Lazy::new(|| {
    Property::builder("kind", "Effect")
        .default_value("blur".to_string())
        .build()
});

/// Effect strength, clamped to `[0, 10]`.
pub static STRENGTH: Lazy<Property<f64>> = Lazy::new(|| {
    Property::builder("strength", "Effect")
        .default_value(1.0)
        .validator(Validator::clamp_float(0.0, 10.0))
        .build()
});

/// Class of effect units.
pub static EFFECT_CLASS: Lazy<ObjectClass> = Lazy::new(|| {
    ObjectClass::builder("Effect")
        .inherit(&ITEM_CLASS)
        .property(KIND.def())
        .property(STRENGTH.def())
        .override_default(item::NAME.def(), Value::String("Effect".into()))
        .storable(EFFECT_EXTENSION)
        .build()
});

/// Create an effect of the given kind.
pub fn create(kind: &str) -> Object {
    let effect = Object::new(&EFFECT_CLASS);
    effect
        .set(&KIND, kind.to_string())
        .expect("`kind` carries no validation rule");
    effect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_is_clamped() {
        let effect = create("glow");
        effect.set(&STRENGTH, 99.0).unwrap();
        assert_eq!(effect.get(&STRENGTH), 10.0);
    }

    #[test]
    fn test_default_name_override() {
        let effect = Object::new(&EFFECT_CLASS);
        assert_eq!(item::name_of(&effect), "Effect");
    }
}
