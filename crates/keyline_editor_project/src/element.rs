// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline elements.
//!
//! An element occupies a span of its scene's timeline. Elements are
//! storable units; they reference effects by id token and may use another
//! element as a mask, so reference edges between elements can form cycles
//! that the serializer breaks with back-reference tokens.

use crate::item::{self, ITEM_CLASS};
use keyline_editor_document::ValueCodec;
use keyline_editor_object::{
    Blob, Object, ObjectClass, Property, Reference, Validator, Value,
};
use once_cell::sync::Lazy;

/// File extension for element units.
pub const ELEMENT_EXTENSION: &str = "klelem";

/// Start of the element on the scene timeline, in seconds.
pub static START: Lazy<Property<f64>> =
    Lazy::new(|| Property::builder("start", "Element").build());

/// Duration of the element, in seconds.
pub static LENGTH: Lazy<Property<f64>> = Lazy::new(|| {
    Property::builder("length", "Element")
        .default_value(1.0)
        .validator(Validator::new(|value| match value {
            Value::Float(v) if *v <= 0.0 => {
                Some("length must be positive".into())
            }
            _ => None,
        }))
        .build()
});

/// Opacity, clamped to `[0, 1]`.
pub static OPACITY: Lazy<Property<f64>> = Lazy::new(|| {
    Property::builder("opacity", "Element")
        .default_value(1.0)
        .validator(Validator::clamp_float(0.0, 1.0))
        .build()
});

/// Accent color, stored packed and written as `#rrggbb`.
pub static COLOR: Lazy<Property<i64>> = Lazy::new(|| {
    Property::builder("color", "Element")
        .default_value(0xffffff)
        .codec("color-hex")
        .build()
});

/// Effect applied to the element, by id.
pub static EFFECT: Lazy<Property<Reference>> = Lazy::new(|| {
    Property::builder("effect", "Element")
        .declared_class("Effect")
        .build()
});

/// Optional mask taken from another element.
pub static MASK: Lazy<Property<Option<Object>>> = Lazy::new(|| {
    Property::builder("mask", "Element")
        .declared_class("Element")
        .build()
});

/// Poster frame shown in browsers.
pub static THUMBNAIL: Lazy<Property<Blob>> =
    Lazy::new(|| Property::builder("thumbnail", "Element").build());

/// Rendered frame cache; never persisted.
pub static CACHED_FRAME: Lazy<Property<Blob>> = Lazy::new(|| {
    Property::builder("cached_frame", "Element")
        .transient()
        .build()
});

/// Class of element units.
pub static ELEMENT_CLASS: Lazy<ObjectClass> = Lazy::new(|| {
    ObjectClass::builder("Element")
        .inherit(&ITEM_CLASS)
        .property(START.def())
        .property(LENGTH.def())
        .property(OPACITY.def())
        .property(COLOR.def())
        .property(EFFECT.def())
        .property(MASK.def())
        .property(THUMBNAIL.def())
        .property(CACHED_FRAME.def())
        .override_default(item::NAME.def(), Value::String("Element".into()))
        .storable(ELEMENT_EXTENSION)
        .build()
});

/// Create an element spanning `[start, start + length)`.
pub fn create(start: f64, length: f64) -> Object {
    let element = Object::new(&ELEMENT_CLASS);
    element
        .set(&START, start)
        .expect("`start` carries no validation rule");
    let _ = element.set(&LENGTH, length);
    element
}

/// Writes packed colors as `#rrggbb` strings.
pub struct ColorHexCodec;

impl ValueCodec for ColorHexCodec {
    fn encode(&self, value: &Value) -> Result<serde_json::Value, String> {
        match value {
            Value::Int(packed) => {
                Ok(serde_json::json!(format!("#{:06x}", packed & 0xff_ff_ff)))
            }
            other => Err(format!("expected a packed color, got {other:?}")),
        }
    }

    fn decode(&self, node: &serde_json::Value) -> Result<Value, String> {
        let text = node.as_str().ok_or("expected a color string")?;
        let digits = text
            .strip_prefix('#')
            .ok_or_else(|| format!("`{text}` is missing the `#` prefix"))?;
        i64::from_str_radix(digits, 16)
            .map(Value::Int)
            .map_err(|e| format!("`{text}` is not a color: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opacity_clamped() {
        let element = create(0.0, 2.0);
        element.set(&OPACITY, 1.5).unwrap();
        assert_eq!(element.get(&OPACITY), 1.0);
    }

    #[test]
    fn test_length_rejects_non_positive() {
        let element = create(0.0, 2.0);
        assert!(element.set(&LENGTH, 0.0).is_err());
        assert_eq!(element.get(&LENGTH), 2.0);
    }

    #[test]
    fn test_color_codec_roundtrip() {
        let codec = ColorHexCodec;
        let node = codec.encode(&Value::Int(0x12abef)).unwrap();
        assert_eq!(node, serde_json::json!("#12abef"));
        assert_eq!(codec.decode(&node).unwrap(), Value::Int(0x12abef));
    }

    #[test]
    fn test_color_codec_rejects_garbage() {
        let codec = ColorHexCodec;
        assert!(codec.decode(&serde_json::json!("12abef")).is_err());
        assert!(codec.decode(&serde_json::json!(7)).is_err());
    }
}
