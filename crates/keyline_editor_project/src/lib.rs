// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project system for the Keyline Editor.
//!
//! Builds the editing domain on top of the object model and document
//! engine:
//! - `Project` owns scenes, a scene owns timeline elements
//! - Projects, scenes, elements and effects are storable units with their
//!   own file extensions
//! - Elements reference effects by id and may mask through other elements
//!
//! Call [`install`] once to register the classes and codecs before
//! reading documents.

pub mod effect;
pub mod element;
pub mod item;
pub mod project;
pub mod scene;

use keyline_editor_document::CodecRegistry;
use keyline_editor_object::ClassRegistry;
use once_cell::sync::Lazy;
use std::sync::Arc;

static INSTALLED: Lazy<()> = Lazy::new(|| {
    let classes = ClassRegistry::global();
    classes.register(&item::ITEM_CLASS);
    classes.register(&project::PROJECT_CLASS);
    classes.register(&scene::SCENE_CLASS);
    classes.register(&element::ELEMENT_CLASS);
    classes.register(&effect::EFFECT_CLASS);
    CodecRegistry::global().register("color-hex", Arc::new(element::ColorHexCodec));
    tracing::debug!("project system registered");
});

/// Register the project classes and codecs. Idempotent.
pub fn install() {
    Lazy::force(&INSTALLED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_editor_document::{
        DocumentStore, FileSystem, MemoryFileSystem, Mode, StdFileSystem,
    };
    use keyline_editor_object::{Object, ObjectRegistry, Reference, Value};
    use std::path::{Path, PathBuf};

    fn store() -> (DocumentStore, Arc<MemoryFileSystem>) {
        install();
        let fs = Arc::new(MemoryFileSystem::new());
        (DocumentStore::new(fs.clone()), fs)
    }

    /// Project P contains scene S contains element E; a save under
    /// `SAVE_REFERENCED` produces three linked files, and loading only the
    /// project reconstructs the whole chain.
    #[test]
    fn test_three_file_scenario() {
        let (store, fs) = store();
        let (scene_id, element_id) = {
            let p = project::create("demo");
            let s = scene::create(12.0);
            let e = element::create(0.0, 4.0);
            scene::push_element(&s, &e);
            project::push_scene(&p, &s);

            p.set_uri(Some(PathBuf::from("/studio/demo.klproj")));
            s.set_uri(Some(PathBuf::from("/studio/scenes/intro.klscene")));
            e.set_uri(Some(PathBuf::from(
                "/studio/scenes/clips/clip.klelem",
            )));

            store.save_unit(&p, Mode::SAVE_REFERENCED).unwrap();
            (s.id(), e.id())
        };

        assert_eq!(fs.len(), 3);
        let doc: serde_json::Value = serde_json::from_slice(
            &fs.read(Path::new("/studio/demo.klproj")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            doc["items"][0]["ref"],
            serde_json::json!(scene_id.to_string())
        );
        assert_eq!(
            doc["items"][0]["path"],
            serde_json::json!("scenes/intro.klscene")
        );
        let scene_doc: serde_json::Value = serde_json::from_slice(
            &fs.read(Path::new("/studio/scenes/intro.klscene")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            scene_doc["elements"][0]["ref"],
            serde_json::json!(element_id.to_string())
        );
        assert_eq!(
            scene_doc["elements"][0]["path"],
            serde_json::json!("clips/clip.klelem")
        );

        // The originals are gone; load only the project file.
        let loaded = store
            .load_unit(Path::new("/studio/demo.klproj"), Mode::default())
            .unwrap();
        let scenes = project::scenes(&loaded);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id(), scene_id);
        let children = scenes[0].children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id(), element_id);
        assert_eq!(children[0].get(&element::LENGTH), 4.0);
    }

    /// The same graph under the three reference modes: self-contained,
    /// two linked files, or an id with no content and no child file.
    #[test]
    fn test_mode_matrix() {
        install();

        // (a) Embedded: one self-contained document, no files touched.
        {
            let fs = Arc::new(MemoryFileSystem::new());
            let store = DocumentStore::new(fs.clone());
            let s = scene::create(6.0);
            let e = element::create(1.0, 2.0);
            e.set_uri(Some(PathBuf::from("/p/e.klelem")));
            scene::push_element(&s, &e);
            let doc = store
                .serialize(&s, Mode::EMBED_REFERENCED, Path::new("/p"))
                .unwrap();
            let entry = &doc["elements"][0];
            assert!(entry.get("path").is_none());
            assert_eq!(entry["id"], serde_json::json!(e.id().to_string()));
            assert!(entry.get("opacity").is_some());
            assert!(fs.is_empty());
        }

        // (b) Saved referenced: two files linked by a relative path.
        {
            let fs = Arc::new(MemoryFileSystem::new());
            let store = DocumentStore::new(fs.clone());
            let s = scene::create(6.0);
            let e = element::create(1.0, 2.0);
            e.set_uri(Some(PathBuf::from("/p/e.klelem")));
            scene::push_element(&s, &e);
            s.set_uri(Some(PathBuf::from("/p/s.klscene")));
            store.save_unit(&s, Mode::SAVE_REFERENCED).unwrap();
            assert_eq!(fs.len(), 2);
            let doc: serde_json::Value = serde_json::from_slice(
                &fs.read(Path::new("/p/s.klscene")).unwrap(),
            )
            .unwrap();
            assert_eq!(
                doc["elements"][0],
                serde_json::json!({
                    "ref": e.id().to_string(),
                    "path": "e.klelem",
                })
            );
        }

        // (c) Plain reference: only the id, no nested content, no file.
        {
            let fs = Arc::new(MemoryFileSystem::new());
            let store = DocumentStore::new(fs.clone());
            let s = scene::create(6.0);
            let e = element::create(1.0, 2.0);
            e.set_uri(Some(PathBuf::from("/p/e.klelem")));
            scene::push_element(&s, &e);
            let doc = store
                .serialize(&s, Mode::default(), Path::new("/p"))
                .unwrap();
            assert_eq!(
                doc["elements"][0],
                serde_json::json!({ "ref": e.id().to_string() })
            );
            assert!(fs.is_empty());
        }
    }

    /// An element's effect token appears in the document before the
    /// effect itself; after the pass it points at the instance from this
    /// pass.
    #[test]
    fn test_forward_reference_resolution() {
        let (store, _fs) = store();
        let (doc, effect_id) = {
            let s = scene::create(6.0);
            let e = element::create(0.0, 1.0);
            let glow = effect::create("glow");
            e.set(&element::EFFECT, Reference::to(glow.id())).unwrap();
            scene::push_element(&s, &e);
            scene::push_effect(&s, &glow);
            let doc = store
                .serialize(&s, Mode::default(), Path::new("/p"))
                .unwrap();
            (doc, glow.id())
        };

        let loaded = store
            .deserialize(&doc, &scene::SCENE_CLASS, Mode::default(), Path::new("/p"))
            .unwrap();
        let element = scene::elements(&loaded)[0].clone();
        let token = match element.raw_value(element::EFFECT.def()) {
            Value::Reference(token) => token,
            other => panic!("expected a reference, got {other:?}"),
        };
        let resolved = token.get().expect("token resolves after the pass");
        assert_eq!(resolved.id(), effect_id);

        // The exact instance from this pass, not a copy.
        let in_library = loaded.get(&scene::EFFECTS)[0]
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(resolved, in_library);
    }

    /// Elements masking each other serialize as one embedded copy each,
    /// with a back-reference token for the second occurrence.
    #[test]
    fn test_cycle_breaks_into_back_reference() {
        let (store, _fs) = store();
        let (doc, a_id, b_id) = {
            let s = scene::create(6.0);
            let a = element::create(0.0, 1.0);
            let b = element::create(1.0, 1.0);
            a.set(&element::MASK, Some(b.clone())).unwrap();
            b.set(&element::MASK, Some(a.clone())).unwrap();
            scene::push_element(&s, &a);
            let doc = store
                .serialize(&s, Mode::default(), Path::new("/p"))
                .unwrap();
            (doc, a.id(), b.id())
        };

        // One embedded copy of each; the second occurrence is a token.
        let a_node = &doc["elements"][0];
        assert_eq!(a_node["id"], serde_json::json!(a_id.to_string()));
        let b_node = &a_node["mask"];
        assert_eq!(b_node["id"], serde_json::json!(b_id.to_string()));
        assert_eq!(
            b_node["mask"],
            serde_json::json!({ "ref": a_id.to_string() })
        );

        let loaded = store
            .deserialize(&doc, &scene::SCENE_CLASS, Mode::default(), Path::new("/p"))
            .unwrap();
        let a = scene::elements(&loaded)[0].clone();
        let b = a
            .raw_value(element::MASK.def())
            .as_object()
            .cloned()
            .unwrap();
        let back = match b.raw_value(element::MASK.def()) {
            Value::Reference(token) => token,
            other => panic!("expected a reference, got {other:?}"),
        };
        assert_eq!(back.get().unwrap(), a);
    }

    /// A reference into a document that has not been loaded stays
    /// unresolved, then resolves when that document arrives.
    #[test]
    fn test_reference_resolves_when_target_document_loads() {
        let (store, _fs) = store();

        let effect_path = PathBuf::from("/lib/glow.kleffect");
        let scene_path = PathBuf::from("/p/s.klscene");
        let effect_id = {
            let glow = effect::create("glow");
            glow.set(&effect::STRENGTH, 2.0).unwrap();
            store
                .save_unit_as(&glow, &effect_path, Mode::default())
                .unwrap();

            let s = scene::create(6.0);
            let e = element::create(0.0, 1.0);
            e.set(&element::EFFECT, Reference::to(glow.id())).unwrap();
            scene::push_element(&s, &e);
            store
                .save_unit_as(&s, &scene_path, Mode::SAVE_REFERENCED)
                .unwrap();
            glow.id()
        };

        let loaded_scene = store.load_unit(&scene_path, Mode::default()).unwrap();
        let element = scene::elements(&loaded_scene)[0].clone();
        let token = match element.raw_value(element::EFFECT.def()) {
            Value::Reference(token) => token,
            other => panic!("expected a reference, got {other:?}"),
        };
        // Not an error: the target's document is simply not loaded yet.
        assert!(token.get().is_none());

        let loaded_effect = store.load_unit(&effect_path, Mode::default()).unwrap();
        assert_eq!(loaded_effect.id(), effect_id);
        assert_eq!(token.get().unwrap(), loaded_effect);
    }

    /// Once every strong handle to a loaded tree is gone, its ids vanish
    /// from the registry.
    #[test]
    fn test_registry_forgets_dropped_trees() {
        let (store, _fs) = store();
        let registry = ObjectRegistry::global();
        let ids: Vec<_> = {
            let doc = {
                let s = scene::create(6.0);
                scene::push_element(&s, &element::create(0.0, 1.0));
                store
                    .serialize(&s, Mode::default(), Path::new("/p"))
                    .unwrap()
            };
            let loaded = store
                .deserialize(&doc, &scene::SCENE_CLASS, Mode::default(), Path::new("/p"))
                .unwrap();
            let mut ids = vec![loaded.id()];
            ids.extend(scene::elements(&loaded).iter().map(Object::id));
            for id in &ids {
                assert!(registry.find(*id).is_some());
            }
            ids
        };
        for id in ids {
            assert!(registry.find(id).is_none());
        }
    }

    /// Color codec and transient cache through a full round trip.
    #[test]
    fn test_element_codec_and_transient() {
        let (store, _fs) = store();
        let doc = {
            let s = scene::create(6.0);
            let e = element::create(0.0, 1.0);
            e.set(&element::COLOR, 0x3fa7d6).unwrap();
            e.set(
                &element::CACHED_FRAME,
                keyline_editor_object::Blob::from_bytes(vec![9u8; 16]),
            )
            .unwrap();
            scene::push_element(&s, &e);
            store
                .serialize(&s, Mode::default(), Path::new("/p"))
                .unwrap()
        };

        let element_node = &doc["elements"][0];
        assert_eq!(element_node["color"], serde_json::json!("#3fa7d6"));
        assert!(element_node.get("cached_frame").is_none());

        let loaded = store
            .deserialize(&doc, &scene::SCENE_CLASS, Mode::default(), Path::new("/p"))
            .unwrap();
        let element = scene::elements(&loaded)[0].clone();
        assert_eq!(element.get(&element::COLOR), 0x3fa7d6);
        assert!(element.get(&element::CACHED_FRAME).is_empty());
    }

    /// Whole project on a real disk through the standard backend.
    #[test]
    fn test_round_trip_on_disk() {
        install();
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(Arc::new(StdFileSystem::new()));
        let project_path = dir.path().join("film.klproj");
        let scene_path = dir.path().join("scenes/one.klscene");

        let (project_id, scene_id) = {
            let p = project::create("film");
            let s = scene::create(24.0);
            scene::push_element(&s, &element::create(0.0, 24.0));
            project::push_scene(&p, &s);
            p.set_uri(Some(project_path.clone()));
            s.set_uri(Some(scene_path.clone()));
            store.save_unit(&p, Mode::SAVE_REFERENCED).unwrap();
            (p.id(), s.id())
        };

        let loaded = store.load_unit(&project_path, Mode::default()).unwrap();
        assert_eq!(loaded.id(), project_id);
        let scenes = project::scenes(&loaded);
        assert_eq!(scenes[0].id(), scene_id);
        assert_eq!(scenes[0].get(&scene::DURATION), 24.0);
        assert_eq!(scene::elements(&scenes[0]).len(), 1);
    }
}
