// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialization contexts.
//!
//! One context wraps one document node during a pass: the target class, the
//! error notifier, an optional parent context and the pass environment.
//! Contexts are threaded explicitly through every recursive call; there is
//! no ambient state, so independent passes never contend.
//!
//! Writing an object-valued property follows one algorithm:
//! 1. null writes a null sentinel;
//! 2. a custom codec takes over the whole property;
//! 3. a storable unit under `SAVE_REFERENCED` (other than the document
//!    root) flushes to its own file and leaves `{"ref", "path"}` behind;
//! 4. `EMBED_REFERENCED`, or a value without its own location, nests a
//!    child node plus a `"$type"` discriminator where the concrete class
//!    is not recoverable from the declaration;
//! 5. anything else writes an id token only.
//!
//! Reading mirrors writing; malformed nodes and unknown discriminators are
//! reported to the notifier and replaced by the property default, fatal
//! only at the document root.

use crate::blob;
use crate::codec::CodecRegistry;
use crate::error::{DocumentError, Result};
use crate::fs::FileSystem;
use crate::mode::Mode;
use crate::notify::ErrorNotifier;
use crate::path;
use crate::store::StoreOptions;
use keyline_editor_object::{
    ClassRegistry, Object, ObjectClass, ObjectId, ObjectRegistry, PropertyDef,
    Reference, Value, ValueKind,
};
use parking_lot::Mutex;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// State shared across a pass and every nested unit pass it spawns.
pub(crate) struct PassShared {
    /// Units currently being flushed, to cut reference cycles between
    /// separately stored files.
    saving: Mutex<HashSet<ObjectId>>,
    /// External documents already loaded during this pass.
    loaded: Mutex<HashMap<PathBuf, Object>>,
}

impl PassShared {
    pub(crate) fn new() -> Self {
        Self {
            saving: Mutex::new(HashSet::new()),
            loaded: Mutex::new(HashMap::new()),
        }
    }
}

/// Everything one document pass needs, threaded explicitly.
pub(crate) struct PassEnv<'a> {
    pub mode: Mode,
    pub notifier: &'a dyn ErrorNotifier,
    pub fs: &'a dyn FileSystem,
    pub classes: &'a ClassRegistry,
    pub codecs: &'a CodecRegistry,
    pub options: &'a StoreOptions,
    /// Directory of the document being processed.
    pub base_dir: PathBuf,
    /// Id of the unit this document belongs to, when writing one.
    pub root_id: Option<ObjectId>,
    shared: &'a PassShared,
    visited: Mutex<HashSet<ObjectId>>,
}

impl<'a> PassEnv<'a> {
    pub(crate) fn new(
        mode: Mode,
        notifier: &'a dyn ErrorNotifier,
        fs: &'a dyn FileSystem,
        classes: &'a ClassRegistry,
        codecs: &'a CodecRegistry,
        options: &'a StoreOptions,
        base_dir: PathBuf,
        root_id: Option<ObjectId>,
        shared: &'a PassShared,
    ) -> Self {
        Self {
            mode,
            notifier,
            fs,
            classes,
            codecs,
            options,
            base_dir,
            root_id,
            shared,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Environment for a nested document of the same pass.
    fn nested(&self, base_dir: PathBuf, root_id: Option<ObjectId>) -> PassEnv<'a> {
        PassEnv {
            mode: self.mode,
            notifier: self.notifier,
            fs: self.fs,
            classes: self.classes,
            codecs: self.codecs,
            options: self.options,
            base_dir,
            root_id,
            shared: self.shared,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Record an object as serialized in this document. Returns `false`
    /// when it already was, which turns the occurrence into a
    /// back-reference.
    fn visit(&self, id: ObjectId) -> bool {
        self.visited.lock().insert(id)
    }
}

/// Context over one node while writing.
pub struct WriteContext<'env, 'p> {
    env: &'env PassEnv<'env>,
    class: &'static ObjectClass,
    parent: Option<&'p WriteContext<'env, 'p>>,
    path: String,
    node: JsonMap<String, JsonValue>,
}

impl WriteContext<'_, '_> {
    /// Class of the object being written into this node.
    pub fn class(&self) -> &'static ObjectClass {
        self.class
    }

    /// Mode flags of the pass.
    pub fn mode(&self) -> Mode {
        self.env.mode
    }

    /// Context of the enclosing node, if any.
    pub fn parent(&self) -> Option<&WriteContext<'_, '_>> {
        self.parent
    }

    /// Property path of this node inside the document.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Context over one node while reading.
pub struct ReadContext<'env, 'p> {
    env: &'env PassEnv<'env>,
    class: &'static ObjectClass,
    parent: Option<&'p ReadContext<'env, 'p>>,
    path: String,
}

impl ReadContext<'_, '_> {
    /// Class of the object being read from this node.
    pub fn class(&self) -> &'static ObjectClass {
        self.class
    }

    /// Mode flags of the pass.
    pub fn mode(&self) -> Mode {
        self.env.mode
    }

    /// Context of the enclosing node, if any.
    pub fn parent(&self) -> Option<&ReadContext<'_, '_>> {
        self.parent
    }

    /// Property path of this node inside the document.
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}.{segment}")
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize a whole document for `object`.
pub(crate) fn write_document(env: &PassEnv, object: &Object) -> Result<JsonValue> {
    env.visit(object.id());
    let mut ctx = WriteContext {
        env,
        class: object.class(),
        parent: None,
        path: String::new(),
        node: JsonMap::new(),
    };
    serialize_object(&mut ctx, object)?;
    let mut node = ctx.node;
    node.insert("$type".into(), json!(object.class().name()));
    Ok(JsonValue::Object(node))
}

fn serialize_object(ctx: &mut WriteContext, object: &Object) -> Result<()> {
    ctx.node
        .insert("id".into(), json!(object.id().to_string()));
    for def in object.class().properties() {
        if def.is_transient() {
            continue;
        }
        let value = object.raw_value(def);
        let child_path = join_path(&ctx.path, def.name());

        if let Some(key) = def.codec() {
            match ctx.env.codecs.get(key) {
                Some(codec) => match codec.encode(&value) {
                    Ok(node) => {
                        ctx.node.insert(def.name().into(), node);
                    }
                    Err(reason) => ctx.env.notifier.notify(DocumentError::Codec {
                        path: child_path,
                        reason,
                    }),
                },
                None => ctx.env.notifier.notify(DocumentError::UnknownCodec {
                    path: child_path,
                    name: key.to_string(),
                }),
            }
            continue;
        }

        let encoded = encode_value(ctx, object.id(), def, &value, &child_path)?;
        ctx.node.insert(def.name().into(), encoded);
    }
    Ok(())
}

fn encode_value(
    ctx: &WriteContext,
    owner: ObjectId,
    def: &'static PropertyDef,
    value: &Value,
    path: &str,
) -> Result<JsonValue> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(v) => Ok(json!(v)),
        Value::Int(v) => Ok(json!(v)),
        Value::Float(v) => Ok(serde_json::Number::from_f64(*v)
            .map_or(JsonValue::Null, JsonValue::Number)),
        Value::String(v) => Ok(json!(v)),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(encode_value(
                    ctx,
                    owner,
                    def,
                    item,
                    &format!("{path}[{index}]"),
                )?);
            }
            Ok(JsonValue::Array(out))
        }
        Value::Map(entries) => {
            let mut out = JsonMap::new();
            for (key, item) in entries {
                let encoded =
                    encode_value(ctx, owner, def, item, &join_path(path, key))?;
                out.insert(key.clone(), encoded);
            }
            Ok(JsonValue::Object(out))
        }
        Value::Blob(payload) => {
            let externalize = ctx.env.mode.contains(Mode::WRITE_BLOB_FILES)
                && payload.len() >= ctx.env.options.blob_inline_limit;
            blob::encode_blob(
                ctx.env.fs,
                &ctx.env.base_dir,
                owner,
                def.name(),
                payload,
                externalize,
            )
        }
        Value::Reference(token) => Ok(match token.id() {
            Some(id) => json!({ "ref": id.to_string() }),
            None => JsonValue::Null,
        }),
        Value::Object(target) => encode_object_value(ctx, def, target, path),
    }
}

fn encode_object_value(
    ctx: &WriteContext,
    def: &'static PropertyDef,
    target: &Object,
    path: &str,
) -> Result<JsonValue> {
    let env = ctx.env;
    let has_location = target.is_storable() && target.uri().is_some();

    if env.mode.contains(Mode::SAVE_REFERENCED)
        && has_location
        && Some(target.id()) != env.root_id
    {
        // The child flushes fully before the reference node is written,
        // so the parent document always points at a consistent snapshot.
        flush_unit(env, target, false)?;
        let uri = target.uri().unwrap_or_default();
        let rel = path::relative_path(&env.base_dir, &uri);
        return Ok(json!({
            "ref": target.id().to_string(),
            "path": path::to_wire(&rel),
        }));
    }

    if env.mode.contains(Mode::EMBED_REFERENCED) || !has_location {
        if !env.visit(target.id()) {
            // Second occurrence in this document: back-reference token.
            return Ok(json!({ "ref": target.id().to_string() }));
        }
        let mut child = WriteContext {
            env,
            class: target.class(),
            parent: Some(ctx),
            path: path.to_string(),
            node: JsonMap::new(),
        };
        serialize_object(&mut child, target)?;
        let mut node = child.node;
        if def.declared_class() != Some(target.class().name()) {
            node.insert("$type".into(), json!(target.class().name()));
        }
        return Ok(JsonValue::Object(node));
    }

    // Plain non-containment reference: content lives elsewhere.
    Ok(json!({ "ref": target.id().to_string() }))
}

/// Render a document to bytes according to the store options.
pub(crate) fn render_document(doc: &JsonValue, options: &StoreOptions) -> Result<Vec<u8>> {
    Ok(if options.pretty {
        serde_json::to_vec_pretty(doc)?
    } else {
        serde_json::to_vec(doc)?
    })
}

/// Flush a storable unit to its own file.
///
/// `force` writes even when the unit is unchanged; in-pass child flushes
/// pass `false` so clean units are skipped (best-effort optimization).
pub(crate) fn flush_unit(env: &PassEnv, object: &Object, force: bool) -> Result<PathBuf> {
    let id = object.id();
    let uri = object.uri().ok_or(DocumentError::MissingUri {
        class: object.class().name(),
    })?;
    if !env.shared.saving.lock().insert(id) {
        // Already flushing further up the stack; the reference cycle ends
        // here.
        return Ok(uri);
    }
    let result = (|| -> Result<PathBuf> {
        if !force && !object.is_dirty() && env.fs.exists(&uri) {
            tracing::debug!(%id, path = %uri.display(), "unit unchanged, skipping write");
            return Ok(uri.clone());
        }
        let base_dir = uri
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        let unit_env = env.nested(base_dir, Some(id));
        let doc = write_document(&unit_env, object)?;
        let bytes = render_document(&doc, env.options)?;
        if env.options.backup && env.fs.exists(&uri) {
            write_backup(env.fs, &uri)?;
        }
        env.fs.write(&uri, &bytes)?;
        object.clear_dirty();
        tracing::info!(
            class = object.class().name(),
            %id,
            path = %uri.display(),
            "saved unit"
        );
        Ok(uri.clone())
    })();
    env.shared.saving.lock().remove(&id);
    result
}

fn write_backup(fs: &dyn FileSystem, uri: &Path) -> Result<()> {
    let mut name = uri
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push_str(".backup");
    let backup = uri.with_file_name(name);
    let bytes = fs.read(uri)?;
    fs.write(&backup, &bytes)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Deserialize a whole document.
///
/// The root discriminator picks the class; `fallback` covers documents
/// read against a known target type. Failures here are fatal.
pub(crate) fn read_document(
    env: &PassEnv,
    doc: &JsonValue,
    fallback: Option<&'static ObjectClass>,
) -> Result<Object> {
    let node = doc.as_object().ok_or_else(|| DocumentError::Root {
        reason: "document root is not an object".into(),
    })?;
    let class = match node.get("$type").and_then(JsonValue::as_str) {
        Some(name) => {
            env.classes
                .get(name)
                .ok_or_else(|| DocumentError::UnknownClass {
                    path: "$type".into(),
                    name: name.to_string(),
                })?
        }
        None => fallback.ok_or_else(|| DocumentError::Root {
            reason: "document root carries no type".into(),
        })?,
    };
    deserialize_object(env, None, node, class, "")
}

/// Deserialize a node into an existing instance.
///
/// Supports cross-document merge: an id in the node reassigns the
/// instance's id, which also satisfies resolutions pending under it.
pub(crate) fn populate_document(
    env: &PassEnv,
    doc: &JsonValue,
    object: &Object,
) -> Result<()> {
    let node = doc.as_object().ok_or_else(|| DocumentError::Root {
        reason: "document root is not an object".into(),
    })?;
    apply_id(env, node, object, "");
    populate_properties(env, None, node, object, "");
    object.register();
    Ok(())
}

fn apply_id(env: &PassEnv, node: &JsonMap<String, JsonValue>, object: &Object, path: &str) {
    let Some(raw) = node.get("id") else {
        return;
    };
    match raw.as_str().and_then(ObjectId::parse) {
        Some(id) => {
            if id != object.id() {
                object.set_id(id);
            }
        }
        None => env.notifier.notify(DocumentError::Malformed {
            path: join_path(path, "id"),
            reason: "id is not a valid identifier".into(),
        }),
    }
}

fn deserialize_object<'a>(
    env: &'a PassEnv<'a>,
    parent: Option<&'a ReadContext<'a, 'a>>,
    node: &JsonMap<String, JsonValue>,
    class: &'static ObjectClass,
    path: &str,
) -> Result<Object> {
    let object = class.instantiate();
    apply_id(env, node, &object, path);
    populate_properties(env, parent, node, &object, path);
    // Registered as soon as its own deserialization completes, wherever it
    // sits in the document.
    object.register();
    Ok(object)
}

fn populate_properties<'a>(
    env: &'a PassEnv<'a>,
    parent: Option<&'a ReadContext<'a, 'a>>,
    node: &JsonMap<String, JsonValue>,
    object: &Object,
    path: &str,
) {
    let ctx = ReadContext {
        env,
        class: object.class(),
        parent,
        path: path.to_string(),
    };
    for def in object.class().properties() {
        if def.is_transient() {
            continue;
        }
        let Some(raw) = node.get(def.name()) else {
            // Missing key: the default stands.
            continue;
        };
        let child_path = join_path(path, def.name());

        let decoded = if let Some(key) = def.codec() {
            match env.codecs.get(key) {
                Some(codec) => match codec.decode(raw) {
                    Ok(value) => Some(value),
                    Err(reason) => {
                        env.notifier.notify(DocumentError::Codec {
                            path: child_path.clone(),
                            reason,
                        });
                        None
                    }
                },
                None => {
                    env.notifier.notify(DocumentError::UnknownCodec {
                        path: child_path.clone(),
                        name: key.to_string(),
                    });
                    None
                }
            }
        } else {
            decode_value(&ctx, def, raw, &child_path)
        };

        if let Some(value) = decoded {
            if let Err(error) = object.set_raw(def, value) {
                env.notifier.notify(DocumentError::Rejected {
                    path: child_path,
                    reason: error.to_string(),
                });
            }
        }
    }
}

fn decode_value(
    ctx: &ReadContext,
    def: &'static PropertyDef,
    node: &JsonValue,
    path: &str,
) -> Option<Value> {
    let malformed = |reason: String| {
        ctx.env.notifier.notify(DocumentError::Malformed {
            path: path.to_string(),
            reason,
        });
    };
    match (def.kind(), node) {
        (ValueKind::Reference, JsonValue::Null) => {
            Some(Value::Reference(Reference::null()))
        }
        (_, JsonValue::Null) => Some(Value::Null),
        (ValueKind::Bool, JsonValue::Bool(v)) => Some(Value::Bool(*v)),
        (ValueKind::Int, JsonValue::Number(n)) => match n.as_i64() {
            Some(v) => Some(Value::Int(v)),
            None => {
                malformed(format!("`{n}` is not a valid integer"));
                None
            }
        },
        (ValueKind::Float, JsonValue::Number(n)) => {
            n.as_f64().map(Value::Float)
        }
        (ValueKind::String, JsonValue::String(s)) => {
            Some(Value::String(s.clone()))
        }
        (ValueKind::List, JsonValue::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let element = decode_element(
                    ctx,
                    def,
                    item,
                    &format!("{path}[{index}]"),
                )?;
                out.push(element);
            }
            Some(Value::List(out))
        }
        (ValueKind::Map, JsonValue::Object(entries)) => {
            let mut out = indexmap::IndexMap::new();
            for (key, item) in entries {
                let element =
                    decode_element(ctx, def, item, &join_path(path, key))?;
                out.insert(key.clone(), element);
            }
            Some(Value::Map(out))
        }
        (ValueKind::Blob, JsonValue::Object(map)) => {
            match blob::decode_blob(&ctx.env.base_dir, map, path) {
                Ok(payload) => Some(Value::Blob(payload)),
                Err(error) => {
                    ctx.env.notifier.notify(error);
                    None
                }
            }
        }
        (ValueKind::Reference, JsonValue::Object(map)) => {
            decode_ref(ctx, map, path)
        }
        (ValueKind::Object, JsonValue::Object(map)) => {
            decode_compound(ctx, def, map, path)
        }
        (kind, other) => {
            malformed(format!(
                "expected a {kind} node, found {}",
                json_shape(other)
            ));
            None
        }
    }
}

/// Decode a list or map element, which carries no declaration of its own.
fn decode_element(
    ctx: &ReadContext,
    def: &'static PropertyDef,
    node: &JsonValue,
    path: &str,
) -> Option<Value> {
    match node {
        JsonValue::Null => Some(Value::Null),
        JsonValue::Bool(v) => Some(Value::Bool(*v)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => Some(Value::Int(v)),
            None => n.as_f64().map(Value::Float),
        },
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(decode_element(
                    ctx,
                    def,
                    item,
                    &format!("{path}[{index}]"),
                )?);
            }
            Some(Value::List(out))
        }
        JsonValue::Object(map) => decode_compound(ctx, def, map, path),
    }
}

/// Decode a compound node: a reference token, an embedded object or plain
/// keyed data, in that order of precedence.
fn decode_compound(
    ctx: &ReadContext,
    def: &'static PropertyDef,
    map: &JsonMap<String, JsonValue>,
    path: &str,
) -> Option<Value> {
    if map.contains_key("ref") {
        return decode_ref(ctx, map, path);
    }

    let class = match map.get("$type").and_then(JsonValue::as_str) {
        Some(name) => match ctx.env.classes.get(name) {
            Some(class) => Some(class),
            None => {
                ctx.env.notifier.notify(DocumentError::UnknownClass {
                    path: path.to_string(),
                    name: name.to_string(),
                });
                return None;
            }
        },
        None => def
            .declared_class()
            .and_then(|name| ctx.env.classes.get(name)),
    };

    match class {
        Some(class) => {
            match deserialize_object(ctx.env, Some(ctx), map, class, path) {
                Ok(object) => Some(Value::Object(object)),
                Err(error) => {
                    ctx.env.notifier.notify(error);
                    None
                }
            }
        }
        // No class in play: plain keyed data.
        None => {
            let mut out = indexmap::IndexMap::new();
            for (key, item) in map {
                out.insert(
                    key.clone(),
                    decode_element(ctx, def, item, &join_path(path, key))?,
                );
            }
            Some(Value::Map(out))
        }
    }
}

fn decode_ref(
    ctx: &ReadContext,
    map: &JsonMap<String, JsonValue>,
    path: &str,
) -> Option<Value> {
    let id = match map
        .get("ref")
        .and_then(JsonValue::as_str)
        .and_then(ObjectId::parse)
    {
        Some(id) => id,
        None => {
            ctx.env.notifier.notify(DocumentError::Malformed {
                path: path.to_string(),
                reason: "`ref` is not a valid identifier".into(),
            });
            return None;
        }
    };

    if let Some(rel) = map.get("path").and_then(JsonValue::as_str) {
        let target =
            path::resolve_path(&ctx.env.base_dir, &path::from_wire(rel));
        match load_unit_in_pass(ctx.env, &target) {
            Ok(object) => {
                if object.id() != id {
                    tracing::warn!(
                        expected = %id,
                        found = %object.id(),
                        path = %target.display(),
                        "referenced unit carries a different id"
                    );
                }
                return Some(Value::Object(object));
            }
            Err(error) => {
                // The failure belongs to this one child load; the property
                // keeps an unresolved token a later load may still satisfy.
                ctx.env.notifier.notify(error);
                return Some(Value::Reference(Reference::to(id)));
            }
        }
    }

    // Id-only token; resolve eagerly when the target is already known.
    match ObjectRegistry::global().find(id) {
        Some(target) => Some(Value::Reference(Reference::resolved(&target))),
        None => Some(Value::Reference(Reference::to(id))),
    }
}

/// Load an externally stored unit referenced from the current document.
pub(crate) fn load_unit_in_pass(env: &PassEnv, target: &Path) -> Result<Object> {
    if let Some(existing) = env.shared.loaded.lock().get(target) {
        return Ok(existing.clone());
    }
    let external = |reason: String| DocumentError::ExternalLoad {
        path: target.to_path_buf(),
        reason,
    };
    let bytes = env.fs.read(target).map_err(|e| external(e.to_string()))?;
    let doc: JsonValue =
        serde_json::from_slice(&bytes).map_err(|e| external(e.to_string()))?;
    let base_dir = target
        .parent()
        .map_or_else(PathBuf::new, Path::to_path_buf);
    let unit_env = env.nested(base_dir, None);
    let object = read_document(&unit_env, &doc, None)
        .map_err(|e| external(e.to_string()))?;
    object.set_uri(Some(target.to_path_buf()));
    object.clear_dirty();
    env.shared
        .loaded
        .lock()
        .insert(target.to_path_buf(), object.clone());
    tracing::debug!(path = %target.display(), "loaded referenced unit");
    Ok(object)
}

fn json_shape(node: &JsonValue) -> &'static str {
    match node {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a bool",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
