// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deferred reference resolution.
//!
//! A read pass builds the tree depth-first and registers each object as
//! soon as its own deserialization completes, regardless of where its
//! referees sit in the document. Afterwards [`after_deserialized`] walks
//! the completed tree with an explicit work list and asks the registry to
//! resolve every token that is still unresolved. Tokens whose targets live
//! in documents not yet loaded stay queued in the registry and fire when
//! those documents register them.

use keyline_editor_object::{Object, ObjectId, ObjectRegistry, Value};
use std::collections::{HashSet, VecDeque};

/// Resolve every unresolved reference reachable from `root`.
///
/// Resolution updates the shared tokens in place; the registry drains
/// chained resolutions iteratively, so long chains never grow the stack.
pub fn after_deserialized(root: &Object) {
    let registry = ObjectRegistry::global();
    let mut queue = VecDeque::from([root.clone()]);
    let mut seen: HashSet<ObjectId> = HashSet::new();

    while let Some(object) = queue.pop_front() {
        if !seen.insert(object.id()) {
            continue;
        }
        for def in object.class().properties() {
            scan_value(&object.raw_value(def), &mut queue, registry);
        }
        // Children attached outside property values are still part of the
        // loaded tree.
        queue.extend(object.children());
    }
}

fn scan_value(value: &Value, queue: &mut VecDeque<Object>, registry: &ObjectRegistry) {
    match value {
        Value::Reference(token) => {
            if let Some(id) = token.id() {
                if !token.is_resolved() {
                    let token = token.clone();
                    registry.resolve(id, move |target| {
                        token.resolve_to(&target);
                    });
                }
            }
        }
        Value::Object(object) => queue.push_back(object.clone()),
        Value::List(items) => {
            for item in items {
                scan_value(item, queue, registry);
            }
        }
        Value::Map(entries) => {
            for item in entries.values() {
                scan_value(item, queue, registry);
            }
        }
        _ => {}
    }
}
