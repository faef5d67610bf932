// SPDX-License-Identifier: MIT OR Apache-2.0
//! Custom value codecs.
//!
//! A property can opt out of the standard encoding by declaring a codec
//! key; the document pass then delegates that property entirely to the
//! codec registered under the key.

use indexmap::IndexMap;
use keyline_editor_object::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Converts one property value to and from its document node.
pub trait ValueCodec: Send + Sync {
    /// Encode a value into a document node.
    fn encode(&self, value: &Value) -> Result<serde_json::Value, String>;

    /// Decode a document node back into a value.
    fn decode(&self, node: &serde_json::Value) -> Result<Value, String>;
}

/// Registry of codecs keyed by the property descriptor's codec key.
pub struct CodecRegistry {
    codecs: RwLock<IndexMap<&'static str, Arc<dyn ValueCodec>>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(IndexMap::new()),
        }
    }

    /// The process-wide registry used by document passes.
    pub fn global() -> &'static CodecRegistry {
        static GLOBAL: Lazy<CodecRegistry> = Lazy::new(CodecRegistry::new);
        &GLOBAL
    }

    /// Register a codec under a key.
    pub fn register(&self, key: &'static str, codec: Arc<dyn ValueCodec>) {
        self.codecs.write().insert(key, codec);
    }

    /// Look up a codec by key.
    pub fn get(&self, key: &str) -> Option<Arc<dyn ValueCodec>> {
        self.codecs.read().get(key).cloned()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
