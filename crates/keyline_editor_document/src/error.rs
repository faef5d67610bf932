// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for document operations.

use std::path::PathBuf;

/// Errors from serializing, deserializing and storing documents.
///
/// Most of these are recovered locally during a pass (reported through the
/// error notifier, with the property default substituted); they only
/// surface as `Err` at the document root or from whole-unit operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// A node does not have the shape its property requires.
    #[error("malformed node at `{path}`: {reason}")]
    Malformed {
        /// Property path inside the document.
        path: String,
        /// What was wrong with the node.
        reason: String,
    },

    /// A type discriminator names a class that is not registered.
    #[error("unknown type `{name}` at `{path}`")]
    UnknownClass {
        /// Property path inside the document.
        path: String,
        /// The discriminator value.
        name: String,
    },

    /// A property declares a codec key that is not registered.
    #[error("codec `{name}` is not registered (property `{path}`)")]
    UnknownCodec {
        /// Property path inside the document.
        path: String,
        /// The codec key.
        name: String,
    },

    /// A custom codec failed to encode or decode a value.
    #[error("codec failed at `{path}`: {reason}")]
    Codec {
        /// Property path inside the document.
        path: String,
        /// Message produced by the codec.
        reason: String,
    },

    /// A value was rejected by the target property.
    #[error("value rejected at `{path}`: {reason}")]
    Rejected {
        /// Property path inside the document.
        path: String,
        /// Message produced by the property.
        reason: String,
    },

    /// A referenced external document failed to load.
    #[error("failed to load referenced document `{path}`: {reason}")]
    ExternalLoad {
        /// Path of the external document.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// A storable unit has no assigned location.
    #[error("`{class}` unit has no location to save to")]
    MissingUri {
        /// Class name of the unit.
        class: &'static str,
    },

    /// The document root is unusable; always fatal.
    #[error("document root: {reason}")]
    Root {
        /// Why the root cannot be read or written.
        reason: String,
    },

    /// I/O failure from the file-system backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;
