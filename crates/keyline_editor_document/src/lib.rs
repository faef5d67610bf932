// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document persistence for the Keyline Editor.
//!
//! This crate turns object trees into UTF-8 JSON documents and back:
//! - Serialization contexts with composable mode flags
//! - Polymorphic nodes with `"$type"` discriminators
//! - Id tokens and `{"ref", "path"}` external references
//! - Deferred forward-reference resolution after a read pass
//! - File storage with atomic writes, relative paths and blob sidecars
//!
//! The document node is `serde_json::Value`; each pass threads an explicit
//! context, no ambient state.

pub mod blob;
pub mod codec;
pub mod context;
pub mod error;
pub mod fs;
pub mod mode;
pub mod notify;
pub mod path;
pub mod resolve;
pub mod store;

pub use codec::{CodecRegistry, ValueCodec};
pub use context::{ReadContext, WriteContext};
pub use error::{DocumentError, Result};
pub use fs::{FileSystem, MemoryFileSystem, StdFileSystem};
pub use mode::Mode;
pub use notify::{CollectNotifier, ErrorNotifier, LogNotifier};
pub use resolve::after_deserialized;
pub use store::{DocumentStore, StoreOptions};
