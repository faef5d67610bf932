// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document store.
//!
//! The store is the public entry point of the persistence engine: it owns
//! the file-system backend, the error notifier and the store options, and
//! runs whole serialization passes over object trees and storable units.

use crate::blob;
use crate::codec::CodecRegistry;
use crate::context::{self, PassEnv, PassShared};
use crate::error::{DocumentError, Result};
use crate::fs::FileSystem;
use crate::mode::Mode;
use crate::notify::{ErrorNotifier, LogNotifier};
use crate::resolve::after_deserialized;
use keyline_editor_object::{Blob, ClassRegistry, Object, ObjectClass, ObjectId};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tunables for document storage.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Pretty-print documents. On by default; documents are meant to be
    /// readable and diffable.
    pub pretty: bool,
    /// Payloads at or above this size (bytes) move to sidecar files under
    /// [`Mode::WRITE_BLOB_FILES`].
    pub blob_inline_limit: u64,
    /// Write a `.backup` sibling before overwriting an existing unit.
    pub backup: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            blob_inline_limit: 1024,
            backup: false,
        }
    }
}

/// Reads and writes object trees as JSON documents.
pub struct DocumentStore {
    fs: Arc<dyn FileSystem>,
    notifier: Arc<dyn ErrorNotifier>,
    options: StoreOptions,
}

impl DocumentStore {
    /// Create a store over a file-system backend, logging recovered
    /// errors.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            notifier: Arc::new(LogNotifier),
            options: StoreOptions::default(),
        }
    }

    /// Replace the error notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn ErrorNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the store options.
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Current store options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn env<'a>(
        &'a self,
        shared: &'a PassShared,
        mode: Mode,
        base_dir: PathBuf,
        root_id: Option<ObjectId>,
    ) -> PassEnv<'a> {
        PassEnv::new(
            mode,
            self.notifier.as_ref(),
            self.fs.as_ref(),
            ClassRegistry::global(),
            CodecRegistry::global(),
            &self.options,
            base_dir,
            root_id,
            shared,
        )
    }

    /// Serialize an object tree into a document.
    ///
    /// `base_dir` anchors relative paths and sidecar files. Under
    /// [`Mode::SAVE_REFERENCED`], referenced storable units flush to their
    /// own files as a side effect.
    pub fn serialize(
        &self,
        object: &Object,
        mode: Mode,
        base_dir: &Path,
    ) -> Result<serde_json::Value> {
        let shared = PassShared::new();
        let env = self.env(
            &shared,
            mode | Mode::WRITE,
            base_dir.to_path_buf(),
            Some(object.id()),
        );
        context::write_document(&env, object)
    }

    /// Reconstruct an object tree from a document read against a known
    /// target class.
    pub fn deserialize(
        &self,
        doc: &serde_json::Value,
        class: &'static ObjectClass,
        mode: Mode,
        base_dir: &Path,
    ) -> Result<Object> {
        let shared = PassShared::new();
        let env = self.env(
            &shared,
            mode | Mode::READ,
            base_dir.to_path_buf(),
            None,
        );
        let object = context::read_document(&env, doc, Some(class))?;
        after_deserialized(&object);
        object.clear_dirty();
        Ok(object)
    }

    /// Deserialize a document into an existing instance.
    ///
    /// An id in the document reassigns the instance's id, firing any
    /// resolutions pending under it; used for cross-document merge.
    pub fn populate(
        &self,
        doc: &serde_json::Value,
        object: &Object,
        mode: Mode,
        base_dir: &Path,
    ) -> Result<()> {
        let shared = PassShared::new();
        let env = self.env(
            &shared,
            mode | Mode::READ,
            base_dir.to_path_buf(),
            None,
        );
        context::populate_document(&env, doc, object)?;
        after_deserialized(object);
        Ok(())
    }

    /// Save a storable unit to its assigned location.
    ///
    /// An explicit save always writes, even when the unit is unchanged;
    /// the skip-if-unchanged optimization only applies to referenced
    /// children reached during the pass.
    pub fn save_unit(&self, object: &Object, mode: Mode) -> Result<PathBuf> {
        let uri = object.uri().ok_or(DocumentError::MissingUri {
            class: object.class().name(),
        })?;
        let base_dir = uri
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        let shared = PassShared::new();
        let env = self.env(
            &shared,
            mode | Mode::WRITE,
            base_dir,
            Some(object.id()),
        );
        context::flush_unit(&env, object, true)
    }

    /// Assign a location, then save.
    pub fn save_unit_as(
        &self,
        object: &Object,
        path: &Path,
        mode: Mode,
    ) -> Result<PathBuf> {
        object.set_uri(Some(path.to_path_buf()));
        self.save_unit(object, mode)
    }

    /// Load a storable unit from a file.
    ///
    /// The root discriminator picks the class; a failure at the root is
    /// fatal. References into documents loaded earlier resolve during the
    /// pass, the rest stay queryable as unresolved tokens.
    pub fn load_unit(&self, path: &Path, mode: Mode) -> Result<Object> {
        let base_dir = path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        let shared = PassShared::new();
        let env = self.env(&shared, mode | Mode::READ, base_dir, None);
        let object = context::load_unit_in_pass(&env, path)?;
        after_deserialized(&object);
        tracing::info!(
            class = object.class().name(),
            id = %object.id(),
            path = %path.display(),
            "loaded unit"
        );
        Ok(object)
    }

    /// Open a blob payload for streaming reads through the store's
    /// backend.
    pub fn open_blob(&self, payload: &Blob) -> Result<Box<dyn Read + Send>> {
        blob::open_blob(self.fs.as_ref(), payload)
    }
}
