// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-system abstraction.
//!
//! The persistence core never touches OS file APIs directly; every read,
//! write and enumeration goes through [`FileSystem`]. The standard backend
//! writes atomically (temp file, then rename) so a crash mid-pass never
//! exposes a half-written file to a later load.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage backend for documents and blob sidecars.
pub trait FileSystem: Send + Sync {
    /// Open a file for streaming reads.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Atomically replace the file at `path` with `bytes`, creating parent
    /// directories as needed.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Enumerate files under `dir`, recursively.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Check whether a file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open(path)?.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Backend over the real file system.
#[derive(Debug, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent)?;
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() {
                out.push(entry.into_path());
            }
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory backend for tests and headless tooling.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, Arc<Vec<u8>>>>,
}

impl MemoryFileSystem {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Check whether no file is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let bytes = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(Box::new(io::Cursor::new(bytes.to_vec())))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .insert(path.to_path_buf(), Arc::new(bytes.to_vec()));
        Ok(())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .read()
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/a/b.doc"), b"payload").unwrap();
        assert!(fs.exists(Path::new("/a/b.doc")));
        assert_eq!(fs.read(Path::new("/a/b.doc")).unwrap(), b"payload");
        assert_eq!(fs.list(Path::new("/a")).unwrap().len(), 1);
        assert!(fs.open(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_std_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem::new();
        let path = dir.path().join("nested/unit.doc");
        fs.write(&path, b"one").unwrap();
        fs.write(&path, b"two").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"two");
        let listed = fs.list(dir.path()).unwrap();
        assert_eq!(listed, vec![path]);
    }
}
