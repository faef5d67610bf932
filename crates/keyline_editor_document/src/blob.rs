// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blob externalization.
//!
//! Binary payloads are inlined as hex strings by default. Under
//! [`crate::Mode::WRITE_BLOB_FILES`], payloads above the configured limit
//! are written as sibling files named deterministically from the owning
//! object and property, and read back as streams through the file-system
//! abstraction instead of being inlined.

use crate::error::{DocumentError, Result};
use crate::fs::FileSystem;
use crate::path;
use keyline_editor_object::{Blob, ObjectId};
use serde_json::json;
use std::io::Read;
use std::path::Path;

/// Deterministic sidecar file name for a blob property.
pub fn blob_file_name(owner: ObjectId, property: &str) -> String {
    format!("{owner}.{property}.blob")
}

/// Encode a blob into its document node, externalizing when asked.
///
/// `base_dir` is the directory of the document being written; external
/// payloads land there as sibling files.
pub fn encode_blob(
    fs: &dyn FileSystem,
    base_dir: &Path,
    owner: ObjectId,
    property: &str,
    blob: &Blob,
    externalize: bool,
) -> Result<serde_json::Value> {
    match blob {
        Blob::Inline(bytes) if externalize => {
            let name = blob_file_name(owner, property);
            let target = base_dir.join(&name);
            fs.write(&target, bytes)?;
            Ok(json!({ "file": name, "size": bytes.len() as u64 }))
        }
        Blob::Inline(bytes) => Ok(json!({ "data": hex::encode(bytes.as_slice()) })),
        Blob::External { path: target, size } => {
            let rel = path::relative_path(base_dir, target);
            Ok(json!({ "file": path::to_wire(&rel), "size": size }))
        }
    }
}

/// Decode a blob node written by [`encode_blob`].
///
/// External paths resolve against `base_dir` at decode time, so the value
/// stays valid when the owning document later saves elsewhere.
pub fn decode_blob(
    base_dir: &Path,
    node: &serde_json::Map<String, serde_json::Value>,
    property_path: &str,
) -> Result<Blob> {
    if let Some(data) = node.get("data") {
        let text = data.as_str().ok_or_else(|| DocumentError::Malformed {
            path: property_path.to_string(),
            reason: "blob `data` is not a string".into(),
        })?;
        let bytes = hex::decode(text).map_err(|e| DocumentError::Malformed {
            path: property_path.to_string(),
            reason: format!("blob payload is not valid hex: {e}"),
        })?;
        return Ok(Blob::from_bytes(bytes));
    }
    if let Some(file) = node.get("file") {
        let text = file.as_str().ok_or_else(|| DocumentError::Malformed {
            path: property_path.to_string(),
            reason: "blob `file` is not a string".into(),
        })?;
        let size = node.get("size").and_then(serde_json::Value::as_u64).unwrap_or(0);
        return Ok(Blob::External {
            path: path::resolve_path(base_dir, &path::from_wire(text)),
            size,
        });
    }
    Err(DocumentError::Malformed {
        path: property_path.to_string(),
        reason: "blob node has neither `data` nor `file`".into(),
    })
}

/// Open a blob's payload for streaming reads.
pub fn open_blob(
    fs: &dyn FileSystem,
    blob: &Blob,
) -> Result<Box<dyn Read + Send>> {
    match blob {
        Blob::Inline(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.to_vec()))),
        Blob::External { path: target, .. } => Ok(fs.open(target)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn test_inline_roundtrip() {
        let fs = MemoryFileSystem::new();
        let blob = Blob::from_bytes(vec![0xde, 0xad]);
        let owner = ObjectId::new();
        let node =
            encode_blob(&fs, Path::new("/doc"), owner, "payload", &blob, false)
                .unwrap();
        assert_eq!(node, json!({ "data": "dead" }));
        let decoded =
            decode_blob(Path::new("/doc"), node.as_object().unwrap(), "payload")
                .unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_externalized_blob() {
        let fs = MemoryFileSystem::new();
        let blob = Blob::from_bytes(vec![1, 2, 3, 4]);
        let owner = ObjectId::new();
        let node =
            encode_blob(&fs, Path::new("/doc"), owner, "payload", &blob, true)
                .unwrap();
        let expected = blob_file_name(owner, "payload");
        assert!(fs.exists(&Path::new("/doc").join(&expected)));
        assert_eq!(node["file"], json!(expected));
        assert_eq!(node["size"], json!(4));

        let decoded =
            decode_blob(Path::new("/doc"), node.as_object().unwrap(), "payload")
                .unwrap();
        let mut reader = open_blob(&fs, &decoded).unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_malformed_blob_node() {
        let node = serde_json::Map::new();
        assert!(decode_blob(Path::new("/doc"), &node, "payload").is_err());
    }
}
