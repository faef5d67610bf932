// SPDX-License-Identifier: MIT OR Apache-2.0
//! Relative paths between documents.
//!
//! Composition containers store externally persisted children as paths
//! relative to the parent document's directory; on load those paths
//! resolve back against the parent's base directory. All computation is
//! lexical, using `/` separators on the wire.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, resolving `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Compute the path of `target` relative to `base_dir`.
///
/// Falls back to `target` itself when the two share no common prefix
/// (different roots or drives).
pub fn relative_path(base_dir: &Path, target: &Path) -> PathBuf {
    let base = normalize(base_dir);
    let target = normalize(target);

    let base_components: Vec<Component> = base.components().collect();
    let target_components: Vec<Component> = target.components().collect();

    if base.is_absolute() != target.is_absolute() {
        return target;
    }

    let mut shared = 0;
    while shared < base_components.len()
        && shared < target_components.len()
        && base_components[shared] == target_components[shared]
    {
        shared += 1;
    }

    if shared == 0 && base.is_absolute() {
        // No common root to climb out of.
        return target;
    }

    let mut out = PathBuf::new();
    for _ in shared..base_components.len() {
        out.push("..");
    }
    for component in &target_components[shared..] {
        out.push(component.as_os_str());
    }
    out
}

/// Resolve a document-relative path against a base directory.
pub fn resolve_path(base_dir: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        normalize(relative)
    } else {
        normalize(&base_dir.join(relative))
    }
}

/// Render a path with `/` separators for the wire.
pub fn to_wire(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a wire path back into a native path.
pub fn from_wire(text: &str) -> PathBuf {
    text.split('/').collect()
}
