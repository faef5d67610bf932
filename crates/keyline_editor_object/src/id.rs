// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable object identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an object.
///
/// Ids are 128-bit and stable for the lifetime of an object. They are only
/// reassigned through [`crate::Object::set_id`] during an explicit
/// cross-document merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Create a new random object ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an ID from its string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
