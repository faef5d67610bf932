// SPDX-License-Identifier: MIT OR Apache-2.0
//! Id-based reference tokens.
//!
//! A [`Reference`] is the serializable form of a non-containment edge
//! between objects. It has three states: null, unresolved (id only) and
//! resolved (id plus a live weak pointer). Resolution is monotonic; clones
//! of a token share state, so resolving one resolves them all.

use crate::id::ObjectId;
use crate::object::{Object, WeakObject};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Debug)]
struct ReferenceInner {
    id: Option<ObjectId>,
    target: OnceCell<WeakObject>,
}

/// A lazily resolved pointer to another object.
#[derive(Debug, Clone)]
pub struct Reference {
    inner: Arc<ReferenceInner>,
}

impl Reference {
    /// A token for explicit absence.
    pub fn null() -> Self {
        Self {
            inner: Arc::new(ReferenceInner {
                id: None,
                target: OnceCell::new(),
            }),
        }
    }

    /// An unresolved token carrying only an id.
    pub fn to(id: ObjectId) -> Self {
        Self {
            inner: Arc::new(ReferenceInner {
                id: Some(id),
                target: OnceCell::new(),
            }),
        }
    }

    /// A token already resolved to a live object.
    pub fn resolved(target: &Object) -> Self {
        let token = Self::to(target.id());
        let _ = token.inner.target.set(target.downgrade());
        token
    }

    /// Id of the target, `None` for a null token.
    pub fn id(&self) -> Option<ObjectId> {
        self.inner.id
    }

    /// Check for explicit absence.
    pub fn is_null(&self) -> bool {
        self.inner.id.is_none()
    }

    /// Check whether the token has been resolved to a live pointer.
    pub fn is_resolved(&self) -> bool {
        self.inner.target.get().is_some()
    }

    /// The target object, if the token is resolved and the target is still
    /// alive. An unresolved token yields `None`; this is the queryable
    /// "unresolved" state, not an error.
    pub fn get(&self) -> Option<Object> {
        self.inner.target.get().and_then(WeakObject::upgrade)
    }

    /// Resolve the token in place.
    ///
    /// Returns `true` when this call performed the resolution. Ids must
    /// match; a second resolution attempt is a no-op, keeping resolution
    /// monotonic.
    pub fn resolve_to(&self, target: &Object) -> bool {
        if self.inner.id != Some(target.id()) {
            return false;
        }
        self.inner.target.set(target.downgrade()).is_ok()
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Reference {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ObjectClass;
    use once_cell::sync::Lazy;

    static TEST_CLASS: Lazy<ObjectClass> =
        Lazy::new(|| ObjectClass::builder("RefTest").build());

    #[test]
    fn test_null_token() {
        let token = Reference::null();
        assert!(token.is_null());
        assert!(token.id().is_none());
        assert!(token.get().is_none());
    }

    #[test]
    fn test_resolution_is_monotonic() {
        let a = Object::new(&TEST_CLASS);
        let token = Reference::to(a.id());
        assert!(!token.is_resolved());
        assert!(token.resolve_to(&a));
        assert!(!token.resolve_to(&a));
        assert_eq!(token.get().unwrap().id(), a.id());
    }

    #[test]
    fn test_resolution_rejects_wrong_id() {
        let a = Object::new(&TEST_CLASS);
        let b = Object::new(&TEST_CLASS);
        let token = Reference::to(a.id());
        assert!(!token.resolve_to(&b));
        assert!(!token.is_resolved());
    }

    #[test]
    fn test_clones_share_resolution() {
        let a = Object::new(&TEST_CLASS);
        let token = Reference::to(a.id());
        let clone = token.clone();
        token.resolve_to(&a);
        assert!(clone.is_resolved());
    }

    #[test]
    fn test_dead_target_yields_none() {
        let token;
        {
            let a = Object::new(&TEST_CLASS);
            token = Reference::resolved(&a);
            assert!(token.get().is_some());
        }
        assert!(token.get().is_none());
    }
}
