// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide object registry.
//!
//! The registry maps ids to live objects through weak handles; it is never
//! the reason an object stays alive. `resolve` either fires its
//! continuation synchronously (target already registered) or queues it
//! FIFO under the id until the target registers. All table operations are
//! mutually exclusive behind one lock; continuations run outside the lock
//! through an iterative drain queue, so chained resolutions never grow the
//! stack.

use crate::id::ObjectId;
use crate::object::{Object, WeakObject};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

type Continuation = Box<dyn FnOnce(Object) + Send>;

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

#[derive(Default)]
struct Table {
    objects: HashMap<ObjectId, WeakObject>,
    pending: HashMap<ObjectId, VecDeque<Continuation>>,
}

/// Weak id→object table with deferred resolution callbacks.
pub struct ObjectRegistry {
    table: Mutex<Table>,
    ready: Mutex<VecDeque<(Continuation, Object)>>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
            ready: Mutex::new(VecDeque::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ObjectRegistry {
        static GLOBAL: Lazy<ObjectRegistry> = Lazy::new(ObjectRegistry::new);
        &GLOBAL
    }

    /// Store a weak association for the object's id and fire every
    /// resolution queued under it, each exactly once.
    pub fn register(&self, object: &Object) {
        let id = object.id();
        // Upgraded handles must outlive the lock: dropping the last strong
        // handle re-enters the registry through the reclamation path.
        let mut displaced: Option<Object> = None;
        let fired = {
            let mut table = self.table.lock();
            if let Some(live) = table
                .objects
                .get(&id)
                .and_then(WeakObject::upgrade)
            {
                if live != *object {
                    tracing::warn!(%id, "re-registering id over a live object");
                }
                displaced = Some(live);
            }
            table.objects.insert(id, object.downgrade());
            table.pending.remove(&id)
        };
        drop(displaced);
        object.set_registered(true);
        if let Some(queue) = fired {
            let mut ready = self.ready.lock();
            for continuation in queue {
                ready.push_back((continuation, object.clone()));
            }
            drop(ready);
            self.drain();
        }
    }

    /// Remove the association for this object, purging resolutions still
    /// pending under its id. Idempotent; a mapping that meanwhile points
    /// at a different live object is left alone.
    pub fn unregister(&self, object: &Object) {
        let id = object.id();
        let mut upgraded: Option<Object> = None;
        let purged = {
            let mut table = self.table.lock();
            let mapped = table.objects.get(&id).map(|weak| match weak.upgrade() {
                Some(live) => {
                    let ours = live == *object;
                    upgraded = Some(live);
                    ours
                }
                None => true,
            });
            match mapped {
                Some(true) => {
                    table.objects.remove(&id);
                    table.pending.remove(&id)
                }
                // The id belongs to a different live object now; its queue
                // is not ours to purge.
                Some(false) => None,
                None => table.pending.remove(&id),
            }
        };
        object.set_registered(false);
        // Queued continuations may own objects; drop them (and any upgraded
        // handle) outside the lock.
        drop(purged);
        drop(upgraded);
    }

    /// Drop-time reclamation of a dead association. Idempotent and safe to
    /// race with explicit unregistration.
    pub(crate) fn reclaim(&self, id: ObjectId) {
        let mut survivor: Option<Object> = None;
        let purged = {
            let mut table = self.table.lock();
            let dead = match table.objects.get(&id) {
                Some(weak) => match weak.upgrade() {
                    Some(live) => {
                        survivor = Some(live);
                        false
                    }
                    None => true,
                },
                None => false,
            };
            if dead {
                table.objects.remove(&id);
                table.pending.remove(&id)
            } else {
                None
            }
        };
        drop(purged);
        drop(survivor);
    }

    /// Move a registered object's mapping from `old` to `new`, firing
    /// resolutions pending under the new id. Supports cross-document
    /// merge, where an existing object takes over an expected id.
    pub fn reassign(&self, old: ObjectId, new: ObjectId, object: &Object) {
        let mut upgraded: Option<Object> = None;
        let fired = {
            let mut table = self.table.lock();
            let ours = table.objects.get(&old).is_some_and(|weak| {
                match weak.upgrade() {
                    Some(live) => {
                        let ours = live == *object;
                        upgraded = Some(live);
                        ours
                    }
                    None => true,
                }
            });
            if ours {
                table.objects.remove(&old);
            }
            table.objects.insert(new, object.downgrade());
            table.pending.remove(&new)
        };
        drop(upgraded);
        if let Some(queue) = fired {
            let mut ready = self.ready.lock();
            for continuation in queue {
                ready.push_back((continuation, object.clone()));
            }
            drop(ready);
            self.drain();
        }
    }

    /// Look up a live object by id. Prunes a dead association on the way.
    pub fn find(&self, id: ObjectId) -> Option<Object> {
        let mut table = self.table.lock();
        match table.objects.get(&id).map(WeakObject::upgrade) {
            Some(Some(object)) => Some(object),
            Some(None) => {
                table.objects.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Resolve an id now or once its target registers.
    ///
    /// The continuation fires exactly once, synchronously when the id is
    /// already registered, otherwise when a matching registration (or id
    /// reassignment) happens later. Unregistration discards it.
    pub fn resolve(
        &self,
        id: ObjectId,
        continuation: impl FnOnce(Object) + Send + 'static,
    ) {
        let continuation: Continuation = Box::new(continuation);
        let target = {
            let mut table = self.table.lock();
            match table.objects.get(&id).and_then(WeakObject::upgrade) {
                Some(object) => Some((continuation, object)),
                None => {
                    table
                        .pending
                        .entry(id)
                        .or_default()
                        .push_back(continuation);
                    None
                }
            }
        };
        if let Some((continuation, object)) = target {
            self.ready.lock().push_back((continuation, object));
            self.drain();
        }
    }

    /// Number of resolutions still queued under an id.
    pub fn pending_count(&self, id: ObjectId) -> usize {
        self.table
            .lock()
            .pending
            .get(&id)
            .map_or(0, VecDeque::len)
    }

    /// Run ready continuations until the queue is empty.
    ///
    /// Re-entrant calls on the same thread only enqueue; the outermost
    /// call drains, which bounds stack depth on long resolution chains.
    fn drain(&self) {
        if DRAINING.with(Cell::get) {
            return;
        }
        DRAINING.with(|flag| flag.set(true));
        loop {
            let next = self.ready.lock().pop_front();
            match next {
                Some((continuation, object)) => continuation(object),
                None => break,
            }
        }
        DRAINING.with(|flag| flag.set(false));
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
