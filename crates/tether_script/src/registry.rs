//! Context-startup registry
//!
//! Maps a `ContextId` back to its live Context. Trap closures capture only
//! the id, so a trap firing after its Context is gone finds nothing instead
//! of a dangling pointer. Entries are inserted when a Context finishes
//! construction and removed when it is dropped.

use crate::context::Shared;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle naming one Context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONTEXTS: RefCell<HashMap<ContextId, Weak<Shared>>> = RefCell::new(HashMap::new());
}

pub(crate) fn next_id() -> ContextId {
    ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn register(shared: &Rc<Shared>) {
    CONTEXTS.with(|contexts| {
        contexts
            .borrow_mut()
            .insert(shared.id, Rc::downgrade(shared));
    });
}

pub(crate) fn unregister(id: ContextId) {
    // Thread-local teardown may already have run.
    let _ = CONTEXTS.try_with(|contexts| {
        if let Ok(mut contexts) = contexts.try_borrow_mut() {
            contexts.remove(&id);
        }
    });
}

pub(crate) fn lookup(id: ContextId) -> Option<Rc<Shared>> {
    CONTEXTS
        .try_with(|contexts| {
            contexts
                .try_borrow()
                .ok()
                .and_then(|contexts| contexts.get(&id).and_then(Weak::upgrade))
        })
        .ok()
        .flatten()
}

/// Number of Contexts alive on this thread.
pub fn live_contexts() -> usize {
    CONTEXTS.with(|contexts| {
        contexts
            .borrow()
            .values()
            .filter(|shared| shared.strong_count() > 0)
            .count()
    })
}
