//! Per-Context identity cache
//!
//! Two directions, both keyed by a slot id that the engine-side WeakMap
//! attaches to the engine object:
//! - engine object -> host handle: `handles`, holding a strong root on the
//!   engine object and a weak reference to the host handle;
//! - host object -> proxy: `proxies`, holding an engine `WeakRef` to the
//!   proxy, plus `records` mapping the proxy's slot to its record.
//!
//! Never hold a borrow of the cache across a call into the engine: any
//! engine allocation can run the collector, whose finalizers come back here.

use crate::proxy::ProxyRecord;
use crate::lifecycle::ScriptHandle;
use rquickjs::{Object, Persistent};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub(crate) type SlotId = u32;

/// Key of a host object (its `Rc` address).
pub(crate) type HostKey = usize;

pub(crate) struct HandleEntry {
    /// Keeps the engine object alive while a host handle may exist.
    pub retained: Persistent<Object<'static>>,
    pub handle: Weak<ScriptHandle>,
}

pub(crate) struct ProxyEntry {
    pub slot: SlotId,
    /// Engine `WeakRef` whose target is the proxy.
    pub weak: Persistent<Object<'static>>,
}

#[derive(Default)]
pub(crate) struct IdentityCache {
    next_slot: SlotId,
    handles: HashMap<SlotId, HandleEntry>,
    proxies: HashMap<HostKey, ProxyEntry>,
    records: HashMap<SlotId, Weak<ProxyRecord>>,
}

impl IdentityCache {
    pub fn allocate_slot(&mut self) -> SlotId {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub fn handle(&self, slot: SlotId) -> Option<&HandleEntry> {
        self.handles.get(&slot)
    }

    pub fn insert_handle(&mut self, slot: SlotId, entry: HandleEntry) {
        self.handles.insert(slot, entry);
    }

    pub fn remove_handle(&mut self, slot: SlotId) -> Option<HandleEntry> {
        self.handles.remove(&slot)
    }

    /// Remove the entry only if no host handle for it is left.
    pub fn remove_dead_handle(&mut self, slot: SlotId) -> Option<HandleEntry> {
        match self.handles.get(&slot) {
            Some(entry) if entry.handle.strong_count() == 0 => self.handles.remove(&slot),
            _ => None,
        }
    }

    pub fn proxy(&self, key: HostKey) -> Option<&ProxyEntry> {
        self.proxies.get(&key)
    }

    pub fn insert_proxy(&mut self, key: HostKey, entry: ProxyEntry) -> Option<ProxyEntry> {
        self.proxies.insert(key, entry)
    }

    /// Remove the proxy entry for `key` if it still points at `slot`.
    pub fn remove_proxy(&mut self, key: HostKey, slot: SlotId) -> Option<ProxyEntry> {
        match self.proxies.get(&key) {
            Some(entry) if entry.slot == slot => self.proxies.remove(&key),
            _ => None,
        }
    }

    pub fn record(&self, slot: SlotId) -> Option<Rc<ProxyRecord>> {
        self.records.get(&slot).and_then(Weak::upgrade)
    }

    pub fn insert_record(&mut self, slot: SlotId, record: &Rc<ProxyRecord>) {
        self.records.insert(slot, Rc::downgrade(record));
    }

    pub fn remove_record(&mut self, slot: SlotId) {
        self.records.remove(&slot);
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Empty the cache, returning the live records and every engine root.
    ///
    /// The caller drops the roots while it holds the engine lock.
    pub fn drain(&mut self) -> (Vec<Rc<ProxyRecord>>, Vec<Persistent<Object<'static>>>) {
        let records = self.records.drain().filter_map(|(_, r)| r.upgrade()).collect();
        let roots = self
            .handles
            .drain()
            .map(|(_, entry)| entry.retained)
            .chain(self.proxies.drain().map(|(_, entry)| entry.weak))
            .collect();
        (records, roots)
    }
}
