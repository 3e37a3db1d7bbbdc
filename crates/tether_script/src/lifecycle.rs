//! Lifecycle coordination between the two collectors
//!
//! Engine -> host: an engine object crossing to the host becomes a
//! [`ScriptHandle`]. The identity cache keeps the engine object rooted while
//! the handle lives; dropping the last handle queues its slot, and the next
//! Context boundary releases the root.
//!
//! Host -> engine: a proxy's [`ProxyRecord`] is owned by its trap functions.
//! When the engine collects the proxy, the record is dropped and its `Drop`
//! impl is the finalizer: it releases the host reference and destroys the
//! bound method descriptors. It never calls into the engine; cache entries
//! holding engine roots are queued and evicted at the next boundary.

use crate::context::Shared;
use crate::error::BridgeError;
use crate::identity::{HandleEntry, SlotId};
use crate::proxy::ProxyRecord;
use crate::registry::{self, ContextId};
use crate::scope::Scope;
use rquickjs::function::{Rest, This};
use rquickjs::{Object, Persistent, Value};
use std::any::Any;
use std::rc::{Rc, Weak};
use tether_host::{Capability, HostError, HostObject, HostObjectRef, HostValue, ProxyTarget, ScriptAccess};

/// Host-side reference to an engine object.
///
/// Keeps the engine object alive for as long as the host holds it. Passing
/// it back into its own Context restores the original engine object; passing
/// it into another Context wraps it in a proxy that dispatches back here.
pub struct ScriptHandle {
    context: ContextId,
    slot: SlotId,
    shared: Weak<Shared>,
}

impl ScriptHandle {
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }

    /// Whether the owning Context is still alive.
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    fn owner(&self) -> Result<Rc<Shared>, HostError> {
        self.shared
            .upgrade()
            .ok_or_else(|| BridgeError::ContextClosed.into_host_error())
    }
}

impl std::fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandle")
            .field("context", &self.context.0)
            .field("slot", &self.slot)
            .finish()
    }
}

impl HostObject for ScriptHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &str {
        "ScriptHandle"
    }

    fn proxy_target(&self) -> Option<&dyn ProxyTarget> {
        Some(self)
    }
}

impl ProxyTarget for ScriptHandle {
    fn capability(&self) -> Capability {
        Capability::Both
    }

    fn get(&self, _access: &mut dyn ScriptAccess, name: &str) -> Result<HostValue, HostError> {
        let slot = self.slot;
        self.owner()?
            .enter(|scope| {
                let object = scope.retained(slot)?;
                let value: Value = scope.js(object.get(name))?;
                scope.from_js(value)
            })
            .map_err(BridgeError::into_host_error)
    }

    fn invoke(
        &self,
        _access: &mut dyn ScriptAccess,
        this: HostValue,
        args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        let slot = self.slot;
        self.owner()?
            .enter(|scope| {
                let object = scope.retained(slot)?;
                let Some(function) = object.into_value().into_function() else {
                    return Err(scope.type_error("script handle is not a function"));
                };
                let this = scope.to_js(&this)?;
                let args = args
                    .iter()
                    .map(|arg| scope.to_js(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let result: Value = scope.js(function.call((This(this), Rest(args))))?;
                scope.from_js(result)
            })
            .map_err(BridgeError::into_host_error)
    }
}

impl Drop for ScriptHandle {
    fn drop(&mut self) {
        let Some(owner) = self.shared.upgrade() else {
            return;
        };
        let queued = match owner.state.released.try_borrow_mut() {
            Ok(mut released) => {
                released.push(self.slot);
                true
            }
            Err(_) => false,
        };
        if !queued {
            tracing::warn!(
                context = self.context.0,
                slot = self.slot,
                "release queue busy, script object stays rooted"
            );
        }
    }
}

impl Drop for ProxyRecord {
    fn drop(&mut self) {
        let binding = self.binding.get_mut().take();
        let methods = std::mem::take(self.methods.get_mut());

        // Context already torn down: nothing left to unregister from.
        if let Some(owner) = registry::lookup(self.context) {
            let state = &owner.state;
            let unregistered = match state.identity.try_borrow_mut() {
                Ok(mut cache) => {
                    cache.remove_record(self.slot);
                    true
                }
                Err(_) => false,
            };
            let deferred = match state.finalized.try_borrow_mut() {
                Ok(mut finalized) => {
                    finalized.push((self.key, self.slot));
                    true
                }
                Err(_) => false,
            };
            if !(unregistered && deferred) {
                state.mark_fatal(BridgeError::Fatal(format!(
                    "finalizer for proxy slot {} could not update the identity cache",
                    self.slot
                )));
            }
            tether_metrics::metrics! {
                if let Ok(mut metrics) = state.metrics.try_borrow_mut() {
                    metrics.increment(crate::stats::DESCRIPTORS_DESTROYED, methods.len());
                    metrics.increment(crate::stats::PROXIES_FINALIZED, 1);
                }
            }
            tracing::trace!(context = self.context.0, slot = self.slot, "proxy finalized");
        }

        drop(methods);
        drop(binding);
    }
}

impl ProxyRecord {
    /// Drop the host reference early, at Context teardown.
    pub(crate) fn release(&self) {
        let binding = match self.binding.try_borrow_mut() {
            Ok(mut binding) => binding.take(),
            Err(_) => None,
        };
        drop(binding);
    }
}

impl<'js> Scope<'js> {
    /// Host handle for an engine object leaving the engine.
    ///
    /// A proxy yields its original host object. An object that already has
    /// a live handle yields that same handle.
    pub(crate) fn host_handle_for(&self, object: Object<'js>) -> Result<HostValue, BridgeError> {
        let helpers = self.helpers()?;
        let tagged = self.js(helpers.slot_of(&self.ctx, &object))?;

        if let Some(slot) = tagged {
            let record = self.state().identity.borrow().record(slot);
            if let Some(record) = record {
                return match record.binding() {
                    Some(binding) => Ok(HostValue::Object(binding.origin().clone())),
                    None => Err(self.poison(BridgeError::DanglingHandle(format!(
                        "proxy slot {slot} outlived its host object"
                    )))),
                };
            }

            let live = self
                .state()
                .identity
                .borrow()
                .handle(slot)
                .and_then(|entry| entry.handle.upgrade());
            if let Some(handle) = live {
                let handle: HostObjectRef = handle;
                return Ok(HostValue::Object(handle));
            }

            let stale = self.state().identity.borrow_mut().remove_handle(slot);
            if stale.is_some() {
                tether_metrics::metrics! {
                    self.state().metrics.borrow_mut().increment(crate::stats::HANDLES_RECREATED, 1);
                }
                tracing::debug!(context = self.shared.id.0, slot, "recreating released script handle");
            }
            drop(stale);
        }

        let slot = self.state().identity.borrow_mut().allocate_slot();
        self.js(helpers.tag(&self.ctx, &object, slot))?;
        let handle = Rc::new(ScriptHandle {
            context: self.shared.id,
            slot,
            shared: Rc::downgrade(&self.shared),
        });
        let retained = Persistent::save(&self.ctx, object);
        self.state().identity.borrow_mut().insert_handle(
            slot,
            HandleEntry {
                retained,
                handle: Rc::downgrade(&handle),
            },
        );

        tether_metrics::metrics! {
            self.state().metrics.borrow_mut().increment(crate::stats::HANDLES_CREATED, 1);
        }
        tracing::debug!(context = self.shared.id.0, slot, "script handle created");
        let handle: HostObjectRef = handle;
        Ok(HostValue::Object(handle))
    }

    /// Release roots of dropped handles and evict entries of finalized
    /// proxies.
    pub(crate) fn drain_released(&self) {
        let state = self.state();
        let released = std::mem::take(&mut *state.released.borrow_mut());
        let finalized = std::mem::take(&mut *state.finalized.borrow_mut());
        if released.is_empty() && finalized.is_empty() {
            return;
        }

        let mut handles = Vec::with_capacity(released.len());
        let mut proxies = Vec::with_capacity(finalized.len());
        {
            let mut cache = state.identity.borrow_mut();
            handles.extend(released.into_iter().filter_map(|slot| cache.remove_dead_handle(slot)));
            proxies.extend(
                finalized
                    .into_iter()
                    .filter_map(|(key, slot)| cache.remove_proxy(key, slot)),
            );
        }

        tether_metrics::metrics! {
            state.metrics.borrow_mut().increment(crate::stats::HANDLES_RELEASED, handles.len());
        }
        tracing::trace!(
            context = self.shared.id.0,
            handles = handles.len(),
            proxies = proxies.len(),
            "released engine roots"
        );
        drop(handles);
        drop(proxies);
    }
}

#[cfg(test)]
mod tests {
    use crate::Context;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tether_host::{HostError, HostObject, HostValue, ScriptAccess};

    /// Forgets what `discard` receives, remembers what `keep` receives.
    #[derive(Default)]
    struct Inbox {
        kept: RefCell<Option<HostValue>>,
    }

    impl HostObject for Inbox {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn method_names(&self) -> Vec<String> {
            vec!["discard".into(), "keep".into()]
        }

        fn call_method(
            &self,
            _access: &mut dyn ScriptAccess,
            name: &str,
            args: Vec<HostValue>,
        ) -> Result<HostValue, HostError> {
            match name {
                "discard" => Ok(HostValue::Null),
                "keep" => {
                    *self.kept.borrow_mut() = args.into_iter().next();
                    Ok(HostValue::Null)
                }
                other => Err(HostError::unsupported(other, "Inbox")),
            }
        }
    }

    #[test]
    fn handles_dropped_mid_call_are_recreated() {
        let context = Context::new().unwrap();
        let inbox = Rc::new(Inbox::default());
        let as_object: tether_host::HostObjectRef = inbox.clone();
        context
            .set_global_property(&"inbox".into(), &HostValue::Object(as_object))
            .unwrap();

        context
            .evaluate(
                "globalThis.letter = {}; inbox.discard(letter); inbox.keep(letter);",
                "mail.js",
            )
            .unwrap();

        #[cfg(feature = "metrics")]
        assert_eq!(context.counter(crate::stats::HANDLES_RECREATED), 1);
        assert_eq!(context.retained_handles(), 1);

        let kept = inbox.kept.borrow_mut().take().unwrap();
        let is_letter = context
            .compile("function (o) { return o === globalThis.letter; }", "check.js")
            .unwrap();
        assert_eq!(context.call(&is_letter, &[kept]).unwrap(), HostValue::Bool(true));
    }

    #[test]
    fn released_handles_are_recreated_on_next_crossing() {
        let context = Context::new().unwrap();
        let first = context
            .evaluate("globalThis.kept = {}; kept", "kept.js")
            .unwrap();
        drop(first);
        assert_eq!(context.retained_handles(), 1);

        // The boundary drains the dropped handle before evaluating.
        let second = context.evaluate("kept", "kept.js").unwrap();
        assert_eq!(context.retained_handles(), 1);

        let is_kept = context
            .compile("function (o) { return o === globalThis.kept; }", "check.js")
            .unwrap();
        assert_eq!(
            context.call(&is_kept, &[second]).unwrap(),
            HostValue::Bool(true)
        );
    }
}
