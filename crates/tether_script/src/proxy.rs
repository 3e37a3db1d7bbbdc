//! Proxy bridge: host object -> engine-heap proxy
//!
//! A proxy is an engine `Proxy` over a callable placeholder whose handler
//! forwards `get` and `apply` to trap functions (see `intercept`). The trap
//! functions own the [`ProxyRecord`]; when the engine collects the proxy the
//! traps go with it and the record's `Drop` runs as the finalizer.

use crate::error::BridgeError;
use crate::identity::{HostKey, ProxyEntry, SlotId};
use crate::intercept;
use crate::lifecycle::ScriptHandle;
use crate::registry::ContextId;
use crate::scope::Scope;
use rquickjs::function::Rest;
use rquickjs::{Array, Ctx, Function, Object, Persistent, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tether_host::{host_key, Capability, HostObjectAdapter, HostObjectRef, MethodDescriptor, ProxyTarget};

/// How a proxy reaches its host object.
#[derive(Clone)]
pub(crate) enum Binding {
    /// The object implements `ProxyTarget` itself.
    Native(HostObjectRef),
    /// Plain host object behind the generic adapter.
    Adapted(Rc<HostObjectAdapter>),
}

impl Binding {
    pub fn classify(object: HostObjectRef) -> Self {
        if object.proxy_target().is_some() {
            Binding::Native(object)
        } else {
            Binding::Adapted(Rc::new(HostObjectAdapter::new(object)))
        }
    }

    /// The object the host handed us; what comes back when the proxy
    /// crosses back.
    pub fn origin(&self) -> &HostObjectRef {
        match self {
            Binding::Native(object) => object,
            Binding::Adapted(adapter) => adapter.object(),
        }
    }

    pub fn target(&self) -> Option<&dyn ProxyTarget> {
        match self {
            Binding::Native(object) => object.proxy_target(),
            Binding::Adapted(adapter) => Some(&**adapter),
        }
    }

    pub fn capability(&self) -> Capability {
        self.target()
            .map(|target| target.capability())
            .unwrap_or(Capability::Gettable)
    }
}

/// A host method bound as a named property of a proxy.
#[derive(Debug, Clone)]
pub(crate) struct BoundMethodDescriptor {
    pub descriptor: MethodDescriptor,
    /// Owner's `type_name`, for diagnostics.
    pub owner: String,
}

impl BoundMethodDescriptor {
    pub fn new(descriptor: MethodDescriptor, owner: &str) -> Self {
        Self {
            descriptor,
            owner: owner.to_string(),
        }
    }
}

/// Everything the traps of one proxy need.
pub(crate) struct ProxyRecord {
    pub context: ContextId,
    pub slot: SlotId,
    pub key: HostKey,
    pub capability: Capability,
    /// Strong host reference; `None` once released.
    pub(crate) binding: RefCell<Option<Binding>>,
    /// Ownership list walked by the finalizer.
    pub(crate) methods: RefCell<Vec<BoundMethodDescriptor>>,
}

impl ProxyRecord {
    pub fn new(
        context: ContextId,
        slot: SlotId,
        key: HostKey,
        binding: Binding,
        methods: Vec<BoundMethodDescriptor>,
    ) -> Self {
        Self {
            context,
            slot,
            key,
            capability: binding.capability(),
            binding: RefCell::new(Some(binding)),
            methods: RefCell::new(methods),
        }
    }

    /// Current binding, or `None` if the host reference was released.
    pub fn binding(&self) -> Option<Binding> {
        self.binding.try_borrow().ok().and_then(|b| b.clone())
    }

    pub fn method(&self, index: usize) -> Option<BoundMethodDescriptor> {
        self.methods.borrow().get(index).cloned()
    }

    /// Names of the methods bound from `from` on, with their indices.
    fn method_names(&self, from: usize) -> Vec<(usize, String)> {
        self.methods
            .borrow()
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, m)| (index, m.descriptor.name.clone()))
            .collect()
    }
}

impl<'js> Scope<'js> {
    /// Push classification for host objects, in priority order: registered
    /// scalar type, handle owned by this Context, then proxy.
    pub(crate) fn object_to_js(&self, object: &HostObjectRef) -> Result<Value<'js>, BridgeError> {
        let scalar = self.state().scalars.borrow().marshal(&**object);
        if let Some(value) = scalar {
            return self.to_js(&value);
        }

        if let Some(handle) = object.as_any().downcast_ref::<ScriptHandle>() {
            if handle.context_id() == self.shared.id {
                return self.retained(handle.slot()).map(Object::into_value);
            }
            tracing::trace!(
                from = handle.context_id().0,
                into = self.shared.id.0,
                "foreign script handle, wrapping in a proxy"
            );
        }

        self.proxy_for(object).map(Object::into_value)
    }

    /// The engine object behind a handle of this Context.
    pub(crate) fn retained(&self, slot: SlotId) -> Result<Object<'js>, BridgeError> {
        let root = self
            .state()
            .identity
            .borrow()
            .handle(slot)
            .map(|entry| entry.retained.clone());
        match root {
            Some(root) => self.js(root.restore(&self.ctx)),
            None => Err(self.poison(BridgeError::DanglingHandle(format!(
                "script handle slot {slot} is no longer registered"
            )))),
        }
    }

    fn proxy_for(&self, object: &HostObjectRef) -> Result<Object<'js>, BridgeError> {
        let key = host_key(object);
        if let Some((proxy, _)) = self.cached_proxy(key)? {
            tether_metrics::metrics! {
                self.state().metrics.borrow_mut().increment(crate::stats::PROXY_CACHE_HITS, 1);
            }
            tracing::trace!(context = self.shared.id.0, "proxy reused");
            return Ok(proxy);
        }

        let binding = Binding::classify(object.clone());
        self.install_proxy(key, binding, Vec::new())
    }

    /// Live proxy for `key` and its slot, evicting the entry if its proxy was
    /// collected.
    fn cached_proxy(&self, key: HostKey) -> Result<Option<(Object<'js>, SlotId)>, BridgeError> {
        let entry = self
            .state()
            .identity
            .borrow()
            .proxy(key)
            .map(|entry| (entry.slot, entry.weak.clone()));
        let Some((slot, weak)) = entry else {
            return Ok(None);
        };

        let helpers = self.helpers()?;
        let weak = self.js(weak.restore(&self.ctx))?;
        if let Some(proxy) = self.js(helpers.deref(&self.ctx, weak))? {
            return Ok(Some((proxy, slot)));
        }

        tracing::warn!(context = self.shared.id.0, slot, "evicting collected proxy");
        let stale = self.state().identity.borrow_mut().remove_proxy(key, slot);
        drop(stale);
        Ok(None)
    }

    /// Build a proxy for `binding`, register it in the identity cache and
    /// return it.
    pub(crate) fn install_proxy(
        &self,
        key: HostKey,
        binding: Binding,
        methods: Vec<BoundMethodDescriptor>,
    ) -> Result<Object<'js>, BridgeError> {
        let helpers = self.helpers()?;
        let slot = self.state().identity.borrow_mut().allocate_slot();
        let record = Rc::new(ProxyRecord::new(self.shared.id, slot, key, binding, methods));

        let config = self.js(Object::new(self.ctx.clone()))?;
        let trap = record.clone();
        let get = Function::new(self.ctx.clone(), move |ctx: Ctx<'js>, key: Value<'js>| {
            intercept::get(&trap, ctx, key)
        });
        self.js(config.set("get", self.js(get)?))?;

        let trap = record.clone();
        let apply = Function::new(
            self.ctx.clone(),
            move |ctx: Ctx<'js>, this: Value<'js>, args: Array<'js>| {
                intercept::apply(&trap, ctx, this, args)
            },
        );
        self.js(config.set("apply", self.js(apply)?))?;

        let bound = record.methods.borrow().len();
        if let Some(table) = self.method_table(&record, 0)? {
            self.js(config.set("methods", table))?;
        }

        let proxy = self.js(helpers.make_proxy(&self.ctx, config))?;
        self.js(helpers.tag(&self.ctx, &proxy, slot))?;
        let weak = self.js(helpers.weaken(&self.ctx, &proxy))?;
        let weak = Persistent::save(&self.ctx, weak);

        let replaced = {
            let mut cache = self.state().identity.borrow_mut();
            cache.insert_record(slot, &record);
            cache.insert_proxy(key, ProxyEntry { slot, weak })
        };
        drop(replaced);

        tether_metrics::metrics! {
            self.state().metrics.borrow_mut().increment(crate::stats::PROXIES_CREATED, 1);
        }
        tracing::debug!(
            context = self.shared.id.0,
            slot,
            capability = ?record.capability,
            methods = bound,
            "proxy created"
        );
        Ok(proxy)
    }

    /// One trap function per method bound from `from` on, keyed by name.
    fn method_table(
        &self,
        record: &Rc<ProxyRecord>,
        from: usize,
    ) -> Result<Option<Object<'js>>, BridgeError> {
        let names = record.method_names(from);
        if names.is_empty() {
            return Ok(None);
        }
        let table = self.js(Object::new(self.ctx.clone()))?;
        for (index, name) in names {
            let trap = record.clone();
            let method = Function::new(
                self.ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
                    intercept::method(&trap, index, ctx, args)
                },
            );
            self.js(table.set(name.as_str(), self.js(method)?))?;
        }
        Ok(Some(table))
    }

    /// Bind more methods on a live proxy. A name the proxy already has keeps
    /// its first descriptor.
    fn extend_proxy(
        &self,
        proxy: &Object<'js>,
        record: &Rc<ProxyRecord>,
        bound: Vec<BoundMethodDescriptor>,
    ) -> Result<(), BridgeError> {
        let from = {
            let mut methods = record.methods.borrow_mut();
            let from = methods.len();
            for method in bound {
                if methods
                    .iter()
                    .any(|m| m.descriptor.name == method.descriptor.name)
                {
                    tracing::debug!(
                        slot = record.slot,
                        method = %method.descriptor.name,
                        "method already bound on proxy"
                    );
                    continue;
                }
                methods.push(method);
            }
            from
        };

        if let Some(table) = self.method_table(record, from)? {
            let helpers = self.helpers()?;
            self.js(helpers.add_methods(&self.ctx, proxy, table))?;
        }
        Ok(())
    }

    /// Install `object` as the global `name` with one trap per method.
    pub(crate) fn bind_object(
        &self,
        name: &str,
        object: HostObjectRef,
        methods: &[MethodDescriptor],
    ) -> Result<(), BridgeError> {
        let globals = self.ctx.globals();
        if self.js(globals.contains_key(name))? {
            return Err(BridgeError::DuplicateGlobal {
                name: name.to_string(),
            });
        }

        let owner = object.type_name().to_string();
        let mut bound: Vec<BoundMethodDescriptor> = Vec::with_capacity(methods.len());
        for descriptor in methods {
            let reason = if descriptor.name.is_empty() {
                Some("method name is empty".to_string())
            } else if bound.iter().any(|b| b.descriptor.name == descriptor.name) {
                Some("method is bound more than once".to_string())
            } else if !object.has_method(&descriptor.name) {
                Some(format!("{owner} has no method named {}", descriptor.name))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(BridgeError::InvalidMethod {
                    object: name.to_string(),
                    method: descriptor.name.clone(),
                    reason,
                });
            }
            bound.push(BoundMethodDescriptor::new(descriptor.clone(), &owner));
        }

        let key = host_key(&object);
        let live = match self.cached_proxy(key)? {
            Some((proxy, slot)) => {
                let record = self.state().identity.borrow().record(slot);
                record.map(|record| (proxy, record))
            }
            None => None,
        };
        let proxy = match live {
            Some((proxy, record)) => {
                self.extend_proxy(&proxy, &record, bound)?;
                tether_metrics::metrics! {
                    self.state().metrics.borrow_mut().increment(crate::stats::PROXY_CACHE_HITS, 1);
                }
                proxy
            }
            None => self.install_proxy(key, Binding::classify(object), bound)?,
        };
        self.js(globals.set(name, proxy))?;

        tracing::debug!(context = self.shared.id.0, global = name, "host object bound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{BridgeError, Context};
    use std::any::Any;
    use std::rc::Rc;
    use tether_host::{HostObject, MethodDescriptor};

    struct Switch;

    impl HostObject for Switch {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn method_names(&self) -> Vec<String> {
            vec!["flip".into()]
        }
    }

    fn reason(error: BridgeError) -> String {
        match error {
            BridgeError::InvalidMethod { reason, .. } => reason,
            other => panic!("expected InvalidMethod, got {other:?}"),
        }
    }

    #[test]
    fn bound_method_lists_are_validated() {
        let context = Context::new().unwrap();

        let error = context
            .bind_object("s", Rc::new(Switch), &[MethodDescriptor::variadic("")])
            .unwrap_err();
        assert_eq!(reason(error), "method name is empty");

        let error = context
            .bind_object(
                "s",
                Rc::new(Switch),
                &[MethodDescriptor::variadic("flip"), MethodDescriptor::new("flip", 1)],
            )
            .unwrap_err();
        assert_eq!(reason(error), "method is bound more than once");

        context
            .bind_object("s", Rc::new(Switch), &[MethodDescriptor::variadic("flip")])
            .unwrap();
        assert_eq!(context.cached_proxies(), 1);
    }
}
