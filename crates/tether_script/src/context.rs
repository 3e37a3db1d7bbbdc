//! Script context management
//!
//! A [`Context`] owns one engine heap and everything the bridge keeps for it:
//! the bootstrap helpers, the identity cache, the scalar registry and the
//! pending/fatal error slots. It is single-threaded (`!Send`); one call runs
//! inside it at a time.

use crate::bootstrap::Helpers;
use crate::config::ContextConfig;
use crate::debugger::DebugTransport;
use crate::error::{BridgeError, ParkedError};
use crate::global::ExposedGlobal;
use crate::identity::{HostKey, IdentityCache, SlotId};
use crate::registry::{self, ContextId};
use crate::scope::Scope;
use rquickjs::Runtime;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tether_host::{HostObject, HostObjectRef, HostValue, MethodDescriptor, ScalarRegistry};
use tether_metrics::Counter;

/// Per-Context bookkeeping, reachable from traps through the registry.
#[derive(Default)]
pub(crate) struct State {
    pub helpers: RefCell<Option<Rc<Helpers>>>,
    pub identity: RefCell<IdentityCache>,
    pub scalars: RefCell<ScalarRegistry>,
    pub pending: RefCell<Option<ParkedError>>,
    pub fatal: RefCell<Option<BridgeError>>,
    /// Slots of dropped script handles.
    pub released: RefCell<Vec<SlotId>>,
    /// Cache entries of finalized proxies.
    pub finalized: RefCell<Vec<(HostKey, SlotId)>>,
    pub metrics: RefCell<Counter>,
    pub depth: Cell<usize>,
    pub debugger: RefCell<Option<Box<dyn DebugTransport>>>,
}

impl State {
    /// Keep the first fatal condition.
    pub fn mark_fatal(&self, error: BridgeError) {
        if let Ok(mut fatal) = self.fatal.try_borrow_mut() {
            if fatal.is_none() {
                *fatal = Some(error);
            }
        }
    }
}

pub(crate) struct Shared {
    pub id: ContextId,
    pub state: State,
    // Field order matters: engine roots in `state` go before the realm and
    // the realm before the heap.
    context: rquickjs::Context,
    runtime: Runtime,
}

struct Depth<'a>(&'a Cell<usize>);

impl<'a> Depth<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for Depth<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl Shared {
    /// Run `f` as one top-level call into the Context.
    pub(crate) fn enter<R>(
        self: &Rc<Self>,
        f: impl for<'js> FnOnce(&Scope<'js>) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        if let Some(fatal) = self.state.fatal.borrow().clone() {
            return Err(fatal);
        }
        if self.state.depth.get() > 0 {
            return Err(BridgeError::ContextBusy);
        }

        let result = self.context.with(|ctx| {
            let scope = Scope::new(ctx, self.clone());
            let _depth = Depth::enter(&self.state.depth);
            scope.drain_released();
            let result = f(&scope);
            self.state.pending.borrow_mut().take();
            result
        });
        result.map_err(|error| self.escalate(error))
    }

    fn escalate(&self, error: BridgeError) -> BridgeError {
        if !error.is_fatal() {
            return error;
        }
        tracing::error!(context = self.id.0, %error, "fatal bridge error");
        if cfg!(debug_assertions) {
            let usage = self.runtime.memory_usage();
            let summary = format!(
                " [heap: {} objects, {} bytes in use]",
                usage.obj_count, usage.memory_used_size
            );
            return match error {
                BridgeError::Fatal(message) => BridgeError::Fatal(message + &summary),
                BridgeError::DanglingHandle(message) => BridgeError::DanglingHandle(message + &summary),
                other => other,
            };
        }
        error
    }
}

/// A script execution context with its own engine heap.
pub struct Context {
    pub(crate) shared: Rc<Shared>,
}

impl Context {
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_config(&ContextConfig::default())
    }

    pub fn with_config(config: &ContextConfig) -> Result<Self, BridgeError> {
        let runtime = Runtime::new()
            .map_err(|error| BridgeError::Fatal(format!("cannot create engine heap: {error}")))?;
        config.apply(&runtime);
        let context = rquickjs::Context::full(&runtime)
            .map_err(|error| BridgeError::Fatal(format!("cannot create engine context: {error}")))?;
        let helpers = context
            .with(|ctx| Helpers::install(&ctx))
            .map_err(|error| BridgeError::Fatal(format!("cannot install bridge helpers: {error}")))?;

        let state = State::default();
        *state.helpers.borrow_mut() = Some(Rc::new(helpers));
        let shared = Rc::new(Shared {
            id: registry::next_id(),
            state,
            context,
            runtime,
        });
        registry::register(&shared);

        tracing::debug!(context = shared.id.0, "context created");
        Ok(Self { shared })
    }

    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Evaluate `source` and return its completion value.
    pub fn evaluate(&self, source: &str, file_name: &str) -> Result<HostValue, BridgeError> {
        self.shared.enter(|scope| scope.evaluate(source, file_name))
    }

    /// Compile a function expression; the result is a callable handle.
    pub fn compile(&self, source: &str, file_name: &str) -> Result<HostValue, BridgeError> {
        self.shared.enter(|scope| scope.compile(source, file_name))
    }

    pub fn call(&self, target: &HostValue, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        self.shared.enter(|scope| scope.call(target, args))
    }

    /// Call `target[key](...args)`.
    pub fn call_property(
        &self,
        target: &HostValue,
        key: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, BridgeError> {
        self.shared.enter(|scope| scope.call_property(target, key, args))
    }

    pub fn set_global_property(&self, name: &HostValue, value: &HostValue) -> Result<(), BridgeError> {
        self.shared.enter(|scope| scope.set_global(name, value))
    }

    pub fn get_key_by_index(&self, target: &HostValue, index: u32) -> Result<HostValue, BridgeError> {
        self.get_key_by_value(target, &HostValue::Number(f64::from(index)))
    }

    pub fn get_key_by_name(&self, target: &HostValue, name: &str) -> Result<HostValue, BridgeError> {
        self.get_key_by_value(target, &HostValue::from(name))
    }

    pub fn get_key_by_value(&self, target: &HostValue, key: &HostValue) -> Result<HostValue, BridgeError> {
        self.shared.enter(|scope| scope.get_key(target, key))
    }

    /// Install a host object as global `name`, with one bound function per
    /// method descriptor.
    pub fn bind_object(
        &self,
        name: &str,
        object: HostObjectRef,
        methods: &[MethodDescriptor],
    ) -> Result<(), BridgeError> {
        self.shared.enter(|scope| scope.bind_object(name, object, methods))
    }

    /// Handle on the script global `name`, checked against `methods`.
    pub fn expose_global(&self, name: &str, methods: &[MethodDescriptor]) -> Result<ExposedGlobal, BridgeError> {
        self.shared.enter(|scope| scope.expose_global(name, methods))
    }

    /// Marshal host objects of type `T` by value instead of by proxy.
    pub fn register_scalar<T, F>(&self, convert: F)
    where
        T: HostObject,
        F: Fn(&T) -> HostValue + 'static,
    {
        self.shared.state.scalars.borrow_mut().register::<T, F>(convert);
    }

    /// Run a full collection cycle. Proxies the script no longer reaches are
    /// finalized here.
    pub fn collect_garbage(&self) -> Result<(), BridgeError> {
        if self.shared.state.depth.get() > 0 {
            return Err(BridgeError::ContextBusy);
        }
        self.shared.runtime.run_gc();
        self.shared.enter(|scope| {
            scope.drain_released();
            Ok(())
        })
    }

    /// Value of a bookkeeping counter; always 0 without the `metrics` feature.
    pub fn counter(&self, name: &str) -> usize {
        self.shared.state.metrics.borrow().get(name)
    }

    /// Whether a fatal condition has closed this Context.
    pub fn is_poisoned(&self) -> bool {
        self.shared.state.fatal.borrow().is_some()
    }

    /// Number of engine objects currently rooted by host handles.
    pub fn retained_handles(&self) -> usize {
        self.shared.state.identity.borrow().handle_count()
    }

    /// Number of host objects with a cached proxy entry.
    pub fn cached_proxies(&self) -> usize {
        self.shared.state.identity.borrow().proxy_count()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.context.with(|_ctx| {
            let (records, roots) = shared.state.identity.borrow_mut().drain();
            for record in &records {
                record.release();
            }
            drop(records);
            drop(roots);
            shared.state.helpers.borrow_mut().take();
            shared.state.released.borrow_mut().clear();
            shared.state.finalized.borrow_mut().clear();
        });
        shared.runtime.run_gc();
        if let Some(mut transport) = shared.state.debugger.borrow_mut().take() {
            transport.detached();
        }
        registry::unregister(shared.id);

        tether_metrics::metrics! {
            tracing::debug!(
                context = shared.id.0,
                counters = ?shared.state.metrics.borrow().snapshot(),
                "context closed"
            );
        }
    }
}
