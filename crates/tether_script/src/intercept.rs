//! Dispatch interceptor: the trap functions behind every proxy
//!
//! Each trap resolves its Context through the registry, checks the record's
//! capability, calls into the host and marshals the result back. A host
//! failure is recorded as the pending error of the Context and thrown into
//! the engine; the Context boundary turns it back into a `BridgeError`.

use crate::error::PendingError;
use crate::frame::Frame;
use crate::proxy::ProxyRecord;
use crate::scope::Scope;
use rquickjs::function::Rest;
use rquickjs::{Array, Ctx, Value};
use tether_host::{Capability, HostError, HostValue};

/// Property read on a proxy.
pub(crate) fn get<'js>(
    record: &ProxyRecord,
    ctx: Ctx<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let name = match key.as_string() {
        Some(name) => name.to_string()?,
        None => return Ok(Value::new_undefined(ctx)),
    };
    let scope = Scope::for_trap(ctx, record.context)?;
    let Some(binding) = record.binding() else {
        return Err(scope.dangling(record.slot));
    };
    if !record.capability.allows_get() {
        return Err(scope.raise(PendingError::Capability {
            capability: Capability::Gettable,
            operation: "get",
            type_name: binding.origin().type_name().to_string(),
        }));
    }
    let Some(target) = binding.target() else {
        return Err(scope.dangling(record.slot));
    };

    tracing::trace!(slot = record.slot, property = %name, "get trap");
    let mut access = scope.clone();
    let value = target
        .get(&mut access, &name)
        .map_err(|error| scope.raise(PendingError::Host(error)))?;

    let mut frame = Frame::new(&scope, "get");
    frame.push(&value).map_err(|error| scope.rethrow(error))?;
    frame.pop_value().map_err(|error| scope.rethrow(error))
}

/// Call of a proxy as a function.
pub(crate) fn apply<'js>(
    record: &ProxyRecord,
    ctx: Ctx<'js>,
    this: Value<'js>,
    args: Array<'js>,
) -> rquickjs::Result<Value<'js>> {
    let scope = Scope::for_trap(ctx, record.context)?;
    let (this, args) = unpack(&scope, this, args.iter::<Value>())?;

    let Some(binding) = record.binding() else {
        return Err(scope.dangling(record.slot));
    };
    if !record.capability.allows_call() {
        return Err(scope.raise(PendingError::Capability {
            capability: Capability::Callable,
            operation: "invoke",
            type_name: binding.origin().type_name().to_string(),
        }));
    }
    let Some(target) = binding.target() else {
        return Err(scope.dangling(record.slot));
    };

    tracing::trace!(slot = record.slot, args = args.len(), "apply trap");
    let mut access = scope.clone();
    let result = target
        .invoke(&mut access, this, args)
        .map_err(|error| scope.raise(PendingError::Host(error)))?;
    settle(&scope, &result)
}

/// Call of a method bound at `bind_object` time.
pub(crate) fn method<'js>(
    record: &ProxyRecord,
    index: usize,
    ctx: Ctx<'js>,
    args: Rest<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let scope = Scope::for_trap(ctx, record.context)?;
    let Some(bound) = record.method(index) else {
        return Err(scope.dangling(record.slot));
    };
    let descriptor = bound.descriptor;

    if let Some(expected) = descriptor.arity {
        if args.len() != expected {
            return Err(scope.raise(PendingError::Host(HostError::ArgumentCount {
                method: format!("{}.{}", bound.owner, descriptor.name),
                expected,
                actual: args.len(),
            })));
        }
    }

    let undefined = Value::new_undefined(scope.ctx.clone());
    let (_, args) = unpack(&scope, undefined, args.0.into_iter().map(Ok))?;
    let Some(binding) = record.binding() else {
        return Err(scope.dangling(record.slot));
    };

    tracing::trace!(slot = record.slot, method = %descriptor.name, "method trap");
    let mut access = scope.clone();
    let result = binding
        .origin()
        .call_method(&mut access, &descriptor.name, args)
        .map_err(|error| scope.raise(PendingError::Host(error)))?;
    settle(&scope, &result)
}

/// Pop `this` and the argument list into host values.
fn unpack<'js>(
    scope: &Scope<'js>,
    this: Value<'js>,
    args: impl Iterator<Item = rquickjs::Result<Value<'js>>>,
) -> rquickjs::Result<(HostValue, Vec<HostValue>)> {
    let mut frame = Frame::new(scope, "unpack");
    let mut count = 0;
    for arg in args {
        let arg = arg.map_err(|error| scope.rethrow(frame.raise(scope.capture(error, None))))?;
        frame.push_value(arg);
        count += 1;
    }
    let args = frame
        .take_host(count)
        .map_err(|error| scope.rethrow(error))?;

    frame.push_value(this);
    let this = frame.pop().map_err(|error| scope.rethrow(error))?;
    Ok((this, args))
}

/// Marshal a host result back onto the engine side.
fn settle<'js>(scope: &Scope<'js>, result: &HostValue) -> rquickjs::Result<Value<'js>> {
    let mut frame = Frame::new(scope, "result");
    frame.push(result).map_err(|error| scope.rethrow(error))?;
    frame.pop_value().map_err(|error| scope.rethrow(error))
}
