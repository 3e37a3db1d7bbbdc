//! One entry into a Context
//!
//! A [`Scope`] pairs the engine's `Ctx` with the Context's shared state for
//! the duration of a `with` call. Boundary operations and trap functions
//! both run through it, and it is the `ScriptAccess` host methods receive.

use crate::bootstrap::Helpers;
use crate::context::{Shared, State};
use crate::error::{BridgeError, ParkedError, PendingError, ScriptError};
use crate::frame::Frame;
use crate::identity::SlotId;
use crate::registry::{self, ContextId};
use rquickjs::function::{Rest, This};
use rquickjs::convert::Coerced;
use rquickjs::{qjs, Array, Ctx, Error, Exception, Persistent, Value};
use std::ffi::CString;
use std::rc::Rc;
use tether_host::{HostError, HostValue, ScriptAccess};

#[derive(Clone)]
pub(crate) struct Scope<'js> {
    pub ctx: Ctx<'js>,
    pub shared: Rc<Shared>,
}

impl<'js> Scope<'js> {
    pub fn new(ctx: Ctx<'js>, shared: Rc<Shared>) -> Self {
        Self { ctx, shared }
    }

    /// Scope for a trap firing inside Context `id`.
    pub fn for_trap(ctx: Ctx<'js>, id: ContextId) -> rquickjs::Result<Self> {
        match registry::lookup(id) {
            Some(shared) => Ok(Self::new(ctx, shared)),
            None => Err(Exception::throw_internal(&ctx, "proxy belongs to a closed context")),
        }
    }

    pub fn state(&self) -> &State {
        &self.shared.state
    }

    pub fn helpers(&self) -> Result<Rc<Helpers>, BridgeError> {
        self.state()
            .helpers
            .borrow()
            .clone()
            .ok_or(BridgeError::ContextClosed)
    }

    /// Map an engine result into a bridge result.
    pub fn js<T>(&self, result: rquickjs::Result<T>) -> Result<T, BridgeError> {
        result.map_err(|error| self.capture(error, None))
    }

    fn js_in<T>(&self, result: rquickjs::Result<T>, file: &str) -> Result<T, BridgeError> {
        result.map_err(|error| self.capture(error, Some(file)))
    }

    /// Convert an engine error, taking the thrown exception and any pending
    /// host error it carries.
    pub fn capture(&self, error: Error, file: Option<&str>) -> BridgeError {
        let fatal = self.state().fatal.borrow().clone();
        if let Some(fatal) = fatal {
            if error.is_exception() {
                self.ctx.catch();
            }
            return fatal;
        }

        match error {
            Error::Exception => {
                let thrown = self.ctx.catch();
                let parked = self.state().pending.borrow_mut().take();
                let parked = parked.filter(|parked| {
                    parked
                        .thrown
                        .clone()
                        .restore(&self.ctx)
                        .is_ok_and(|original| original == thrown)
                });
                let script = self.describe(thrown).in_file(file);
                match parked {
                    Some(parked) => parked.error.into_bridge_error(script),
                    None => BridgeError::ScriptExecution(script),
                }
            }
            Error::Allocation => self.poison(BridgeError::Fatal("engine out of memory".into())),
            other => BridgeError::ScriptExecution(
                ScriptError::new("InternalError", other.to_string()).in_file(file),
            ),
        }
    }

    fn describe(&self, thrown: Value<'js>) -> ScriptError {
        if let Some(object) = thrown.as_object() {
            let text = |key: &str| -> Option<String> {
                object
                    .get::<_, Option<Coerced<String>>>(key)
                    .ok()
                    .flatten()
                    .map(|text| text.0)
            };
            let mut error = ScriptError::new(
                &text("name").unwrap_or_else(|| "Error".into()),
                text("message").unwrap_or_default(),
            );
            error.stack = text("stack").filter(|stack| !stack.is_empty());
            return error;
        }

        let message = thrown
            .get::<Coerced<String>>()
            .map(|text| text.0)
            .unwrap_or_else(|_| "unknown exception".into());
        ScriptError::new("Error", message)
    }

    /// Record a fatal condition. Every later call into the Context fails.
    pub fn poison(&self, error: BridgeError) -> BridgeError {
        tracing::error!(context = self.shared.id.0, %error, "context poisoned");
        self.state().mark_fatal(error.clone());
        error
    }

    /// Throw a host-side failure into the engine, keeping it as the pending
    /// error so the boundary can report the original.
    pub fn raise(&self, pending: PendingError) -> Error {
        let message = pending.to_string();
        let _ = match &pending {
            PendingError::Capability { .. } => Exception::throw_reference(&self.ctx, &message),
            PendingError::Host(HostError::ArgumentCount { .. }) => {
                Exception::throw_type(&self.ctx, &message)
            }
            PendingError::Host(_) => Exception::throw_message(&self.ctx, &message),
        };
        let thrown = self.ctx.catch();
        *self.state().pending.borrow_mut() = Some(ParkedError {
            error: pending,
            thrown: Persistent::save(&self.ctx, thrown.clone()),
        });
        self.ctx.throw(thrown)
    }

    /// Throw a bridge error raised while serving a trap.
    pub fn rethrow(&self, error: BridgeError) -> Error {
        if error.is_fatal() {
            let message = self.poison(error).to_string();
            return Exception::throw_internal(&self.ctx, &message);
        }
        self.raise(PendingError::Host(error.into_host_error()))
    }

    /// A proxy whose host reference is gone was reached from script.
    pub fn dangling(&self, slot: SlotId) -> Error {
        self.rethrow(BridgeError::DanglingHandle(format!(
            "proxy slot {slot} has no host object"
        )))
    }

    pub fn type_error(&self, message: &str) -> BridgeError {
        BridgeError::ScriptExecution(ScriptError::new("TypeError", message))
    }

    /// Run `source` as a global script, with `file` as the script name the
    /// engine puts in stack traces.
    fn eval_script(&self, source: &str, file: &str) -> rquickjs::Result<Value<'js>> {
        let source = CString::new(source)?;
        let file = CString::new(file)?;
        let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_STRICT) as i32;
        // SAFETY: both strings are NUL-terminated and outlive the call. The
        // returned value is owned and handed over to `Value`.
        unsafe {
            let value = qjs::JS_Eval(
                self.ctx.as_raw().as_ptr(),
                source.as_ptr(),
                source.as_bytes().len() as _,
                file.as_ptr(),
                flags,
            );
            if qjs::JS_IsException(value) {
                return Err(Error::Exception);
            }
            Ok(Value::from_raw(self.ctx.clone(), value))
        }
    }

    pub fn evaluate(&self, source: &str, file: &str) -> Result<HostValue, BridgeError> {
        tracing::trace!(context = self.shared.id.0, file, "evaluate");
        let result = self.js_in(self.eval_script(source, file), file)?;
        let mut frame = Frame::new(self, "evaluate");
        frame.push_value(result);
        frame.pop()
    }

    /// Compile a function expression into a callable handle.
    ///
    /// The expression is rewritten as a hoisted declaration placed after a
    /// `return`, so nothing in `source` runs. Anything after the function
    /// body is refused.
    pub fn compile(&self, source: &str, file: &str) -> Result<HostValue, BridgeError> {
        let not_a_function = || {
            BridgeError::ScriptExecution(
                ScriptError::new("SyntaxError", "source is not a single function expression")
                    .in_file(Some(file)),
            )
        };
        let Some((declaration, name)) = function_declaration(source) else {
            return Err(not_a_function());
        };

        let wrapped = format!("(() => {{ return {name};\n{declaration}\n}})");
        let thunk = self.js_in(self.eval_script(&wrapped, file), file)?;
        let Some(thunk) = thunk.into_function() else {
            return Err(not_a_function());
        };
        let compiled: Value = self.js_in(thunk.call(()), file)?;
        let Some(function) = compiled.as_function() else {
            return Err(not_a_function());
        };

        let helpers = self.helpers()?;
        let text = self.js(helpers.source_text(&self.ctx, function))?;
        let expected = declaration.trim_end().trim_end_matches(';').trim_end();
        if text != expected {
            return Err(not_a_function());
        }

        let mut frame = Frame::new(self, "compile");
        frame.push_value(compiled);
        frame.pop()
    }

    pub fn call(&self, target: &HostValue, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        let mut frame = Frame::new(self, "call");
        frame.push(target)?;
        let Some(function) = frame.pop_value()?.into_function() else {
            return Err(self.type_error("call target is not a function"));
        };
        for arg in args {
            frame.push(arg)?;
        }
        let args = frame.take(args.len());
        let undefined = Value::new_undefined(self.ctx.clone());
        let result: Value = self.js(function.call((This(undefined), Rest(args))))?;
        frame.push_value(result);
        frame.pop()
    }

    pub fn call_property(
        &self,
        target: &HostValue,
        key: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, BridgeError> {
        let helpers = self.helpers()?;
        let mut frame = Frame::new(self, "call_property");
        frame.push(target)?;
        frame.push(key)?;
        let list = self.js(Array::new(self.ctx.clone()))?;
        for (index, arg) in args.iter().enumerate() {
            frame.push(arg)?;
            let arg = frame.pop_value()?;
            self.js(list.set(index, arg))?;
        }
        let key = frame.pop_value()?;
        let target = frame.pop_value()?;
        let result = self.js(helpers.invoke(&self.ctx, target, key, list))?;
        frame.push_value(result);
        frame.pop()
    }

    pub fn get_key(&self, target: &HostValue, key: &HostValue) -> Result<HostValue, BridgeError> {
        let helpers = self.helpers()?;
        let mut frame = Frame::new(self, "get_key");
        frame.push(target)?;
        frame.push(key)?;
        let key = frame.pop_value()?;
        let target = frame.pop_value()?;
        let result = self.js(helpers.get_key(&self.ctx, target, key))?;
        frame.push_value(result);
        frame.pop()
    }

    pub fn set_global(&self, name: &HostValue, value: &HostValue) -> Result<(), BridgeError> {
        let helpers = self.helpers()?;
        let mut frame = Frame::new(self, "set_global");
        frame.push(name)?;
        frame.push(value)?;
        let value = frame.pop_value()?;
        let name = frame.pop_value()?;
        self.js(helpers.set_global(&self.ctx, name, value))
    }
}

/// Rewrite a function expression as a declaration. Returns the declaration
/// and the name it binds; anonymous functions are named `anonymous`.
fn function_declaration(source: &str) -> Option<(String, String)> {
    let is_name_char = |c: char| c.is_alphanumeric() || c == '_' || c == '$';

    let source = source.trim();
    let (prefix, rest) = match source.strip_prefix("async") {
        Some(rest) if rest.starts_with(char::is_whitespace) => ("async ", rest.trim_start()),
        _ => ("", source),
    };
    let rest = rest.strip_prefix("function")?;
    if rest.starts_with(is_name_char) {
        return None;
    }
    let rest = rest.trim_start();
    let (star, rest) = match rest.strip_prefix('*') {
        Some(rest) => ("*", rest.trim_start()),
        None => ("", rest),
    };
    let end = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
    let (name, tail) = rest.split_at(end);
    let name = if name.is_empty() { "anonymous" } else { name };
    Some((format!("{prefix}function{star} {name}{tail}"), name.to_string()))
}

impl ScriptAccess for Scope<'_> {
    fn evaluate(&mut self, source: &str, file_name: &str) -> Result<HostValue, HostError> {
        Scope::evaluate(self, source, file_name).map_err(BridgeError::into_host_error)
    }

    fn call(&mut self, target: &HostValue, args: &[HostValue]) -> Result<HostValue, HostError> {
        Scope::call(self, target, args).map_err(BridgeError::into_host_error)
    }

    fn call_property(
        &mut self,
        target: &HostValue,
        key: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, HostError> {
        Scope::call_property(self, target, key, args).map_err(BridgeError::into_host_error)
    }

    fn get_key(&mut self, target: &HostValue, key: &HostValue) -> Result<HostValue, HostError> {
        Scope::get_key(self, target, key).map_err(BridgeError::into_host_error)
    }

    fn set_global(&mut self, name: &str, value: &HostValue) -> Result<(), HostError> {
        Scope::set_global(self, &HostValue::from(name), value).map_err(BridgeError::into_host_error)
    }
}
