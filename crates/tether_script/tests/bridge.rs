//! End-to-end behaviour of the bridge across both heaps.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use tether_script::{
    live_contexts, BridgeError, Capability, Context, HostError, HostObject, HostObjectRef,
    HostValue, MethodDescriptor, ProxyTarget, ScriptAccess,
};

struct Lamp {
    lit: Cell<bool>,
    drops: Rc<Cell<usize>>,
}

impl Lamp {
    fn new(drops: &Rc<Cell<usize>>) -> Rc<Self> {
        Rc::new(Self {
            lit: Cell::new(false),
            drops: drops.clone(),
        })
    }
}

impl HostObject for Lamp {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &str {
        "Lamp"
    }

    fn property(&self, name: &str) -> Option<HostValue> {
        (name == "lit").then(|| HostValue::Bool(self.lit.get()))
    }

    fn method_names(&self) -> Vec<String> {
        ["toggle", "fail", "add", "peek", "peekDirect"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn call_method(
        &self,
        access: &mut dyn ScriptAccess,
        name: &str,
        args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        let first = args.first().cloned().unwrap_or(HostValue::Null);
        match name {
            "toggle" => {
                self.lit.set(!self.lit.get());
                Ok(HostValue::Bool(self.lit.get()))
            }
            "fail" => Err(HostError::message("overheated")),
            "add" => Ok(HostValue::Number(
                args.iter().filter_map(HostValue::as_number).sum(),
            )),
            "peek" => access.get_key(&first, &HostValue::from("x")),
            "peekDirect" => {
                let handle = first.as_object().ok_or_else(|| HostError::message("no object"))?;
                let target = handle
                    .proxy_target()
                    .ok_or_else(|| HostError::message("not a script object"))?;
                target.get(access, "x")
            }
            other => Err(HostError::unsupported(other, "Lamp")),
        }
    }
}

impl Drop for Lamp {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Natively callable, never gettable.
struct Doubler;

impl HostObject for Doubler {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &str {
        "Doubler"
    }

    fn proxy_target(&self) -> Option<&dyn ProxyTarget> {
        Some(self)
    }
}

impl ProxyTarget for Doubler {
    fn capability(&self) -> Capability {
        Capability::Callable
    }

    fn invoke(
        &self,
        _access: &mut dyn ScriptAccess,
        _this: HostValue,
        args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        let value = args.first().and_then(HostValue::as_number).unwrap_or_default();
        Ok(HostValue::Number(value * 2.0))
    }
}

struct Celsius(f64);

impl HostObject for Celsius {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn object(value: Rc<impl HostObject>) -> HostValue {
    let value: HostObjectRef = value;
    HostValue::Object(value)
}

fn set(context: &Context, name: &str, value: &HostValue) {
    context
        .set_global_property(&HostValue::from(name), value)
        .unwrap();
}

#[test]
fn host_objects_round_trip_by_identity() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    let lamp = object(Lamp::new(&drops));

    set(&context, "lamp", &lamp);
    let back = context.evaluate("lamp", "identity.js").unwrap();

    assert!(back.same(&lamp));
}

#[test]
fn script_objects_round_trip_by_identity() {
    let context = Context::new().unwrap();
    let first = context
        .evaluate("globalThis.keep = { a: 1 }; keep", "keep.js")
        .unwrap();
    let second = context.evaluate("keep", "keep.js").unwrap();
    assert!(first.same(&second));

    let is_kept = context
        .compile("function (value) { return value === globalThis.keep; }", "check.js")
        .unwrap();
    assert_eq!(
        context.call(&is_kept, &[first]).unwrap(),
        HostValue::Bool(true)
    );
}

#[test]
fn proxies_are_reused_per_host_object() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    let lamp = object(Lamp::new(&drops));
    let other = object(Lamp::new(&drops));

    let same = context
        .compile("function (a, b) { return a === b; }", "same.js")
        .unwrap();

    assert_eq!(
        context.call(&same, &[lamp.clone(), lamp.clone()]).unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(
        context.call(&same, &[lamp.clone(), other]).unwrap(),
        HostValue::Bool(false)
    );

    #[cfg(feature = "metrics")]
    assert!(context.counter("proxy_cache_hits") >= 1);
}

#[test]
fn adapter_exposes_properties_and_methods() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    set(&context, "lamp", &object(Lamp::new(&drops)));

    let result = context
        .evaluate("const before = lamp.lit; lamp.toggle(); [before, lamp.lit, lamp.missing]", "lamp.js")
        .unwrap();
    assert_eq!(
        result,
        HostValue::Array(vec![
            HostValue::Bool(false),
            HostValue::Bool(true),
            HostValue::Null,
        ])
    );
}

#[test]
fn contexts_do_not_share_identity() {
    let a = Context::new().unwrap();
    let b = Context::new().unwrap();

    let greeter = a
        .evaluate("({ greeting: 'hi', add(x, y) { return x + y; } })", "a.js")
        .unwrap();
    set(&b, "foreign", &greeter);

    assert_eq!(b.evaluate("typeof foreign", "b.js").unwrap(), HostValue::from("function"));
    assert_eq!(b.evaluate("foreign.greeting", "b.js").unwrap(), HostValue::from("hi"));
    assert_eq!(b.evaluate("foreign.add(2, 3)", "b.js").unwrap(), HostValue::Number(5.0));

    // Leaving B again yields the original handle, not a B object.
    let back = b.evaluate("foreign", "b.js").unwrap();
    assert!(back.same(&greeter));
}

#[test]
fn binding_twice_is_a_duplicate() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    let first = Lamp::new(&drops);
    let second = Lamp::new(&drops);
    let methods = [MethodDescriptor::variadic("toggle")];
    first.lit.set(true);

    context.bind_object("x", first.clone(), &methods).unwrap();
    assert_eq!(
        context.bind_object("x", second.clone(), &methods).unwrap_err(),
        BridgeError::DuplicateGlobal { name: "x".into() }
    );
    assert!(matches!(
        context.bind_object("Math", second.clone(), &methods),
        Err(BridgeError::DuplicateGlobal { .. })
    ));

    // `x` still reaches the first lamp.
    assert_eq!(context.evaluate("x.lit", "x.js").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("x.toggle()", "x.js").unwrap(), HostValue::Bool(false));
    assert!(!first.lit.get());
    assert!(!second.lit.get());
}

#[test]
fn binding_reuses_the_live_proxy() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    let lamp = Lamp::new(&drops);

    set(&context, "p", &object(lamp.clone()));
    context
        .bind_object("a", lamp.clone(), &[MethodDescriptor::variadic("toggle")])
        .unwrap();
    context
        .bind_object(
            "b",
            lamp.clone(),
            &[MethodDescriptor::variadic("toggle"), MethodDescriptor::new("add", 2)],
        )
        .unwrap();

    assert_eq!(
        context.evaluate("p === a && a === b", "same.js").unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(context.cached_proxies(), 1);

    // Methods bound under `b` are visible through every name.
    assert_eq!(context.evaluate("a.toggle === b.toggle", "same.js").unwrap(), HostValue::Bool(true));
    assert_eq!(context.evaluate("p.add(1, 2)", "add.js").unwrap(), HostValue::Number(3.0));
    let error = context.evaluate("a.add(1)", "add.js").unwrap_err();
    assert!(matches!(
        error.host_cause(),
        Some(HostError::ArgumentCount { expected: 2, actual: 1, .. })
    ));
}

#[test]
fn binding_rejects_unknown_methods() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();

    let error = context
        .bind_object("lamp", Lamp::new(&drops), &[MethodDescriptor::new("explode", 0)])
        .unwrap_err();
    assert!(matches!(error, BridgeError::InvalidMethod { ref method, .. } if method == "explode"));
    assert_eq!(
        context.evaluate("typeof lamp", "absent.js").unwrap(),
        HostValue::from("undefined")
    );
}

#[test]
fn host_failures_surface_with_their_cause() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    context
        .bind_object("lamp", Lamp::new(&drops), &[MethodDescriptor::variadic("fail")])
        .unwrap();

    let error = context.evaluate("lamp.fail()", "fail.js").unwrap_err();
    assert_eq!(error.host_cause(), Some(&HostError::message("overheated")));

    let caught = context
        .evaluate("try { lamp.fail(); } catch (e) { e.message }", "catch.js")
        .unwrap();
    assert_eq!(caught, HostValue::from("overheated"));

    // A host failure the script swallowed does not colour a later error.
    let error = context
        .evaluate(
            "try { lamp.fail(); } catch (e) {} throw new Error('overheated');",
            "swallowed.js",
        )
        .unwrap_err();
    let BridgeError::ScriptExecution(script) = &error else {
        panic!("expected a script error, got {error:?}");
    };
    assert_eq!(script.message, "overheated");
    assert!(error.host_cause().is_none());

    // Rethrowing the caught error keeps its cause.
    let error = context
        .evaluate("try { lamp.fail(); } catch (e) { throw e; }", "rethrow.js")
        .unwrap_err();
    assert_eq!(error.host_cause(), Some(&HostError::message("overheated")));

    // Unbound methods reached through the adapter report the same way.
    set(&context, "loose", &object(Lamp::new(&drops)));
    let error = context.evaluate("loose.fail()", "loose.js").unwrap_err();
    assert_eq!(error.host_cause(), Some(&HostError::message("overheated")));
}

#[test]
fn bound_methods_check_their_arity() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    context
        .bind_object("calc", Lamp::new(&drops), &[MethodDescriptor::new("add", 2)])
        .unwrap();

    assert_eq!(
        context.evaluate("calc.add(1, 2)", "ok.js").unwrap(),
        HostValue::Number(3.0)
    );

    let error = context.evaluate("calc.add(1)", "short.js").unwrap_err();
    let BridgeError::ScriptExecution(script) = &error else {
        panic!("expected a script error, got {error:?}");
    };
    assert_eq!(script.name, "TypeError");
    assert!(matches!(
        error.host_cause(),
        Some(HostError::ArgumentCount { expected: 2, actual: 1, .. })
    ));
}

#[test]
fn capabilities_are_enforced() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    set(&context, "double", &object(Rc::new(Doubler)));
    set(&context, "lamp", &object(Lamp::new(&drops)));

    assert_eq!(context.evaluate("double(21)", "call.js").unwrap(), HostValue::Number(42.0));

    let error = context.evaluate("double.factor", "get.js").unwrap_err();
    assert!(matches!(
        error,
        BridgeError::TypeCapability { capability: Capability::Gettable, .. }
    ));

    let error = context.evaluate("lamp()", "apply.js").unwrap_err();
    assert!(matches!(
        error,
        BridgeError::TypeCapability { capability: Capability::Callable, .. }
    ));
}

#[test]
fn collected_proxies_release_their_host_objects() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();

    set(&context, "temp", &object(Lamp::new(&drops)));
    context
        .bind_object(
            "bound",
            Lamp::new(&drops),
            &[MethodDescriptor::variadic("toggle"), MethodDescriptor::new("add", 2)],
        )
        .unwrap();
    assert_eq!(drops.get(), 0);

    context
        .evaluate("delete globalThis.temp; delete globalThis.bound;", "drop.js")
        .unwrap();
    context.collect_garbage().unwrap();

    assert_eq!(drops.get(), 2);
    assert_eq!(context.cached_proxies(), 0);

    #[cfg(feature = "metrics")]
    {
        assert_eq!(context.counter("proxies_finalized"), 2);
        assert_eq!(context.counter("descriptors_destroyed"), 2);
    }
}

#[test]
fn handles_keep_script_objects_alive() {
    let context = Context::new().unwrap();
    let handle = context.evaluate("({ v: 7 })", "alive.js").unwrap();
    assert_eq!(context.retained_handles(), 1);

    context.collect_garbage().unwrap();
    assert_eq!(
        context.get_key_by_name(&handle, "v").unwrap(),
        HostValue::Number(7.0)
    );

    drop(handle);
    context.collect_garbage().unwrap();
    assert_eq!(context.retained_handles(), 0);
}

#[test]
fn host_methods_reenter_through_access() {
    let drops = Rc::new(Cell::new(0));
    let context = Context::new().unwrap();
    context
        .bind_object(
            "lamp",
            Lamp::new(&drops),
            &[MethodDescriptor::new("peek", 1), MethodDescriptor::new("peekDirect", 1)],
        )
        .unwrap();

    assert_eq!(
        context.evaluate("lamp.peek({ x: 9 })", "peek.js").unwrap(),
        HostValue::Number(9.0)
    );

    // Going around the access token while a call is running is refused.
    let error = context.evaluate("lamp.peekDirect({ x: 9 })", "direct.js").unwrap_err();
    assert!(matches!(error.host_cause(), Some(HostError::Script(message)) if message.contains("busy")));
}

#[test]
fn key_access_and_global_assignment() {
    let context = Context::new().unwrap();
    let record = context
        .evaluate("({ name: 'tether', list: [10, 20, 30] })", "record.js")
        .unwrap();

    assert_eq!(
        context.get_key_by_name(&record, "name").unwrap(),
        HostValue::from("tether")
    );
    let list = context.get_key_by_name(&record, "list").unwrap();
    assert_eq!(context.get_key_by_index(&list, 1).unwrap(), HostValue::Number(20.0));
    assert!(context.get_key_by_name(&record, "missing").unwrap().is_null());

    set(&context, "answer", &HostValue::Number(42.0));
    assert_eq!(
        context
            .call_property(&record, &HostValue::from("hasOwnProperty"), &[HostValue::from("name")])
            .unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(context.evaluate("answer", "answer.js").unwrap(), HostValue::Number(42.0));
}

#[test]
fn registered_scalars_cross_by_value() {
    let context = Context::new().unwrap();
    context.register_scalar::<Celsius, _>(|celsius| HostValue::Number(celsius.0));

    set(&context, "temperature", &object(Rc::new(Celsius(21.5))));
    assert_eq!(
        context.evaluate("typeof temperature", "scalar.js").unwrap(),
        HostValue::from("number")
    );
}

#[test]
fn dropping_a_context_releases_everything() {
    let drops = Rc::new(Cell::new(0));
    let before = live_contexts();
    {
        let context = Context::new().unwrap();
        assert_eq!(live_contexts(), before + 1);
        context
            .bind_object("lamp", Lamp::new(&drops), &[MethodDescriptor::variadic("toggle")])
            .unwrap();
        let handle = context.evaluate("({})", "leak.js").unwrap();
        drop(handle);
    }
    assert_eq!(drops.get(), 1);
    assert_eq!(live_contexts(), before);
}

#[test]
fn handles_outliving_their_context_report_closed() {
    let handle = {
        let context = Context::new().unwrap();
        context.evaluate("({ x: 1 })", "orphan.js").unwrap()
    };

    let other = Context::new().unwrap();
    set(&other, "orphan", &handle);
    let error = other.evaluate("orphan.x", "orphan.js").unwrap_err();
    assert!(matches!(error.host_cause(), Some(HostError::Script(message)) if message.contains("closed")));
}
