//! Engine-side helpers installed into every Context
//!
//! A small script evaluated once at startup. Its result object is kept in a
//! Persistent root and never reachable from script globals. It provides the
//! proxy factory, the identity side table and weak engine references.

use crate::identity::SlotId;
use rquickjs::{Array, Ctx, Function, Object, Persistent, Value};

const BOOTSTRAP: &str = r#"
(() => {
  const slots = new WeakMap();
  const hasOwn = Object.prototype.hasOwnProperty;
  const sourceOf = Function.prototype.toString;
  const METHODS = Symbol("methods");
  return {
    makeProxy(config) {
      const methods = Object.create(null);
      if (config.methods !== undefined) Object.assign(methods, config.methods);
      const target = () => {};
      return new Proxy(target, {
        get(_target, key) {
          if (key === METHODS) return methods;
          if (typeof key !== "string") return undefined;
          if (hasOwn.call(methods, key)) return methods[key];
          return config.get(key);
        },
        apply(_target, thisArg, args) {
          return config.apply(thisArg, args);
        },
      });
    },
    addMethods(proxy, table) { Object.assign(proxy[METHODS], table); },
    tag(object, slot) { slots.set(object, slot); },
    slotOf(object) {
      const slot = slots.get(object);
      return slot === undefined ? -1 : slot;
    },
    weaken(object) { return new WeakRef(object); },
    deref(ref) { return ref.deref(); },
    sourceText(fn) { return sourceOf.call(fn); },
    getKey(target, key) { return target[key]; },
    invoke(target, key, args) { return target[key](...args); },
    setGlobal(key, value) { globalThis[key] = value; },
  };
})()
"#;

type Root = Persistent<Function<'static>>;

pub(crate) struct Helpers {
    make_proxy: Root,
    add_methods: Root,
    tag: Root,
    slot_of: Root,
    weaken: Root,
    deref: Root,
    source_text: Root,
    get_key: Root,
    invoke: Root,
    set_global: Root,
}

impl Helpers {
    pub(crate) fn install(ctx: &Ctx<'_>) -> rquickjs::Result<Self> {
        let api: Object = ctx.eval(BOOTSTRAP)?;
        let root = |name: &str| -> rquickjs::Result<Root> {
            let function: Function = api.get(name)?;
            Ok(Persistent::save(ctx, function))
        };

        Ok(Self {
            make_proxy: root("makeProxy")?,
            add_methods: root("addMethods")?,
            tag: root("tag")?,
            slot_of: root("slotOf")?,
            weaken: root("weaken")?,
            deref: root("deref")?,
            source_text: root("sourceText")?,
            get_key: root("getKey")?,
            invoke: root("invoke")?,
            set_global: root("setGlobal")?,
        })
    }

    fn restore<'js>(root: &Root, ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
        root.clone().restore(ctx)
    }

    /// Wrap `config` (with `get`, `apply` and optional `methods`) in a proxy.
    pub(crate) fn make_proxy<'js>(
        &self,
        ctx: &Ctx<'js>,
        config: Object<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        Self::restore(&self.make_proxy, ctx)?.call((config,))
    }

    /// Merge `table` into the method table of a proxy made by `make_proxy`.
    pub(crate) fn add_methods<'js>(
        &self,
        ctx: &Ctx<'js>,
        proxy: &Object<'js>,
        table: Object<'js>,
    ) -> rquickjs::Result<()> {
        Self::restore(&self.add_methods, ctx)?.call((proxy.clone(), table))
    }

    pub(crate) fn tag<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
        slot: SlotId,
    ) -> rquickjs::Result<()> {
        Self::restore(&self.tag, ctx)?.call((object.clone(), slot))
    }

    pub(crate) fn slot_of<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
    ) -> rquickjs::Result<Option<SlotId>> {
        let slot: f64 = Self::restore(&self.slot_of, ctx)?.call((object.clone(),))?;
        Ok((slot >= 0.0).then_some(slot as SlotId))
    }

    pub(crate) fn weaken<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        Self::restore(&self.weaken, ctx)?.call((object.clone(),))
    }

    /// Target of a weak reference, or `None` once it has been collected.
    pub(crate) fn deref<'js>(
        &self,
        ctx: &Ctx<'js>,
        weak: Object<'js>,
    ) -> rquickjs::Result<Option<Object<'js>>> {
        let target: Value = Self::restore(&self.deref, ctx)?.call((weak,))?;
        Ok(target.into_object())
    }

    /// Source text of a function, unaffected by script patching `toString`.
    pub(crate) fn source_text<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: &Function<'js>,
    ) -> rquickjs::Result<String> {
        Self::restore(&self.source_text, ctx)?.call((function.clone(),))
    }

    pub(crate) fn get_key<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: Value<'js>,
        key: Value<'js>,
    ) -> rquickjs::Result<Value<'js>> {
        Self::restore(&self.get_key, ctx)?.call((target, key))
    }

    pub(crate) fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: Value<'js>,
        key: Value<'js>,
        args: Array<'js>,
    ) -> rquickjs::Result<Value<'js>> {
        Self::restore(&self.invoke, ctx)?.call((target, key, args))
    }

    pub(crate) fn set_global<'js>(
        &self,
        ctx: &Ctx<'js>,
        key: Value<'js>,
        value: Value<'js>,
    ) -> rquickjs::Result<()> {
        Self::restore(&self.set_global, ctx)?.call((key, value))
    }
}
