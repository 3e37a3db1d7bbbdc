//! Value marshaller
//!
//! Push (host -> engine) and pop (engine -> host) for single values. Object
//! classification lives with the proxy bridge and the lifecycle coordinator.

use crate::error::BridgeError;
use crate::scope::Scope;
use rquickjs::{Array, Value};
use tether_host::HostValue;

/// Nesting limit for arrays leaving the engine.
const MAX_ARRAY_DEPTH: usize = 256;

impl<'js> Scope<'js> {
    pub(crate) fn to_js(&self, value: &HostValue) -> Result<Value<'js>, BridgeError> {
        let ctx = self.ctx.clone();
        match value {
            HostValue::Null => Ok(Value::new_null(ctx)),
            HostValue::Bool(value) => Ok(Value::new_bool(ctx, *value)),
            HostValue::Number(value) => Ok(Value::new_number(ctx, *value)),
            HostValue::String(value) => {
                let string = self.js(rquickjs::String::from_str(ctx, value))?;
                Ok(string.into_value())
            }
            HostValue::Array(items) => {
                let array = self.js(Array::new(ctx))?;
                for (index, item) in items.iter().enumerate() {
                    let item = self.to_js(item)?;
                    self.js(array.set(index, item))?;
                }
                Ok(array.into_value())
            }
            HostValue::Object(object) => self.object_to_js(object),
        }
    }

    /// Undefined and anything unsupported come back as `Null`.
    pub(crate) fn from_js(&self, value: Value<'js>) -> Result<HostValue, BridgeError> {
        self.from_js_nested(value, &mut Vec::new())
    }

    /// `open` holds the arrays being marshalled around `value`, outermost
    /// first.
    fn from_js_nested(
        &self,
        value: Value<'js>,
        open: &mut Vec<Value<'js>>,
    ) -> Result<HostValue, BridgeError> {
        if let Some(value) = value.as_bool() {
            return Ok(HostValue::Bool(value));
        }
        if let Some(value) = value.as_number() {
            return Ok(HostValue::Number(value));
        }
        if let Some(value) = value.as_string() {
            return Ok(HostValue::String(self.js(value.to_string())?));
        }
        if let Some(array) = value.as_array() {
            if open.contains(&value) {
                return Err(self.type_error("cyclic array cannot be marshalled"));
            }
            if open.len() >= MAX_ARRAY_DEPTH {
                return Err(self.type_error("array nesting is too deep to marshal"));
            }
            let mut items = Vec::with_capacity(array.len());
            open.push(value.clone());
            for item in array.iter::<Value>() {
                let item = self.from_js_nested(self.js(item)?, open);
                match item {
                    Ok(item) => items.push(item),
                    Err(error) => {
                        open.pop();
                        return Err(error);
                    }
                }
            }
            open.pop();
            return Ok(HostValue::Array(items));
        }
        match value.into_object() {
            Some(object) => self.host_handle_for(object),
            None => Ok(HostValue::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BridgeError, Context};
    use tether_host::HostValue;

    #[test]
    fn scalars_cross_by_value() {
        let context = Context::new().unwrap();
        let value = context
            .evaluate("[1, 'two', true, null, undefined, [3.5]]", "scalars.js")
            .unwrap();

        assert_eq!(
            value,
            HostValue::Array(vec![
                HostValue::Number(1.0),
                HostValue::from("two"),
                HostValue::Bool(true),
                HostValue::Null,
                HostValue::Null,
                HostValue::Array(vec![HostValue::Number(3.5)]),
            ])
        );
    }

    #[test]
    fn host_arrays_become_script_arrays() {
        let context = Context::new().unwrap();
        context
            .set_global_property(&"list".into(), &HostValue::from(vec![1, 2, 3]))
            .unwrap();

        let result = context
            .evaluate("Array.isArray(list) && list.reduce((a, b) => a + b, 0)", "sum.js")
            .unwrap();
        assert_eq!(result, HostValue::Number(6.0));
    }

    #[test]
    fn cyclic_arrays_are_refused() {
        let context = Context::new().unwrap();
        let error = context
            .evaluate("var ring = [1]; ring.push([ring]); ring", "ring.js")
            .unwrap_err();
        assert!(
            matches!(error, BridgeError::ScriptExecution(ref e) if e.name == "TypeError"),
            "unexpected error: {error:?}"
        );
        assert!(!context.is_poisoned());

        // Shared, acyclic sub-arrays are fine.
        let value = context
            .evaluate("var pair = [2]; [pair, pair]", "shared.js")
            .unwrap();
        let pair = HostValue::Array(vec![HostValue::Number(2.0)]);
        assert_eq!(value, HostValue::Array(vec![pair.clone(), pair]));
    }

    #[test]
    fn symbols_pop_as_null() {
        let context = Context::new().unwrap();
        let value = context.evaluate("Symbol('x')", "symbol.js").unwrap();
        assert!(value.is_null());
    }
}
