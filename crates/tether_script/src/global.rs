//! Script globals exposed to the host

use crate::context::Shared;
use crate::error::BridgeError;
use crate::scope::Scope;
use rquickjs::Value;
use std::rc::{Rc, Weak};
use tether_host::{HostValue, MethodDescriptor};

/// A script global checked against a method list.
///
/// Holds a handle on the global's object, so the object stays alive even if
/// script later reassigns the global.
pub struct ExposedGlobal {
    name: String,
    handle: HostValue,
    methods: Vec<MethodDescriptor>,
    shared: Weak<Shared>,
}

impl ExposedGlobal {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &HostValue {
        &self.handle
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Call one of the validated methods.
    pub fn call(&self, method: &str, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        let Some(descriptor) = self.methods.iter().find(|m| m.name == method) else {
            return Err(BridgeError::MissingMethod {
                object: self.name.clone(),
                method: method.to_string(),
            });
        };
        if let Some(expected) = descriptor.arity {
            if args.len() != expected {
                return Err(BridgeError::ArgumentCount {
                    method: format!("{}.{}", self.name, method),
                    expected,
                    actual: args.len(),
                });
            }
        }

        let shared = self.shared.upgrade().ok_or(BridgeError::ContextClosed)?;
        let key = HostValue::from(method);
        shared.enter(|scope| scope.call_property(&self.handle, &key, args))
    }
}

impl std::fmt::Debug for ExposedGlobal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedGlobal")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

impl<'js> Scope<'js> {
    pub(crate) fn expose_global(
        &self,
        name: &str,
        methods: &[MethodDescriptor],
    ) -> Result<ExposedGlobal, BridgeError> {
        let globals = self.ctx.globals();
        let value: Value = self.js(globals.get(name))?;
        let Some(object) = value.into_object() else {
            return Err(BridgeError::GlobalNotFound {
                name: name.to_string(),
            });
        };

        for descriptor in methods {
            let member: Value = self.js(object.get(descriptor.name.as_str()))?;
            if !member.is_function() {
                return Err(BridgeError::MissingMethod {
                    object: name.to_string(),
                    method: descriptor.name.clone(),
                });
            }
        }

        let handle = self.host_handle_for(object)?;
        tracing::debug!(context = self.shared.id.0, global = name, "script global exposed");
        Ok(ExposedGlobal {
            name: name.to_string(),
            handle,
            methods: methods.to_vec(),
            shared: Rc::downgrade(&self.shared),
        })
    }
}
