//! Generic adapter for host objects without a native proxy surface

use crate::{Capability, HostError, HostObject, HostObjectRef, HostValue, ProxyTarget, ScriptAccess};
use std::any::Any;
use std::rc::Rc;

/// Gives any [`HostObject`] a gettable proxy surface.
///
/// Property reads resolve reflective fields first, then methods. A method
/// comes back as a callable [`MethodRef`], so `obj.method(a, b)` from script
/// reads the method and then calls it.
pub struct HostObjectAdapter {
    object: HostObjectRef,
}

impl HostObjectAdapter {
    pub fn new(object: HostObjectRef) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &HostObjectRef {
        &self.object
    }
}

impl ProxyTarget for HostObjectAdapter {
    fn capability(&self) -> Capability {
        Capability::Gettable
    }

    fn get(&self, _access: &mut dyn ScriptAccess, name: &str) -> Result<HostValue, HostError> {
        if let Some(value) = self.object.property(name) {
            return Ok(value);
        }
        if self.object.has_method(name) {
            return Ok(HostValue::Object(Rc::new(MethodRef {
                target: self.object.clone(),
                name: name.to_string(),
            })));
        }
        Ok(HostValue::Null)
    }
}

/// A method of a host object, detached as a callable value.
pub struct MethodRef {
    target: HostObjectRef,
    name: String,
}

impl MethodRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HostObject for MethodRef {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &str {
        "MethodRef"
    }

    fn proxy_target(&self) -> Option<&dyn ProxyTarget> {
        Some(self)
    }
}

impl ProxyTarget for MethodRef {
    fn capability(&self) -> Capability {
        Capability::Callable
    }

    fn invoke(
        &self,
        access: &mut dyn ScriptAccess,
        _this: HostValue,
        args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        self.target.call_method(access, &self.name, args)
    }
}
