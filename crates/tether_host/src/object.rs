//! Host object traits
//!
//! Two levels of participation:
//! - every host object implements [`HostObject`] (reflection + method calls);
//! - objects that want full control over how script sees them also expose a
//!   [`ProxyTarget`] through [`HostObject::proxy_target`]. Everything else is
//!   wrapped in a [`crate::HostObjectAdapter`] when it crosses into script.

use crate::{HostError, HostValue, ScriptAccess};
use std::any::Any;
use std::rc::Rc;

/// Shared, reference-counted host object. Identity is pointer identity.
pub type HostObjectRef = Rc<dyn HostObject>;

/// What a proxy may do with its host object.
///
/// Fixed when the proxy is created and carried on the proxy record, so traps
/// never re-derive it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Gettable,
    Callable,
    Both,
}

impl Capability {
    pub fn allows_get(self) -> bool {
        matches!(self, Capability::Gettable | Capability::Both)
    }

    pub fn allows_call(self) -> bool {
        matches!(self, Capability::Callable | Capability::Both)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Capability::Gettable => "gettable",
            Capability::Callable => "callable",
            Capability::Both => "gettable and callable",
        }
    }
}

/// A host runtime object.
pub trait HostObject: Any {
    fn as_any(&self) -> &dyn Any;

    /// Human-readable name for diagnostics.
    fn type_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The proxy-capable interface, if this object implements it natively.
    fn proxy_target(&self) -> Option<&dyn ProxyTarget> {
        None
    }

    /// Reflective field read.
    fn property(&self, _name: &str) -> Option<HostValue> {
        None
    }

    /// Names of the methods this object answers to.
    fn method_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn has_method(&self, name: &str) -> bool {
        self.method_names().iter().any(|m| m == name)
    }

    /// Invoke a named method.
    fn call_method(
        &self,
        _access: &mut dyn ScriptAccess,
        name: &str,
        _args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        Err(HostError::unsupported(name, self.type_name()))
    }
}

/// The interface a proxy dispatches into.
pub trait ProxyTarget {
    fn capability(&self) -> Capability;

    /// Serve a property read.
    fn get(&self, _access: &mut dyn ScriptAccess, _name: &str) -> Result<HostValue, HostError> {
        Err(HostError::unsupported("get", "proxy target"))
    }

    /// Serve a call.
    fn invoke(
        &self,
        _access: &mut dyn ScriptAccess,
        _this: HostValue,
        _args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        Err(HostError::unsupported("invoke", "proxy target"))
    }
}

/// Identity key of a host object, stable while the object is alive.
pub fn host_key(object: &HostObjectRef) -> usize {
    Rc::as_ptr(object) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_checks() {
        assert!(Capability::Gettable.allows_get());
        assert!(!Capability::Gettable.allows_call());
        assert!(Capability::Callable.allows_call());
        assert!(Capability::Both.allows_get() && Capability::Both.allows_call());
    }

    struct Plain;

    impl HostObject for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn host_key_follows_rc_identity() {
        let a: HostObjectRef = Rc::new(Plain);
        let alias = a.clone();
        let b: HostObjectRef = Rc::new(Plain);

        assert_eq!(host_key(&a), host_key(&alias));
        assert_ne!(host_key(&a), host_key(&b));
    }
}
