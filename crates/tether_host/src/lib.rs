//! Tether Host Object Model
//!
//! The host side of the bridge: values as the host sees them, the traits a
//! host object implements to be reachable from script, and the re-entry seam
//! host methods use to call back into the engine.
//!
//! Nothing in this crate knows about the engine. `tether_script` consumes
//! these types and does the marshalling.

pub mod access;
pub mod adapter;
pub mod error;
pub mod method;
pub mod object;
pub mod scalar;
pub mod value;

pub use access::ScriptAccess;
pub use adapter::{HostObjectAdapter, MethodRef};
pub use error::HostError;
pub use method::MethodDescriptor;
pub use object::{host_key, Capability, HostObject, HostObjectRef, ProxyTarget};
pub use scalar::ScalarRegistry;
pub use value::HostValue;
