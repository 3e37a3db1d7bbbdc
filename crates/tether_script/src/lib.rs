//! Tether Script - host/engine proxy bridge
//!
//! Embeds a QuickJS engine and lets host objects and script objects cross in
//! both directions:
//! - host objects enter script as engine `Proxy` objects whose traps call
//!   back into the host, reusing one proxy per host object per Context;
//! - script objects enter the host as [`ScriptHandle`]s, which keep the
//!   script object alive and restore it unchanged when passed back.
//!
//! Each [`Context`] owns its own heap and identity cache. Nothing crosses
//! between Contexts by identity: a handle from one Context entering another
//! is wrapped in a fresh proxy.

mod bootstrap;
pub mod config;
pub mod context;
pub mod debugger;
pub mod error;
mod frame;
pub mod global;
mod identity;
mod intercept;
pub mod lifecycle;
mod marshal;
mod proxy;
mod registry;
mod scope;
pub mod stats;

pub use config::{ConfigError, ContextConfig, DebuggerConfig};
pub use context::Context;
pub use debugger::{DebugTransport, SocketTransport};
pub use error::{BridgeError, ScriptError};
pub use global::ExposedGlobal;
pub use lifecycle::ScriptHandle;
pub use registry::{live_contexts, ContextId};

pub use tether_host::{
    Capability, HostError, HostObject, HostObjectRef, HostValue, MethodDescriptor, ProxyTarget,
    ScriptAccess,
};
