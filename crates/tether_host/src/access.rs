use crate::{HostError, HostValue};

/// Re-entry into the engine from inside a host method.
///
/// Handed to every host call. Calls made through it run on the same logical
/// thread as the trap that invoked the host, nested inside the current
/// engine frame.
pub trait ScriptAccess {
    fn evaluate(&mut self, source: &str, file_name: &str) -> Result<HostValue, HostError>;

    fn call(&mut self, target: &HostValue, args: &[HostValue]) -> Result<HostValue, HostError>;

    fn call_property(
        &mut self,
        target: &HostValue,
        key: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, HostError>;

    fn get_key(&mut self, target: &HostValue, key: &HostValue) -> Result<HostValue, HostError>;

    fn set_global(&mut self, name: &str, value: &HostValue) -> Result<(), HostError>;
}
