//! Scoped marshalling frame
//!
//! Every marshalling sequence runs inside a [`Frame`]. Values pushed onto
//! the frame must all be popped before it is released. A frame released with
//! leftovers after an error was raised through it (or while unwinding) is
//! simply cleared; leftovers on the normal path are a bridge bug.

use crate::error::BridgeError;
use crate::scope::Scope;
use rquickjs::Value;
use tether_host::HostValue;

pub(crate) struct Frame<'s, 'js> {
    scope: &'s Scope<'js>,
    stack: Vec<Value<'js>>,
    label: &'static str,
    raised: bool,
}

impl<'s, 'js> Frame<'s, 'js> {
    pub fn new(scope: &'s Scope<'js>, label: &'static str) -> Self {
        Self {
            scope,
            stack: Vec::new(),
            label,
            raised: false,
        }
    }

    /// Marshal a host value onto the frame.
    pub fn push(&mut self, value: &HostValue) -> Result<(), BridgeError> {
        match self.scope.to_js(value) {
            Ok(value) => {
                self.stack.push(value);
                Ok(())
            }
            Err(error) => Err(self.raise(error)),
        }
    }

    pub fn push_value(&mut self, value: Value<'js>) {
        self.stack.push(value);
    }

    /// Pop the top value as a host value.
    pub fn pop(&mut self) -> Result<HostValue, BridgeError> {
        let value = self.pop_value()?;
        self.scope.from_js(value).map_err(|error| self.raise(error))
    }

    pub fn pop_value(&mut self) -> Result<Value<'js>, BridgeError> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => {
                let error = self.scope.poison(BridgeError::Fatal(format!(
                    "marshalling frame '{}' underflow",
                    self.label
                )));
                Err(self.raise(error))
            }
        }
    }

    /// Remove the top `count` values, in push order.
    pub fn take(&mut self, count: usize) -> Vec<Value<'js>> {
        let at = self.stack.len().saturating_sub(count);
        self.stack.split_off(at)
    }

    /// Remove the top `count` values as host values, in push order.
    pub fn take_host(&mut self, count: usize) -> Result<Vec<HostValue>, BridgeError> {
        let values = self.take(count);
        let mut host = Vec::with_capacity(values.len());
        for value in values {
            host.push(self.scope.from_js(value).map_err(|error| self.raise(error))?);
        }
        Ok(host)
    }

    /// Mark the frame as unwinding an error.
    pub fn raise(&mut self, error: BridgeError) -> BridgeError {
        self.raised = true;
        error
    }
}

impl Drop for Frame<'_, '_> {
    fn drop(&mut self) {
        if self.stack.is_empty() {
            return;
        }
        if self.raised || std::thread::panicking() {
            self.stack.clear();
            return;
        }
        tracing::error!(
            frame = self.label,
            leftover = self.stack.len(),
            "unbalanced marshalling frame"
        );
        self.stack.clear();
        debug_assert!(false, "unbalanced marshalling frame '{}'", self.label);
    }
}
