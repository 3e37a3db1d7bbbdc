//! `console` global for scripts run by the binary

use std::any::Any;
use tether_host::{HostError, HostObject, HostValue, MethodDescriptor, ScriptAccess};

pub struct Console;

impl Console {
    pub fn methods() -> Vec<MethodDescriptor> {
        ["log", "warn", "error"]
            .into_iter()
            .map(MethodDescriptor::variadic)
            .collect()
    }
}

impl HostObject for Console {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &str {
        "Console"
    }

    fn method_names(&self) -> Vec<String> {
        vec!["log".into(), "warn".into(), "error".into()]
    }

    fn call_method(
        &self,
        _access: &mut dyn ScriptAccess,
        name: &str,
        args: Vec<HostValue>,
    ) -> Result<HostValue, HostError> {
        let line = args.iter().map(render).collect::<Vec<_>>().join(" ");
        match name {
            "log" => println!("{line}"),
            "warn" | "error" => eprintln!("{line}"),
            other => return Err(HostError::unsupported(other, self.type_name())),
        }
        Ok(HostValue::Null)
    }
}

/// Human-readable form of a value crossing out of script.
pub fn render(value: &HostValue) -> String {
    match value {
        HostValue::Null => "null".into(),
        HostValue::Bool(value) => value.to_string(),
        HostValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        HostValue::Number(value) => value.to_string(),
        HostValue::String(value) => value.clone(),
        HostValue::Array(items) => {
            let items: Vec<_> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        HostValue::Object(object) => format!("[object {}]", object.type_name()),
    }
}
