//! Host-side value representation

use crate::object::HostObjectRef;
use std::fmt;
use std::rc::Rc;

/// A value as seen by the host.
///
/// Scalars and arrays cross the boundary by copy. Objects cross by reference:
/// a host object becomes a proxy in the engine heap, and an engine object
/// comes back as a host-visible handle (itself an `Object`).
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    Object(HostObjectRef),
}

impl HostValue {
    pub fn object<T: crate::HostObject>(object: T) -> Self {
        HostValue::Object(Rc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Reference identity for objects, value equality for everything else.
    pub fn same(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Object(a), HostValue::Object(b)) => Rc::ptr_eq(a, b),
            (HostValue::Array(a), HostValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Number(n) => write!(f, "Number({n})"),
            HostValue::String(s) => write!(f, "String({s:?})"),
            HostValue::Array(items) => f.debug_list().entries(items).finish(),
            HostValue::Object(object) => write!(f, "Object(<{}>)", object.type_name()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(values: Vec<T>) -> Self {
        HostValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<HostObjectRef> for HostValue {
    fn from(object: HostObjectRef) -> Self {
        HostValue::Object(object)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HostValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostObject;
    use std::any::Any;

    struct Marker;

    impl HostObject for Marker {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn objects_compare_by_identity() {
        let a: HostObjectRef = Rc::new(Marker);
        let b: HostObjectRef = Rc::new(Marker);

        assert_eq!(HostValue::Object(a.clone()), HostValue::Object(a.clone()));
        assert_ne!(HostValue::Object(a), HostValue::Object(b));
    }

    #[test]
    fn conversions_produce_scalars() {
        assert_eq!(HostValue::from(3), HostValue::Number(3.0));
        assert_eq!(HostValue::from("x"), HostValue::String("x".into()));
        assert_eq!(HostValue::from(None::<bool>), HostValue::Null);
        assert_eq!(
            HostValue::from(vec![1, 2]),
            HostValue::Array(vec![HostValue::Number(1.0), HostValue::Number(2.0)])
        );
    }
}
