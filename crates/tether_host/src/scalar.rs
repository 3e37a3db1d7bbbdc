//! Scalar marshaller registry
//!
//! Host object types registered here cross into script by value instead of
//! as a proxy. Lookup is by the object's concrete `TypeId`.

use crate::{HostObject, HostValue};
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Marshal = Box<dyn Fn(&dyn Any) -> Option<HostValue>>;

#[derive(Default)]
pub struct ScalarRegistry {
    marshallers: HashMap<TypeId, Marshal>,
}

impl ScalarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as a native scalar/array type.
    ///
    /// Re-registering a type replaces the previous conversion.
    pub fn register<T, F>(&mut self, convert: F)
    where
        T: HostObject,
        F: Fn(&T) -> HostValue + 'static,
    {
        let previous = self.marshallers.insert(
            TypeId::of::<T>(),
            Box::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&convert)),
        );
        if previous.is_some() {
            tracing::debug!(type_name = std::any::type_name::<T>(), "scalar marshaller replaced");
        }
    }

    pub fn is_registered(&self, object: &dyn HostObject) -> bool {
        self.marshallers.contains_key(&object.as_any().type_id())
    }

    /// Convert `object` by value if its type is registered.
    pub fn marshal(&self, object: &dyn HostObject) -> Option<HostValue> {
        let any = object.as_any();
        self.marshallers.get(&any.type_id()).and_then(|f| f(any))
    }

    pub fn len(&self) -> usize {
        self.marshallers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marshallers.is_empty()
    }
}
