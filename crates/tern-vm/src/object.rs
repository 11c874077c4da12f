//! Heap objects

use std::rc::Rc;

use indexmap::IndexMap;
use tern_gc::{GcRef, GcTraceable};

use crate::function::JsFunction;
use crate::value::Value;

/// A plain script object: an ordered property map
#[derive(Debug, Default)]
pub struct JsObject {
    properties: IndexMap<String, Value>,
}

impl JsObject {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an own property
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Set an own property, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(key.into(), value)
    }

    /// Delete an own property, returning it
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    /// Own property names in insertion order
    pub fn own_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Number of own properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the object has no own properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Everything the runtime heap can hold
pub enum HeapObject {
    /// Plain object
    Object(JsObject),
    /// Callable function object
    Function(Rc<JsFunction>),
}

impl HeapObject {
    /// Function payload
    pub fn as_function(&self) -> Option<&Rc<JsFunction>> {
        match self {
            Self::Function(function) => Some(function),
            Self::Object(_) => None,
        }
    }

    /// Plain object payload
    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Function(_) => None,
        }
    }

    /// Mutable plain object payload
    pub fn as_object_mut(&mut self) -> Option<&mut JsObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Function(_) => None,
        }
    }
}

impl GcTraceable for HeapObject {
    const NEEDS_TRACE: bool = true;

    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        match self {
            Self::Object(object) => {
                for value in object.properties.values() {
                    if let Some(target) = value.as_gc_ref() {
                        tracer(target);
                    }
                }
            }
            Self::Function(function) => {
                for value in function.captures() {
                    if let Some(target) = value.as_gc_ref() {
                        tracer(target);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_order_and_delete() {
        let mut object = JsObject::new();
        object.set("b", Value::int32(2));
        object.set("a", Value::int32(1));
        assert_eq!(object.own_keys().collect::<Vec<_>>(), vec!["b", "a"]);

        assert_eq!(object.delete("b"), Some(Value::int32(2)));
        assert_eq!(object.len(), 1);
        assert_eq!(object.get("a"), Some(&Value::int32(1)));
    }

    #[test]
    fn test_object_traces_property_refs() {
        let mut registry = tern_gc::AllocationRegistry::new();
        let child = registry.allocate(HeapObject::Object(JsObject::new())).unwrap();
        let mut parent = JsObject::new();
        parent.set("child", Value::object(child));
        parent.set("n", Value::number(1.0));
        let parent = registry.allocate(HeapObject::Object(parent)).unwrap();

        let reclaimed = registry.collect(&[parent]);
        assert!(reclaimed.is_empty());
        assert!(registry.is_alive(child));
    }
}
