//! Dynamic value representation
//!
//! Values cross three boundaries: the host hands them in as endowments,
//! module functors produce and consume them through bindings, and exports
//! namespaces surface them back to the host. Heap values (objects,
//! functions, namespaces) are `Arc`-backed so that identity is observable:
//! two imports of the same module see the *same* object, not equal copies.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::namespace::ModuleNamespace;

/// Errors raised by value operations
#[derive(Debug, Error, Clone)]
pub enum ValueError {
    /// Attempted to call a value that is not a function
    #[error("value is not callable")]
    NotCallable,

    /// A native function body reported a failure
    #[error("{name}: {message}")]
    Thrown {
        /// Name of the failing function
        name: String,
        /// Failure message
        message: String,
    },
}

/// A dynamic value
///
/// Clone is cheap: heap variants clone an `Arc`. Equality follows the host
/// language: primitives compare by value (NaN is not equal to itself),
/// heap values compare by reference.
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Undefined,
    /// Explicit null
    Null,
    /// Boolean value
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Mutable property bag with reference identity
    Object(Arc<Object>),
    /// Callable host function with reference identity
    Function(Arc<NativeFunction>),
    /// A module exports namespace
    Namespace(Arc<ModuleNamespace>),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Create a number value
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Create an empty object value
    pub fn object() -> Self {
        Value::Object(Arc::new(Object::new()))
    }

    /// Create a function value
    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction::new(name, body)))
    }

    /// Call this value as a function
    pub fn call(&self, args: &[Value]) -> Result<Value, ValueError> {
        match self {
            Value::Function(f) => f.call(args),
            _ => Err(ValueError::NotCallable),
        }
    }

    /// Extract a boolean, if this is one
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract a number, if this is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract a string slice, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the object handle, if this is an object
    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Extract the namespace handle, if this is a namespace
    pub fn as_namespace(&self) -> Option<&Arc<ModuleNamespace>> {
        match self {
            Value::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    /// Reference-identity comparison
    ///
    /// Primitives compare by value; objects, functions, and namespaces
    /// compare by pointer. This is the comparison module graphs care
    /// about: a diamond dependency must observe the *same* heap value
    /// through both edges.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // NaN is never equal to itself
                if a.is_nan() && b.is_nan() {
                    false
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(_) => write!(f, "[object]"),
            Value::Function(func) => write!(f, "[function {}]", func.name()),
            Value::Namespace(_) => write!(f, "[module namespace]"),
        }
    }
}

/// A mutable property bag with reference identity
#[derive(Default)]
pub struct Object {
    properties: RwLock<FxHashMap<String, Value>>,
}

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a property
    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    /// Write a property
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.properties.write().insert(name.into(), value);
    }

    /// Check for a property
    pub fn has(&self, name: &str) -> bool {
        self.properties.read().contains_key(name)
    }

    /// Own property names, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.properties.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .finish()
    }
}

type NativeFnBody = dyn Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync;

/// A callable host function
pub struct NativeFunction {
    name: String,
    body: Box<NativeFnBody>,
}

impl NativeFunction {
    /// Create a function from a name and a body closure
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Function name, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function body
    pub fn call(&self, args: &[Value]) -> Result<Value, ValueError> {
        (self.body)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_equality() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn test_object_identity() {
        let a = Value::object();
        let b = a.clone();
        let c = Value::object();

        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_object_properties() {
        let obj = Object::new();
        obj.set("b", Value::Number(2.0));
        obj.set("a", Value::Number(1.0));

        assert!(obj.has("a"));
        assert!(!obj.has("c"));
        assert_eq!(obj.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(obj.get("b"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_function_call() {
        let double = Value::function("double", |args| {
            let n = args
                .first()
                .and_then(Value::as_number)
                .unwrap_or(f64::NAN);
            Ok(Value::Number(n * 2.0))
        });

        let result = double.call(&[Value::Number(21.0)]).unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn test_call_non_function() {
        let result = Value::Null.call(&[]);
        assert!(matches!(result, Err(ValueError::NotCallable)));
    }
}
