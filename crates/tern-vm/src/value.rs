//! Script values
//!
//! Primitives are stored inline. Objects and functions are GC handles into
//! the runtime heap, so a `Value` is only meaningful together with the
//! runtime that allocated it.

use std::fmt;
use std::rc::Rc;

use tern_gc::GcRef;

/// A script value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Heap object (plain object or function)
    Object(GcRef),
}

impl Value {
    /// `undefined`
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Number value
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Integer value (stored as a number)
    pub const fn int32(n: i32) -> Self {
        Self::Number(n as f64)
    }

    /// String value
    pub fn string(s: &str) -> Self {
        Self::String(Rc::from(s))
    }

    /// Heap reference value
    pub const fn object(target: GcRef) -> Self {
        Self::Object(target)
    }

    /// Check for `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check for `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Check for a heap reference
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Number payload
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer payload, if the number is integral and in range
    pub fn as_int32(&self) -> Option<i32> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
            Some(n as i32)
        } else {
            None
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Heap handle payload
    pub fn as_gc_ref(&self) -> Option<GcRef> {
        match self {
            Self::Object(target) => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
            Self::Object(target) => write!(f, "[object {}]", target),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int32(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_roundtrip_bounds() {
        assert_eq!(Value::int32(21).as_int32(), Some(21));
        assert_eq!(Value::number(1.5).as_int32(), None);
        assert_eq!(Value::number(1e12).as_int32(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::undefined().to_string(), "undefined");
        assert_eq!(Value::number(42.0).to_string(), "42");
        assert_eq!(Value::string("boom").to_string(), "boom");
    }

    #[test]
    fn test_nullish() {
        assert!(Value::null().is_nullish());
        assert!(Value::undefined().is_nullish());
        assert!(!Value::boolean(false).is_nullish());
    }
}
