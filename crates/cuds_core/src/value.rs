//! Attribute values and their type descriptors.
//!
//! An [`AttributeValue`] is what a [`Cuba`](crate::Cuba) key maps to inside a
//! [`DataContainer`](crate::DataContainer). Every value has a [`ValueType`]:
//! an element kind plus an optional fixed vector length. Persistence layers
//! use the `ValueType` seen on first write to fix a column's layout.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element kind of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Short string.
    Str,
}

impl ScalarKind {
    /// Lower-case name used in diagnostics and schema dumps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Str => "string",
        }
    }
}

/// Type descriptor of an attribute value: element kind and, for vectors, the
/// fixed element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    /// Element kind.
    pub kind: ScalarKind,
    /// `None` for scalars, `Some(n)` for vectors of length `n`.
    pub len: Option<usize>,
}

impl ValueType {
    /// A scalar of the given kind.
    #[must_use]
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self { kind, len: None }
    }

    /// A vector of `len` elements of the given kind.
    #[must_use]
    pub const fn vector(kind: ScalarKind, len: usize) -> Self {
        Self {
            kind,
            len: Some(len),
        }
    }

    /// Returns `true` for vector types.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        self.len.is_some()
    }

    /// Number of elements a value of this type holds (1 for scalars).
    #[must_use]
    pub const fn element_count(&self) -> usize {
        match self.len {
            Some(n) => n,
            None => 1,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            Some(n) => write!(f, "{}[{n}]", self.kind.name()),
            None => f.write_str(self.kind.name()),
        }
    }
}

/// A value stored under a CUBA key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Str(String),
    Int32Vec(Vec<i32>),
    Int64Vec(Vec<i64>),
    Float64Vec(Vec<f64>),
    StrVec(Vec<String>),
}

impl AttributeValue {
    /// The type descriptor of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int32(_) => ValueType::scalar(ScalarKind::Int32),
            Self::Int64(_) => ValueType::scalar(ScalarKind::Int64),
            Self::Float64(_) => ValueType::scalar(ScalarKind::Float64),
            Self::Str(_) => ValueType::scalar(ScalarKind::Str),
            Self::Int32Vec(v) => ValueType::vector(ScalarKind::Int32, v.len()),
            Self::Int64Vec(v) => ValueType::vector(ScalarKind::Int64, v.len()),
            Self::Float64Vec(v) => ValueType::vector(ScalarKind::Float64, v.len()),
            Self::StrVec(v) => ValueType::vector(ScalarKind::Str, v.len()),
        }
    }

    /// Numeric view of a scalar value as `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int32(v) => Some(f64::from(v)),
            Self::Int64(v) => Some(v as f64),
            Self::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Integer view of an integer scalar.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int32(v) => Some(i64::from(v)),
            Self::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// String view of a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<i32>> for AttributeValue {
    fn from(v: Vec<i32>) -> Self {
        Self::Int32Vec(v)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Int64Vec(v)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Float64Vec(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrVec(v)
    }
}

impl<const N: usize> From<[f64; N]> for AttributeValue {
    fn from(v: [f64; N]) -> Self {
        Self::Float64Vec(v.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for AttributeValue {
    fn from(v: [i32; N]) -> Self {
        Self::Int32Vec(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_types() {
        assert_eq!(
            AttributeValue::from(1_i32).value_type(),
            ValueType::scalar(ScalarKind::Int32)
        );
        assert_eq!(
            AttributeValue::from(1_i64).value_type(),
            ValueType::scalar(ScalarKind::Int64)
        );
        assert_eq!(
            AttributeValue::from(1.0).value_type(),
            ValueType::scalar(ScalarKind::Float64)
        );
        assert_eq!(
            AttributeValue::from("water").value_type(),
            ValueType::scalar(ScalarKind::Str)
        );
    }

    #[test]
    fn test_vector_type_carries_length() {
        let v = AttributeValue::from([0.2, -0.1]);
        assert_eq!(v.value_type(), ValueType::vector(ScalarKind::Float64, 2));
        assert_eq!(v.value_type().element_count(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(ValueType::scalar(ScalarKind::Int64).to_string(), "int64");
        assert_eq!(
            ValueType::vector(ScalarKind::Float64, 3).to_string(),
            "float64[3]"
        );
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(AttributeValue::Int32(7).as_f64(), Some(7.0));
        assert_eq!(AttributeValue::Int64(7).as_i64(), Some(7));
        assert_eq!(AttributeValue::Float64(1.5).as_i64(), None);
        assert_eq!(AttributeValue::from("x").as_str(), Some("x"));
    }
}
