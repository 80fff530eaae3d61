//! Property values as seen by the schema index.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A property value of a graph entity.
///
/// Integers and floats share a single numeric index field, so distinct
/// values can collide in the index (large integers lose precision when
/// widened to `f64`). [`PropertyValue::value_equals`] compares values
/// exactly and is what uniqueness checks rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Exact value equality, numerically across integer and float.
    pub fn value_equals(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a == b,
            (PropertyValue::Int(i), PropertyValue::Float(f))
            | (PropertyValue::Float(f), PropertyValue::Int(i)) => int_equals_float(*i, *f),
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            (PropertyValue::Array(a), PropertyValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value_equals(y))
            }
            _ => false,
        }
    }

    /// The value widened to `f64`, for numeric values.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

// An i64 equals an f64 only if the float is integral and converts back exactly.
fn int_equals_float(i: i64, f: f64) -> bool {
    if !f.is_finite() || f.fract() != 0.0 {
        return false;
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return false;
    }
    f as i64 == i
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::String(s) => write!(f, "'{s}'"),
            PropertyValue::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}
