//! Value types carried by attributes, expressions and result cells.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static type of an attribute or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Bool,
}

impl ValueType {
    /// Parse a type name as written in a schema file.
    ///
    /// Accepts the usual SQL and JVM spellings:
    /// - `int`, `integer`, `long`, `bigint`
    /// - `float`, `double`, `real`
    /// - `text`, `string`, `varchar`
    /// - `bool`, `boolean`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "int" | "integer" | "long" | "bigint" => Some(ValueType::Int),
            "float" | "double" | "real" => Some(ValueType::Float),
            "text" | "string" | "varchar" => Some(ValueType::Text),
            "bool" | "boolean" => Some(ValueType::Bool),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    /// Whether values of `self` and `other` may be compared with each other.
    ///
    /// Integers and floats compare freely; every other pairing must match.
    pub fn comparable_with(&self, other: ValueType) -> bool {
        *self == other || (self.is_numeric() && other.is_numeric())
    }

    /// The common type of two comparable types (numeric mixes widen to float).
    pub fn unify(&self, other: ValueType) -> Option<ValueType> {
        if *self == other {
            Some(*self)
        } else if self.is_numeric() && other.is_numeric() {
            Some(ValueType::Float)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Bool => "bool",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime value: a bound parameter or a decoded result cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// The type of this value, `None` for NULL.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueType::Int),
            Value::Float(_) => Some(ValueType::Float),
            Value::Text(_) => Some(ValueType::Text),
            Value::Bool(_) => Some(ValueType::Bool),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a raw driver value to the declared type of its column.
    ///
    /// Drivers without native booleans hand back integers, and aggregates
    /// such as AVG may come back as integers on some engines. Values that do
    /// not fit the declared type are returned unchanged.
    pub fn coerce(self, ty: ValueType) -> Value {
        match (self, ty) {
            (Value::Int(n), ValueType::Float) => Value::Float(n as f64),
            (Value::Int(n), ValueType::Bool) => Value::Bool(n != 0),
            (Value::Float(f), ValueType::Int) if f.fract() == 0.0 => Value::Int(f as i64),
            (v, _) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
