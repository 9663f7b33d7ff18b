//! Value type definitions for Vellum.
//!
//! This module defines the `Value` enum which represents any value that can be stored
//! in a row cell, including links to other rows.

use crate::row::RowKey;
use crate::types::DataType;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

/// A value that can be stored in a row cell.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Link to a single row; `None` is a null link
    Link(Option<RowKey>),
    /// Ordered list of links
    LinkList(Vec<RowKey>),
}

impl Value {
    /// Returns true if this value is Null (a null link counts as Null).
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Link(None))
    }

    /// Returns the boolean value if this is a Bool, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int, None otherwise.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Double, None otherwise.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the keys this value links to (empty for non-link values).
    pub fn links(&self) -> &[RowKey] {
        match self {
            Value::Link(Some(key)) => core::slice::from_ref(key),
            Value::LinkList(keys) => keys.as_slice(),
            _ => &[],
        }
    }

    /// Returns whether this value is acceptable for a column of the given type.
    pub fn matches_type(&self, dt: DataType) -> bool {
        matches!(
            (self, dt),
            (Value::Null, DataType::Bool | DataType::Int | DataType::Double | DataType::String)
                | (Value::Bool(_), DataType::Bool)
                | (Value::Int(_), DataType::Int)
                | (Value::Double(_), DataType::Double)
                | (Value::String(_), DataType::String)
                | (Value::Link(_), DataType::Link(_))
                | (Value::LinkList(_), DataType::LinkList(_))
        )
    }

    /// Returns the type of this value when it is unambiguous.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int(_) => Some(DataType::Int),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::String),
            _ => None,
        }
    }

    /// Creates the default value for a column of the given type.
    pub fn default_for_type(dt: DataType) -> Self {
        match dt {
            DataType::Bool | DataType::Int | DataType::Double | DataType::String => Value::Null,
            DataType::Link(_) => Value::Link(None),
            DataType::LinkList(_) => Value::LinkList(Vec::new()),
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null | Value::Link(None) => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Link(Some(_)) => 4,
            Value::LinkList(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            // Cross-type numeric comparisons
            (Value::Int(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Link(Some(a)), Value::Link(Some(b))) => a.cmp(b),
            (Value::LinkList(a), Value::LinkList(b)) => a.cmp(b),
            // Different types (and the two spellings of null): order by type rank
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null | Value::Link(None) => {}
            Value::Bool(b) => b.hash(state),
            // Ints and doubles compare equal across types, so hash through f64
            Value::Int(i) => (*i as f64).to_bits().hash(state),
            Value::Double(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Link(Some(k)) => k.hash(state),
            Value::LinkList(keys) => keys.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<RowKey> for Value {
    fn from(v: RowKey) -> Self {
        Value::Link(Some(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
