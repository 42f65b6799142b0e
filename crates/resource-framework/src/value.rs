//! # Values and Field Types
//!
//! Field values are dynamically typed: a resource field can hold a scalar, a
//! list, a map, or a reference to another live resource. [`FieldType`] is the
//! declared type from the schema and knows the static default that mock
//! resources hand out.

use crate::error::{FrameworkError, Result};
use crate::resource::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically typed field value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Seconds since the unix epoch.
    Time(i64),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Resource(ResourceRef),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceRef> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // resources compare by identity, not by content
            (Value::Resource(a), Value::Resource(b)) => {
                std::ptr::addr_eq(std::sync::Arc::as_ptr(a), std::sync::Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Time(t) => write!(f, "time({t})"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Resource(r) => {
                let id = r.core().resource_id();
                write!(f, "{}{{id: {:?}}}", id.name, id.id)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<ResourceRef> for Value {
    fn from(r: ResourceRef) -> Self {
        Value::Resource(r)
    }
}

// =============================================================================
// DECLARED FIELD TYPES
// =============================================================================

/// The declared type of a field, parsed from the schema's type string.
///
/// Parsing is total: anything that is not a primitive, a `[]T` list or a
/// `map[K]V` map is taken to be the name of a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    String,
    Time,
    Dict,
    Array(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
    Resource(String),
}

impl FieldType {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s {
            "" | "any" => FieldType::Any,
            "bool" => FieldType::Bool,
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "string" => FieldType::String,
            "time" => FieldType::Time,
            "dict" => FieldType::Dict,
            _ => {
                if let Some(item) = s.strip_prefix("[]") {
                    return FieldType::Array(Box::new(FieldType::parse(item)));
                }
                if let Some(rest) = s.strip_prefix("map[") {
                    if let Some((key, value)) = rest.split_once(']') {
                        return FieldType::Map(
                            Box::new(FieldType::parse(key)),
                            Box::new(FieldType::parse(value)),
                        );
                    }
                }
                FieldType::Resource(s.to_owned())
            }
        }
    }

    /// The static default handed out by mock resources.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::Any | FieldType::Time | FieldType::Resource(_) => Value::Nil,
            FieldType::Bool => Value::Bool(false),
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::String => Value::String(String::new()),
            FieldType::Dict | FieldType::Map(_, _) => Value::Map(BTreeMap::new()),
            FieldType::Array(_) => Value::Array(Vec::new()),
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, FieldType::Resource(_))
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        FieldType::parse(&s)
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::String => write!(f, "string"),
            FieldType::Time => write!(f, "time"),
            FieldType::Dict => write!(f, "dict"),
            FieldType::Array(item) => write!(f, "[]{item}"),
            FieldType::Map(k, v) => write!(f, "map[{k}]{v}"),
            FieldType::Resource(name) => write!(f, "{name}"),
        }
    }
}

// =============================================================================
// KEYWORD ARGUMENTS
// =============================================================================

/// Keyword arguments handed to a resource factory.
pub type Args = BTreeMap<String, Value>;

/// Turns a flat `key, value, key, value, ...` sequence into [`Args`].
///
/// The sequence must have an even length and every key must be a string.
pub fn args_from_pairs(pairs: &[Value]) -> Result<Args> {
    if pairs.len() % 2 == 1 {
        return Err(FrameworkError::InvalidArguments(
            "named arguments must be supplied as (key, value, ...) and a value is missing".into(),
        ));
    }

    let mut args = Args::new();
    for pair in pairs.chunks_exact(2) {
        let Value::String(key) = &pair[0] else {
            return Err(FrameworkError::InvalidArguments(format!(
                "named argument key is not a string: {:?}",
                pair[0]
            )));
        };
        args.insert(key.clone(), pair[1].clone());
    }
    Ok(args)
}

/// Builds the flat keyword sequence accepted by `Runtime::create_resource`.
///
/// ```
/// use resource_framework::{kwargs, Value};
///
/// let args = kwargs!["name" => "bash", "version" => "5.1"];
/// assert_eq!(args.len(), 4);
/// assert_eq!(args[1], Value::from("bash"));
/// ```
#[macro_export]
macro_rules! kwargs {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($key), $crate::Value::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_types() {
        assert_eq!(FieldType::parse("string"), FieldType::String);
        assert_eq!(
            FieldType::parse("[]package"),
            FieldType::Array(Box::new(FieldType::Resource("package".into())))
        );
        assert_eq!(
            FieldType::parse("map[string][]int"),
            FieldType::Map(
                Box::new(FieldType::String),
                Box::new(FieldType::Array(Box::new(FieldType::Int)))
            )
        );
        assert_eq!(FieldType::parse("map[string]int").to_string(), "map[string]int");
    }

    #[test]
    fn zero_values_follow_declared_shape() {
        assert_eq!(FieldType::String.zero_value(), Value::from(""));
        assert_eq!(FieldType::parse("[]string").zero_value(), Value::Array(vec![]));
        assert_eq!(FieldType::Resource("os".into()).zero_value(), Value::Nil);
    }

    #[test]
    fn args_require_even_length_and_string_keys() {
        let args = args_from_pairs(&crate::kwargs!["name" => "bash"]).unwrap();
        assert_eq!(args.get("name"), Some(&Value::from("bash")));

        let odd = args_from_pairs(&[Value::from("name")]);
        assert!(matches!(odd, Err(FrameworkError::InvalidArguments(_))));

        let bad_key = args_from_pairs(&[Value::Int(1), Value::from("x")]);
        assert!(matches!(bad_key, Err(FrameworkError::InvalidArguments(_))));
    }
}
