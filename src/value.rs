use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

/// Static type of a Stanza value.
///
/// `Any` is the "any type accepted" marker: conversion to `Any` is the
/// identity, and schemas may use it for attributes with no fixed type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Any,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
}

impl Type {
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn list_of(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map_of(elem: Type) -> Type {
        Type::Map(Box::new(elem))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Bool => write!(f, "bool"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::List(elem) => write!(f, "list({elem})"),
            Type::Map(elem) => write!(f, "map({elem})"),
            Type::Object(attrs) => {
                write!(f, "object({{")?;
                for (i, (name, ty)) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {ty}")?;
                }
                write!(f, "}})")
            }
        }
    }
}

/// A Stanza value.
///
/// `Unknown` is a typed placeholder for "value not yet determined". It is
/// produced during speculative evaluation and propagates through expressions
/// instead of failing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unknown(Type),
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn unknown_any() -> Value {
        Value::Unknown(Type::Any)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The static type of this value. Unknown values report the type they
    /// are a placeholder for; null reports `Any`.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Unknown(ty) => ty.clone(),
            Value::Null => Type::Any,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(items) => {
                let mut elem: Option<Type> = None;
                for item in items {
                    let ty = item.type_of();
                    match &elem {
                        None => elem = Some(ty),
                        Some(prev) if *prev == ty => {}
                        Some(_) => return Type::list_of(Type::Any),
                    }
                }
                Type::list_of(elem.unwrap_or(Type::Any))
            }
            Value::Object(attrs) => Type::Object(
                attrs
                    .iter()
                    .map(|(name, val)| (name.clone(), val.type_of()))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(num) => Some(*num),
            _ => None,
        }
    }

    /// Build a value from a parsed JSON document.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(num) => Value::Number(num.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(text) => Value::String(text.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| (key.clone(), Value::from_json(val)))
                    .collect(),
            ),
        }
    }

    /// Render the value as a JSON document. Unknown values have no JSON
    /// representation and render as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Unknown(_) | Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(num) => Number::from_f64(*num)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(text) => serde_json::Value::String(text.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(attrs) => serde_json::Value::Object(
                attrs
                    .iter()
                    .map(|(key, val)| (key.clone(), val.to_json()))
                    .collect(),
            ),
        }
    }
}
