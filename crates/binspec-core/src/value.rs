//! Decoded values and records.
//!
//! A decode produces a [`Record`]: an insertion-ordered map of field names to
//! [`Value`]s. Values follow loosely-typed semantics so that schema
//! expressions can compare, add and index them without declaring types.

use crate::error::{Error, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// A single decoded or computed value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Absent value (unresolved reference, unknown function)
    #[default]
    Undefined,
    /// Boolean (bitfield flags, comparison results)
    Bool(bool),
    /// Integer that fits in 64 signed bits
    Int(i64),
    /// Any other number
    Float(f64),
    /// Latin-1 text
    Text(String),
    /// Raw bytes
    Bytes(Bytes),
    /// Ordered sequence (lists, bounded regions)
    List(Vec<Value>),
    /// Nested record
    Record(Record),
}

impl Value {
    /// Creates a number from an unsigned read, keeping it integral when it fits
    pub fn from_u64(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Float(n as f64),
        }
    }

    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// JavaScript-style truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Bytes(_) | Value::List(_) | Value::Record(_) => true,
        }
    }

    /// Returns the numeric value without coercion
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the record if this value is one
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the items if this value is a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Element count of lists, bytes and text
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Bytes(bytes) => Some(bytes.len()),
            Value::Text(text) => Some(text.chars().count()),
            _ => None,
        }
    }

    /// Coerces to a number: booleans become 0/1, numeric text is parsed.
    pub fn to_number(&self) -> Result<Value> {
        match self {
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Int(_) | Value::Float(_) => Ok(self.clone()),
            Value::Text(text) => {
                parse_numeric(text).ok_or_else(|| Error::coercion(format!("{:?}", text), "number"))
            }
            other => Err(Error::coercion(other.type_name(), "number")),
        }
    }

    /// Coerces to a number and returns it as `f64`
    pub fn to_f64(&self) -> Result<f64> {
        match self.to_number()? {
            Value::Int(n) => Ok(n as f64),
            Value::Float(f) => Ok(f),
            other => Err(Error::coercion(other.type_name(), "number")),
        }
    }

    /// Coerces to a byte length or repeat count
    pub fn to_length(&self) -> Result<usize> {
        match self.to_number()? {
            Value::Int(n) => usize::try_from(n).map_err(|_| Error::InvalidLength { value: n as f64 }),
            Value::Float(f) if f.is_finite() && f >= 0.0 => Ok(f.trunc() as usize),
            Value::Float(f) => Err(Error::InvalidLength { value: f }),
            other => Err(Error::coercion(other.type_name(), "length")),
        }
    }

    /// Loose equality: numbers compare by value, numeric text and booleans
    /// are coerced when compared with numbers.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Int(_) | Value::Float(_) | Value::Bool(_))
            | (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Text(_))
            | (Value::Text(_), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
                match (self.to_f64(), other.to_f64()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }

    /// Looks up one path segment: a record field, a list/bytes/text index,
    /// or the `length` of a sequence.
    pub fn child(&self, key: &str) -> Option<Cow<'_, Value>> {
        match self {
            Value::Record(record) => {
                if let Some(value) = record.get(key) {
                    return Some(Cow::Borrowed(value));
                }
            }
            Value::List(items) => {
                if let Ok(index) = key.parse::<usize>() {
                    return items.get(index).map(Cow::Borrowed);
                }
            }
            Value::Bytes(bytes) => {
                if let Ok(index) = key.parse::<usize>() {
                    return bytes.get(index).map(|&b| Cow::Owned(Value::Int(i64::from(b))));
                }
            }
            Value::Text(text) => {
                if let Ok(index) = key.parse::<usize>() {
                    return text.chars().nth(index).map(|c| Cow::Owned(Value::Text(c.to_string())));
                }
            }
            _ => {}
        }

        if key == "length" {
            return self.len().map(|n| Cow::Owned(Value::Int(n as i64)));
        }
        None
    }

    /// Resolves a dotted path (`a.b.0.c`) below this value
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let mut current = Cow::Borrowed(self);
        for segment in path.split('.') {
            current = match current {
                Cow::Borrowed(value) => value.child(segment)?,
                Cow::Owned(value) => Cow::Owned(value.child(segment)?.into_owned()),
            };
        }
        Some(current.into_owned())
    }
}

/// Parses decimal, `0x` hexadecimal or floating-point text
fn parse_numeric(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(Value::from_u64);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::Int(n));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.is_infinite() => {
                f.write_str(if *x > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", b)?;
                }
                Ok(())
            }
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Record(_) => f.write_str("[object Object]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Undefined => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes.iter() {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::List(items) => items.serialize(serializer),
            Value::Record(record) => record.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::from_u64(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

/// Insertion-ordered field map produced by a decode
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a field by name
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.fields.get(id)
    }

    /// Returns a mutable field by name
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Value> {
        self.fields.get_mut(id)
    }

    /// Sets a field; an existing field keeps its position and is overwritten
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(id.into(), value.into());
    }

    /// Returns true if the field exists
    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Copies every field of `other` onto this record, overwriting
    /// same-named fields.
    pub fn merge(&mut self, other: Record) {
        for (id, value) in other.fields {
            self.fields.insert(id, value);
        }
    }

    /// Resolves a dotted path whose first segment is a field of this record
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.get(head)?;
        match rest {
            Some(rest) => value.get_path(rest),
            None => Some(value.clone()),
        }
    }

    /// Appends to the list stored under `id`, creating the list if absent
    pub(crate) fn push_item(&mut self, id: &str, item: Value) {
        match self.fields.get_mut(id) {
            Some(Value::List(items)) => items.push(item),
            _ => {
                self.fields.insert(id.to_string(), Value::List(vec![item]));
            }
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
