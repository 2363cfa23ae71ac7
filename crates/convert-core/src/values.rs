//! In-memory value representation.
//!
//! [`Value`] is the structured, typed side of every conversion: reverse
//! conversion produces it from a tree, forward conversion turns it back into a
//! tree. Values built from custom Rust types plug in through [`CustomValue`].

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;

use crate::schema::{EnumRef, RecordRef};

/// A structured in-memory value.
///
/// `Clone` produces a structurally independent copy: nested containers are
/// cloned element by element and custom payloads through
/// [`CustomValueBase::clone_boxed`].
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value (`null` on the wire)
    Null,

    /// Boolean value
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Float(f64),

    /// String value
    String(String),

    /// Binary data (base64 on the wire)
    Bytes(Vec<u8>),

    /// Ordered homogeneous sequence
    List(Vec<Value>),

    /// Fixed or variable arity tuple
    Tuple(Vec<Value>),

    /// Unordered collection; equality ignores order
    Set(Vec<Value>),

    /// Key/value pairs in insertion order; equality ignores order
    Map(Vec<(Value, Value)>),

    /// Instance of a declared record type
    Record(RecordValue),

    /// Member of a declared enum type
    Enum(EnumValue),

    /// Value of an adapter-provided type
    Custom(Box<dyn CustomValue>),

    /// Unconstrained tree data, kept as-is
    Tree(serde_json::Value),
}

impl Value {
    /// Create a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Create a list value from anything iterable.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Create a set value from anything iterable.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    /// Wrap a custom payload.
    pub fn custom<T: CustomValue>(value: T) -> Self {
        Self::Custom(Box::new(value))
    }

    /// Check if this value is the absence sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's kind, used in diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Bytes(_) => "Bytes",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::Record(record) => record.def.name(),
            Self::Enum(value) => value.def.name(),
            Self::Custom(custom) => custom.type_name(),
            Self::Tree(_) => "Tree",
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as an f64. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a list or tuple slice.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get this value as a mutable list.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get this value as a record.
    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Try to get this value as a mutable record.
    pub fn as_record_mut(&mut self) -> Option<&mut RecordValue> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Try to downcast a custom payload.
    pub fn as_custom<T: CustomValue>(&self) -> Option<&T> {
        match self {
            Self::Custom(custom) => custom.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Look up a string key in a map value.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Length of a sized value: characters of a string, bytes, or elements
    /// of a container.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Bytes(b) => Some(b.len()),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items.len()),
            Self::Map(entries) => Some(entries.len()),
            Self::Tree(serde_json::Value::Array(items)) => Some(items.len()),
            Self::Tree(serde_json::Value::Object(map)) => Some(map.len()),
            Self::Tree(serde_json::Value::String(s)) => Some(s.chars().count()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        Self::Record(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => unordered_eq(a, b, |x, y| x == y),
            (Self::Map(a), Self::Map(b)) => unordered_eq(a, b, |x, y| x.0 == y.0 && x.1 == y.1),
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => a.eq_dyn(b.as_ref()),
            (Self::Tree(a), Self::Tree(b)) => a == b,
            _ => false,
        }
    }
}

// Multiset comparison; elements are only required to be comparable for
// equality, so this is quadratic.
fn unordered_eq<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && eq(x, y))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Partial ordering between values of compatible kinds.
///
/// Numbers compare with each other, strings, booleans and bytes with their
/// own kind, tuples lexicographically. Anything else is not orderable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Tuple(x), Value::Tuple(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare_values(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

// ============================================================================
// Records and enums
// ============================================================================

/// Instance of a declared record type.
///
/// Field values are keyed by the field's internal name. Omittable fields that
/// were absent on input are simply missing from `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    /// The record's declaration
    pub def: RecordRef,

    /// Field values by internal name, in declaration order
    pub fields: IndexMap<String, Value>,
}

impl RecordValue {
    /// Create an empty record value of the given type.
    pub fn new(def: RecordRef) -> Self {
        Self {
            def,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value by internal name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a mutable field value by internal name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }
}

/// Member of a declared enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    /// The enum's declaration
    pub def: EnumRef,

    /// Member name
    pub member: String,
}

// ============================================================================
// Custom values
// ============================================================================

/// Object-safe plumbing every [`CustomValue`] gets for free.
///
/// Implemented for all `CustomValue + Clone + PartialEq` types; never
/// implement it by hand.
pub trait CustomValueBase {
    /// Deep clone into a new box.
    fn clone_boxed(&self) -> Box<dyn CustomValue>;

    /// Dynamic equality; values of different concrete types are never equal.
    fn eq_dyn(&self, other: &dyn CustomValue) -> bool;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> CustomValueBase for T
where
    T: CustomValue + Clone + PartialEq,
{
    fn clone_boxed(&self) -> Box<dyn CustomValue> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn CustomValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A value of an adapter-provided type.
///
/// Forward conversion first looks for an adapter registered for the exact
/// concrete type, then falls back to the capabilities below in the fixed
/// priority order map, sequence, set.
pub trait CustomValue: CustomValueBase + fmt::Debug + Send + Sync + 'static {
    /// Name used in diagnostics.
    fn type_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Expose the value as a mapping.
    fn as_map_like(&self) -> Option<&dyn MapLike> {
        None
    }

    /// Expose the value as an ordered sequence.
    fn as_sequence_like(&self) -> Option<&dyn SequenceLike> {
        None
    }

    /// Expose the value as an unordered set.
    fn as_set_like(&self) -> Option<&dyn SetLike> {
        None
    }
}

impl dyn CustomValue {
    /// Downcast to a concrete type.
    pub fn downcast_ref<T: CustomValue>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// `TypeId` of the concrete payload type.
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }
}

impl Clone for Box<dyn CustomValue> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Capability: the value can be viewed as key/value pairs.
pub trait MapLike {
    fn map_entries(&self) -> Vec<(Value, Value)>;
}

/// Capability: the value can be viewed as an ordered sequence.
pub trait SequenceLike {
    fn sequence_items(&self) -> Vec<Value>;
}

/// Capability: the value can be viewed as an unordered collection.
pub trait SetLike {
    fn set_members(&self) -> Vec<Value>;
}
