use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Dynamic argument and result value passed through a service call.
///
/// Callers invoke operations by name with a list of `Value`s; the resolver
/// matches them against the declared [`ValueType`]s of each overload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value. Never accepted by a declared parameter type.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// String-keyed map. `BTreeMap` keeps serialization order deterministic.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the concrete type of this value, or `None` for `Null`.
    #[must_use]
    pub fn kind(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Int(_) => Some(ValueType::Int),
            Self::Float(_) => Some(ValueType::Float),
            Self::String(_) => Some(ValueType::String),
            Self::Bytes(_) => Some(ValueType::Bytes),
            Self::Array(_) => Some(ValueType::Array),
            Self::Map(_) => Some(ValueType::Map),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Reads a string argument at `position`, for use inside bound executables.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or is not a string.
    pub fn str_at(arguments: &[Value], position: usize) -> anyhow::Result<&str> {
        arguments
            .get(position)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("expected a string argument at position {position}"))
    }

    /// Reads an integer argument at `position`, for use inside bound executables.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or is not an integer.
    pub fn int_at(arguments: &[Value], position: usize) -> anyhow::Result<i64> {
        arguments
            .get(position)
            .and_then(Value::as_int)
            .ok_or_else(|| anyhow::anyhow!("expected an integer argument at position {position}"))
    }

    /// Reads a numeric argument at `position`, widening integers.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or is not numeric.
    pub fn float_at(arguments: &[Value], position: usize) -> anyhow::Result<f64> {
        arguments
            .get(position)
            .and_then(Value::as_float)
            .ok_or_else(|| anyhow::anyhow!("expected a numeric argument at position {position}"))
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
        Self::Int(i64::from(value))
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

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::from(i),
            Value::Float(f) => Self::from(f),
            Value::String(s) => Self::String(s),
            Value::Bytes(bytes) => Self::Array(bytes.into_iter().map(Self::from).collect()),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(entries) => Self::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// Declared parameter or result type of an operation.
///
/// `Void` is the "no argument" / "no result" sentinel so that matching is total.
/// `Number` and `Any` are widening types: a value of a narrower kind is
/// accepted where they are declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    #[default]
    Void,
    Bool,
    Int,
    Float,
    /// Accepts `Int` and `Float`.
    Number,
    String,
    Bytes,
    Array,
    Map,
    /// Accepts every non-null value.
    Any,
}

impl ValueType {
    #[must_use]
    pub fn is_void(self) -> bool {
        self == Self::Void
    }

    /// Whether a value of `value`'s runtime type may be passed where `self` is
    /// declared. `Null` is never accepted.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (Self::Any, _) => true,
            (Self::Number, v) => matches!(v, Value::Int(_) | Value::Float(_)),
            (declared, v) => v.kind() == Some(declared),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Array => "array",
            Self::Map => "map",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// InterfaceType / Instance
// ---------------------------------------------------------------------------

/// A type-erased pooled service instance.
///
/// Instances are produced by a pool's factory as a boxed facade
/// (`Box<I>`, usually `Box<dyn Trait>`) erased to `dyn Any`.
pub type Instance = Box<dyn Any + Send>;

/// Erases a boxed facade into an [`Instance`] compatible with
/// [`InterfaceType::of::<I>()`].
#[must_use]
pub fn into_instance<I: ?Sized + Send + 'static>(service: Box<I>) -> Instance {
    Box::new(service)
}

/// Runtime identity of the facade every instance of a service must implement.
///
/// Equality and hashing use the `TypeId`; the canonical name is the
/// `std::any::type_name` of the facade and doubles as a registry key.
#[derive(Clone, Copy)]
pub struct InterfaceType {
    name: &'static str,
    type_id: TypeId,
}

impl InterfaceType {
    /// Interface type for facade `I` (for example `dyn PeriodicTable`).
    #[must_use]
    pub fn of<I: ?Sized + 'static>() -> Self {
        Self {
            name: std::any::type_name::<I>(),
            type_id: TypeId::of::<Box<I>>(),
        }
    }

    /// Canonical name of the facade.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `instance` is a boxed implementation of this facade.
    #[must_use]
    pub fn accepts(&self, instance: &Instance) -> bool {
        (**instance).type_id() == self.type_id
    }
}

impl PartialEq for InterfaceType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for InterfaceType {}

impl std::hash::Hash for InterfaceType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InterfaceType").field(&self.name).finish()
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for InterfaceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
