//! Null-aware scalars shared by SQL rows, JSON payloads and query parameters.
//!
//! A [`Nullable<T>`] is `(valid, payload)`: the payload is only meaningful when valid.
//! Invalid values marshal to JSON `null` and to SQL `NULL`. Unmarshalling is permissive:
//! string forms of the payload type are accepted and anything unparseable yields an
//! invalid value instead of an error. Only SQL scanning reports explicit type mismatches.

mod payload;
mod scalar;

pub use payload::{Payload, Text, UnixTime};
pub(crate) use payload::parse_bool;
pub use scalar::ScalarType;

use crate::sql::SqlValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("cannot scan {found} into {target:?}")]
pub struct ScanError {
    pub target: ScalarType,
    pub found: &'static str,
}

impl ScanError {
    pub(crate) fn new(target: ScalarType, found: &SqlValue) -> Self {
        ScanError {
            target,
            found: found.kind(),
        }
    }
}

/// Populate a value from a driver value.
pub trait Scan: Sized {
    fn scan(src: SqlValue) -> Result<Self, ScanError>;
}

/// Produce the driver value to bind.
pub trait Valuer {
    fn value(&self) -> SqlValue;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Nullable<T>(Option<T>);

pub type NullBool = Nullable<bool>;
pub type NullInt = Nullable<i64>;
pub type NullFloat = Nullable<f64>;
pub type NullString = Nullable<String>;
pub type NullText = Nullable<Text>;
pub type NullDateTime = Nullable<chrono::DateTime<chrono::Utc>>;
pub type NullDate = Nullable<chrono::NaiveDate>;
pub type NullTime = Nullable<chrono::NaiveTime>;
pub type NullJson = Nullable<Value>;
pub type NullUuid = Nullable<uuid::Uuid>;
pub type NullUnixTime = Nullable<UnixTime>;

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Nullable(None)
    }
}

impl<T> Nullable<T> {
    pub const fn null() -> Self {
        Nullable(None)
    }

    pub fn new(x: T) -> Self {
        Nullable(Some(x))
    }

    pub fn set(&mut self, x: T) {
        self.0 = Some(x);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }
}

impl<T: Payload> Nullable<T> {
    /// Payload, or the payload type's default when invalid.
    pub fn val(&self) -> T
    where
        T: Default,
    {
        self.0.clone().unwrap_or_default()
    }

    /// Omit-empty predicate: invalid, or (for timestamps) the epoch.
    pub fn is_zero(&self) -> bool {
        match &self.0 {
            None => true,
            Some(v) => v.is_zero(),
        }
    }

    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => Nullable(None),
            v => Nullable(T::from_json(v)),
        }
    }

    pub fn to_json(&self) -> Value {
        match &self.0 {
            Some(v) => v.to_json(),
            None => Value::Null,
        }
    }

    /// Plain-text form; invalid values render as the empty string.
    pub fn marshal_text(&self) -> String {
        match &self.0 {
            Some(v) => v.to_text(),
            None => String::new(),
        }
    }

    /// Parse a plain-text form. Empty input and `null` (any case) are invalid.
    pub fn unmarshal_text(s: &str) -> Self {
        if s.is_empty() || s.eq_ignore_ascii_case("null") {
            return Nullable(None);
        }
        Nullable(T::parse_text(s))
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(x: Option<T>) -> Self {
        Nullable(x)
    }
}

impl<T: Payload> Scan for Nullable<T> {
    fn scan(src: SqlValue) -> Result<Self, ScanError> {
        match src {
            SqlValue::Null => Ok(Nullable(None)),
            src => T::scan(src).map(|v| Nullable(Some(v))),
        }
    }
}

impl<T: Payload> Valuer for Nullable<T> {
    fn value(&self) -> SqlValue {
        match &self.0 {
            Some(v) => v.to_sql(),
            None => SqlValue::Null,
        }
    }
}

impl<T: Payload> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de, T: Payload> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(Nullable::from_json(&v))
    }
}
