//! Payload types carried by `Nullable<T>` and their coercion rules.

use super::{ScalarType, ScanError};
use crate::sql::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::fmt::Debug;
use uuid::Uuid;

/// Conversions for one payload type. `from_json` and `parse_text` return `None`
/// for inputs that cannot be coerced; `scan` errors only on explicit mismatches.
pub trait Payload: Clone + PartialEq + Debug + Send + Sync + 'static {
    const TYPE: ScalarType;

    fn from_json(v: &Value) -> Option<Self>;
    fn to_json(&self) -> Value;
    fn parse_text(s: &str) -> Option<Self>;
    fn to_text(&self) -> String;
    fn scan(v: SqlValue) -> Result<Self, ScanError>;
    fn to_sql(&self) -> SqlValue;

    fn is_zero(&self) -> bool {
        false
    }
}

/// Long text column; behaves like `String` but maps to the dialect's unbounded text type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Text(pub String);

/// Timestamp stored and marshalled as integer seconds since the epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTime(pub i64);

impl UnixTime {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0, 0).single()
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Some(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|t| t.date_naive()))
}

pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn bytes_text(b: &[u8]) -> Option<&str> {
    std::str::from_utf8(b).ok()
}

/// Scan a text-like driver value through `parse`, mismatching otherwise.
fn scan_textual<T>(
    v: &SqlValue,
    target: ScalarType,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ScanError> {
    let parsed = match v {
        SqlValue::Text(s) => parse(s),
        SqlValue::Bytes(b) => bytes_text(b).and_then(&parse),
        _ => None,
    };
    parsed.ok_or_else(|| ScanError::new(target, v))
}

impl Payload for bool {
    const TYPE: ScalarType = ScalarType::Bool;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_bool(s),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    fn parse_text(s: &str) -> Option<Self> {
        parse_bool(s)
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(i) => Ok(i != 0),
            v => scan_textual(&v, Self::TYPE, parse_bool),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }
}

impl Payload for i64 {
    const TYPE: ScalarType = ScalarType::Int;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => Self::parse_text(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::Number((*self).into())
    }

    fn parse_text(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Int(i) => Ok(i),
            SqlValue::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            v => scan_textual(&v, Self::TYPE, Self::parse_text),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(*self)
    }
}

impl Payload for f64 {
    const TYPE: ScalarType = ScalarType::Float;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => Self::parse_text(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        serde_json::Number::from_f64(*self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    fn parse_text(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Float(f) => Ok(f),
            SqlValue::Int(i) => Ok(i as f64),
            v => scan_textual(&v, Self::TYPE, Self::parse_text),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Float(*self)
    }
}

fn string_from_json(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(v.to_string()),
        _ => None,
    }
}

fn string_scan(v: SqlValue) -> Result<String, ScanError> {
    Ok(match v {
        SqlValue::Text(s) => s,
        SqlValue::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        SqlValue::Json(Value::String(s)) => s,
        other => other.to_text(),
    })
}

impl Payload for String {
    const TYPE: ScalarType = ScalarType::String;

    fn from_json(v: &Value) -> Option<Self> {
        string_from_json(v)
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }

    fn parse_text(s: &str) -> Option<Self> {
        Some(s.to_string())
    }

    fn to_text(&self) -> String {
        self.clone()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        string_scan(v)
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl Payload for Text {
    const TYPE: ScalarType = ScalarType::Text;

    fn from_json(v: &Value) -> Option<Self> {
        string_from_json(v).map(Text)
    }

    fn to_json(&self) -> Value {
        Value::String(self.0.clone())
    }

    fn parse_text(s: &str) -> Option<Self> {
        Some(Text(s.to_string()))
    }

    fn to_text(&self) -> String {
        self.0.clone()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        string_scan(v).map(Text)
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl Payload for DateTime<Utc> {
    const TYPE: ScalarType = ScalarType::Timestamp;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_text())
    }

    fn parse_text(s: &str) -> Option<Self> {
        parse_timestamp(s)
    }

    fn to_text(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Timestamp(t) => Ok(t),
            SqlValue::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|t| t.and_utc())
                .ok_or_else(|| ScanError::new(Self::TYPE, &SqlValue::Date(d))),
            SqlValue::Int(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| ScanError::new(Self::TYPE, &SqlValue::Int(secs))),
            v => scan_textual(&v, Self::TYPE, parse_timestamp),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Timestamp(*self)
    }

    fn is_zero(&self) -> bool {
        self.timestamp() == 0 && self.timestamp_subsec_nanos() == 0
    }
}

impl Payload for NaiveDate {
    const TYPE: ScalarType = ScalarType::Date;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => parse_date(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_text())
    }

    fn parse_text(s: &str) -> Option<Self> {
        parse_date(s)
    }

    fn to_text(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Date(d) => Ok(d),
            SqlValue::Timestamp(t) => Ok(t.date_naive()),
            v => scan_textual(&v, Self::TYPE, parse_date),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Date(*self)
    }
}

impl Payload for NaiveTime {
    const TYPE: ScalarType = ScalarType::Time;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => parse_time(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_text())
    }

    fn parse_text(s: &str) -> Option<Self> {
        parse_time(s)
    }

    fn to_text(&self) -> String {
        self.format("%H:%M:%S%.f").to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Time(t) => Ok(t),
            SqlValue::Timestamp(t) => Ok(t.time()),
            v => scan_textual(&v, Self::TYPE, parse_time),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Time(*self)
    }
}

impl Payload for Value {
    const TYPE: ScalarType = ScalarType::Json;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Null => None,
            v => Some(v.clone()),
        }
    }

    fn to_json(&self) -> Value {
        self.clone()
    }

    fn parse_text(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Json(j) => Ok(j),
            SqlValue::Text(_) | SqlValue::Bytes(_) => {
                scan_textual(&v, Self::TYPE, |s| serde_json::from_str(s).ok())
            }
            other => Ok(other.to_json()),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Json(self.clone())
    }
}

impl Payload for Uuid {
    const TYPE: ScalarType = ScalarType::Uuid;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => Self::parse_text(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }

    fn parse_text(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Uuid(u) => Ok(u),
            v => scan_textual(&v, Self::TYPE, Self::parse_text),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Uuid(*self)
    }
}

impl Payload for UnixTime {
    const TYPE: ScalarType = ScalarType::UnixTime;

    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().map(UnixTime),
            Value::String(s) => Self::parse_text(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::Number(self.0.into())
    }

    fn parse_text(s: &str) -> Option<Self> {
        let s = s.trim();
        s.parse()
            .ok()
            .map(UnixTime)
            .or_else(|| parse_timestamp(s).map(|t| UnixTime(t.timestamp())))
    }

    fn to_text(&self) -> String {
        self.0.to_string()
    }

    fn scan(v: SqlValue) -> Result<Self, ScanError> {
        match v {
            SqlValue::Int(i) => Ok(UnixTime(i)),
            SqlValue::Timestamp(t) => Ok(UnixTime(t.timestamp())),
            v => scan_textual(&v, Self::TYPE, Self::parse_text),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(self.0)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_symbols() {
        for s in ["1", "t", "T", "true", "True", "TRUE"] {
            assert_eq!(parse_bool(s), Some(true), "{s}");
        }
        for s in ["0", "f", "F", "false", "False", "FALSE"] {
            assert_eq!(parse_bool(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn timestamp_formats() {
        let want = Utc.with_ymd_and_hms(2024, 1, 2, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T10:30:00Z"), Some(want));
        assert_eq!(parse_timestamp("2024-01-02 10:30:00"), Some(want));
        assert_eq!(parse_timestamp("2024-01-02T17:30:00+07:00"), Some(want));
        assert!(parse_timestamp("2024-01-02").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn int_scan_rejects_mismatch() {
        assert_eq!(i64::scan(SqlValue::Text("12".into())), Ok(12));
        assert!(i64::scan(SqlValue::Text("twelve".into())).is_err());
        assert!(i64::scan(SqlValue::Bool(true)).is_err());
    }

    #[test]
    fn json_scan_parses_text() {
        let v = Value::scan(SqlValue::Bytes(br#"{"a":1}"#.to_vec())).unwrap();
        assert_eq!(v, serde_json::json!({"a": 1}));
        assert!(Value::scan(SqlValue::Text("{oops".into())).is_err());
    }
}
