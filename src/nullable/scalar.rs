//! Runtime tag for the nullable scalar variants, used where the payload type is only
//! known from a schema (query parameters, dynamic payloads, DDL).

use super::{Nullable, Payload, ScanError, Scan, Text, UnixTime, Valuer};
use crate::dialect::Dialect;
use crate::sql::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    #[default]
    String,
    Text,
    Timestamp,
    Date,
    Time,
    Json,
    Uuid,
    #[serde(rename = "unixtime")]
    UnixTime,
}

/// Run `$body` with `$t` bound to the payload type of `$ty`.
macro_rules! with_payload {
    ($ty:expr, $t:ident => $body:expr) => {
        match $ty {
            ScalarType::Bool => {
                type $t = bool;
                $body
            }
            ScalarType::Int => {
                type $t = i64;
                $body
            }
            ScalarType::Float => {
                type $t = f64;
                $body
            }
            ScalarType::String => {
                type $t = String;
                $body
            }
            ScalarType::Text => {
                type $t = Text;
                $body
            }
            ScalarType::Timestamp => {
                type $t = DateTime<Utc>;
                $body
            }
            ScalarType::Date => {
                type $t = NaiveDate;
                $body
            }
            ScalarType::Time => {
                type $t = NaiveTime;
                $body
            }
            ScalarType::Json => {
                type $t = Value;
                $body
            }
            ScalarType::Uuid => {
                type $t = uuid::Uuid;
                $body
            }
            ScalarType::UnixTime => {
                type $t = UnixTime;
                $body
            }
        }
    };
}

impl ScalarType {
    /// Permissive JSON coercion; unparseable input becomes `null`.
    pub fn coerce_json(self, v: &Value) -> Value {
        with_payload!(self, P => Nullable::<P>::from_json(v).to_json())
    }

    /// Coerce a JSON value into the driver value to bind.
    pub fn to_sql(self, v: &Value) -> SqlValue {
        with_payload!(self, P => Nullable::<P>::from_json(v).value())
    }

    /// Parse a query-string value. `None` when the text is not a valid payload.
    pub fn parse_param(self, s: &str) -> Option<SqlValue> {
        with_payload!(self, P => <P as Payload>::parse_text(s).map(|p| p.to_sql()))
    }

    /// Scan a driver value into its JSON form.
    pub fn scan_json(self, v: SqlValue) -> Result<Value, ScanError> {
        with_payload!(self, P => Nullable::<P>::scan(v).map(|n| n.to_json()))
    }

    pub fn column_type(self, dialect: Dialect) -> &'static str {
        use Dialect::*;
        match (self, dialect) {
            (ScalarType::Bool, Postgres | Firebird) => "BOOLEAN",
            (ScalarType::Bool, Mysql) => "TINYINT(1)",
            (ScalarType::Bool, Sqlite) => "INTEGER",
            (ScalarType::Bool, Sqlserver) => "BIT",
            (ScalarType::Bool, Clickhouse) => "Bool",

            (ScalarType::Int, Sqlite) => "INTEGER",
            (ScalarType::Int, Clickhouse) => "Int64",
            (ScalarType::Int, _) => "BIGINT",

            (ScalarType::Float, Postgres | Firebird) => "DOUBLE PRECISION",
            (ScalarType::Float, Mysql) => "DOUBLE",
            (ScalarType::Float, Sqlite) => "REAL",
            (ScalarType::Float, Sqlserver) => "FLOAT",
            (ScalarType::Float, Clickhouse) => "Float64",

            (ScalarType::String, Sqlite) => "TEXT",
            (ScalarType::String, Sqlserver) => "NVARCHAR(255)",
            (ScalarType::String, Clickhouse) => "String",
            (ScalarType::String, _) => "VARCHAR(255)",

            (ScalarType::Text, Sqlserver) => "NVARCHAR(MAX)",
            (ScalarType::Text, Firebird) => "BLOB SUB_TYPE TEXT",
            (ScalarType::Text, Clickhouse) => "String",
            (ScalarType::Text, _) => "TEXT",

            (ScalarType::Timestamp, Postgres) => "TIMESTAMPTZ",
            (ScalarType::Timestamp, Mysql) => "DATETIME",
            (ScalarType::Timestamp, Sqlite) => "TEXT",
            (ScalarType::Timestamp, Sqlserver) => "DATETIMEOFFSET",
            (ScalarType::Timestamp, Firebird) => "TIMESTAMP",
            (ScalarType::Timestamp, Clickhouse) => "DateTime",

            (ScalarType::Date, Sqlite) => "TEXT",
            (ScalarType::Date, Clickhouse) => "Date",
            (ScalarType::Date, _) => "DATE",

            (ScalarType::Time, Sqlite) => "TEXT",
            (ScalarType::Time, Clickhouse) => "String",
            (ScalarType::Time, _) => "TIME",

            (ScalarType::Json, Postgres) => "JSONB",
            (ScalarType::Json, Mysql | Sqlite) => "JSON",
            (ScalarType::Json, Sqlserver) => "NVARCHAR(MAX)",
            (ScalarType::Json, Firebird) => "BLOB SUB_TYPE TEXT",
            (ScalarType::Json, Clickhouse) => "String",

            (ScalarType::Uuid, Postgres) => "uuid",
            (ScalarType::Uuid, Clickhouse) => "UUID",
            (ScalarType::Uuid, _) => "char(36)",

            (ScalarType::UnixTime, Postgres) => "bigint",
            (ScalarType::UnixTime, Mysql) => "BIGINT",
            (ScalarType::UnixTime, Clickhouse) => "Int64",
            (ScalarType::UnixTime, _) => "INTEGER",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown scalar type: {0}")]
pub struct UnknownScalarType(pub String);

impl FromStr for ScalarType {
    type Err = UnknownScalarType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => ScalarType::Bool,
            "int" | "integer" | "int64" | "bigint" => ScalarType::Int,
            "float" | "float64" | "number" | "double" => ScalarType::Float,
            "string" | "varchar" => ScalarType::String,
            "text" => ScalarType::Text,
            "timestamp" | "datetime" => ScalarType::Timestamp,
            "date" => ScalarType::Date,
            "time" => ScalarType::Time,
            "json" | "jsonb" => ScalarType::Json,
            "uuid" => ScalarType::Uuid,
            "unixtime" => ScalarType::UnixTime,
            _ => return Err(UnknownScalarType(s.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_types_per_dialect() {
        assert_eq!(ScalarType::Date.column_type(Dialect::Sqlite), "TEXT");
        assert_eq!(ScalarType::Text.column_type(Dialect::Sqlserver), "NVARCHAR(MAX)");
        assert_eq!(ScalarType::Json.column_type(Dialect::Postgres), "JSONB");
        assert_eq!(ScalarType::Json.column_type(Dialect::Firebird), "BLOB SUB_TYPE TEXT");
        assert_eq!(ScalarType::Uuid.column_type(Dialect::Mysql), "char(36)");
        assert_eq!(ScalarType::UnixTime.column_type(Dialect::Postgres), "bigint");
        assert_eq!(ScalarType::UnixTime.column_type(Dialect::Sqlserver), "INTEGER");
    }

    #[test]
    fn clickhouse_column_types() {
        let ch = Dialect::Clickhouse;
        assert_eq!(ScalarType::Date.column_type(ch), "Date");
        assert_eq!(ScalarType::Time.column_type(ch), "String");
        assert_eq!(ScalarType::Text.column_type(ch), "String");
        assert_eq!(ScalarType::Json.column_type(ch), "String");
        assert_eq!(ScalarType::Uuid.column_type(ch), "UUID");
        assert_eq!(ScalarType::UnixTime.column_type(ch), "Int64");
    }

    #[test]
    fn dynamic_coercion() {
        assert_eq!(ScalarType::Bool.coerce_json(&json!("1")), json!(true));
        assert_eq!(ScalarType::Bool.coerce_json(&json!("maybe")), Value::Null);
        assert_eq!(ScalarType::Int.to_sql(&json!("5")), SqlValue::Int(5));
        assert_eq!(ScalarType::Bool.parse_param("true"), Some(SqlValue::Bool(true)));
        assert_eq!(ScalarType::Int.parse_param("x"), None);
    }

    #[test]
    fn names_round_trip_through_serde() {
        let t: ScalarType = serde_json::from_str("\"unixtime\"").unwrap();
        assert_eq!(t, ScalarType::UnixTime);
        assert_eq!("boolean".parse::<ScalarType>().unwrap(), ScalarType::Bool);
    }
}
