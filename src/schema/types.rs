//! Raw entity descriptors as written in JSON entity files or produced from record descriptors.

use crate::nullable::ScalarType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_primary_key() -> String {
    "id".into()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    /// Table alias used in every SQL expression of this entity. Defaults to the table name.
    #[serde(default)]
    pub alias: String,
    pub version: String,
    /// Output key of the primary-key field.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Respond with flat (dot-key) rows instead of structured documents.
    #[serde(default)]
    pub flat: bool,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Static WHERE clauses applied to every read.
    #[serde(default)]
    pub filters: Vec<ClauseConfig>,
    #[serde(default)]
    pub sorts: Vec<SortConfig>,
    /// Extra GROUP BY expressions.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub children: Vec<ChildConfig>,
}

impl EntityConfig {
    pub fn new(name: &str, table: &str, alias: &str, version: &str) -> Self {
        EntityConfig {
            name: name.into(),
            table: table.into(),
            alias: alias.into(),
            version: version.into(),
            primary_key: default_primary_key(),
            ..Default::default()
        }
    }
}

/// One field as annotated: `json` is the output-name annotation (first comma component is the
/// output key), `db` the data-source annotation with optional trailing `hide` / `group` flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(alias = "as")]
    pub json: String,
    pub db: String,
    #[serde(rename = "type", default)]
    pub type_: ScalarType,
    /// Constraint annotation, e.g. `required,min=1,max=80,oneof=draft published`.
    #[serde(default)]
    pub validate: Option<String>,
}

impl FieldConfig {
    pub fn new(json: &str, db: &str, type_: ScalarType) -> Self {
        FieldConfig {
            json: json.into(),
            db: db.into(),
            type_,
            validate: None,
        }
    }

    pub fn validate(mut self, rules: &str) -> Self {
        self.validate = Some(rules.into());
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// Join to a table (`table`) or to another registered entity compiled as a derived subquery (`schema`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    #[serde(rename = "type", default)]
    pub kind: JoinKind,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub conditions: Vec<ClauseConfig>,
}

/// Comparison operators shared by static clauses and query-string filters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Nlike,
    Nilike,
    In,
    Nin,
    Regexp,
    Nregexp,
}

impl Operator {
    /// Parse the query-string form, e.g. `$gte`.
    pub fn from_param(s: &str) -> Option<Self> {
        Some(match s {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$like" => Operator::Like,
            "$ilike" => Operator::Ilike,
            "$nlike" => Operator::Nlike,
            "$nilike" => Operator::Nilike,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            "$regexp" => Operator::Regexp,
            "$nregexp" => Operator::Nregexp,
            _ => return None,
        })
    }

    pub fn is_like(self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::Ilike | Operator::Nlike | Operator::Nilike
        )
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(self, Operator::Ilike | Operator::Nilike)
    }
}

/// `column <op> value` or `column <op> ref`. A null value with `eq`/`ne` renders `IS [NOT] NULL`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClauseConfig {
    pub column: String,
    #[serde(default)]
    pub op: Operator,
    #[serde(default)]
    pub value: Value,
    /// Column expression on the right-hand side instead of a bound value.
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl ClauseConfig {
    pub fn is_null(column: &str) -> Self {
        ClauseConfig {
            column: column.into(),
            op: Operator::Eq,
            value: Value::Null,
            reference: None,
        }
    }

    pub fn column_eq(column: &str, reference: &str) -> Self {
        ClauseConfig {
            column: column.into(),
            op: Operator::Eq,
            value: Value::Null,
            reference: Some(reference.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortConfig {
    pub column: String,
    #[serde(default)]
    pub desc: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    /// Kept (with highest priority) even when the request supplies `$sort`.
    #[serde(default)]
    pub required: bool,
}

/// Array child: `key` holds the rows of `entity` selected by the `filter` template,
/// where `{key}` placeholders take the parent row's values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildConfig {
    pub key: String,
    pub entity: String,
    pub filter: String,
}
