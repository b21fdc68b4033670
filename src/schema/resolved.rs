//! Resolved schema model: entity configs validated and flattened for runtime use.

use crate::dialect::Dialect;
use crate::nullable::ScalarType;
use crate::schema::types::{JoinKind, Operator};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Constraints parsed from a field's `validate` annotation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    pub required: bool,
    pub one_of: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    /// Output key, possibly dotted (`author.name`).
    pub key: String,
    /// SQL expression producing the value.
    pub db: String,
    pub ty: ScalarType,
    /// Omitted from responses; still usable as a filter.
    pub hidden: bool,
    /// Added to GROUP BY.
    pub group: bool,
    pub constraints: Constraints,
}

impl Field {
    /// Column name when `db` is a plain `alias.column` on `alias`.
    pub fn column_of(&self, alias: &str) -> Option<&str> {
        let (a, col) = self.db.split_once('.')?;
        (a == alias && is_ident(col)).then_some(col)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RelationSource {
    Table(String),
    /// Another registered entity, compiled as a derived subquery.
    Schema(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub op: Operator,
    pub operand: Operand,
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub kind: JoinKind,
    pub source: RelationSource,
    pub alias: String,
    pub conditions: Vec<WhereClause>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub db: String,
    pub desc: bool,
    pub case_insensitive: bool,
    pub required: bool,
}

#[derive(Clone, Debug)]
pub struct ArrayField {
    pub key: String,
    pub entity: String,
    /// Query-string template, `{key}` placeholders take parent row values.
    pub filter: String,
}

impl ArrayField {
    /// Parent keys referenced by `{key}` placeholders, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let Some(re) = placeholder_re() else {
            return Vec::new();
        };
        re.captures_iter(&self.filter)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: String,
    pub table: String,
    pub alias: String,
    pub version: String,
    pub primary_key: String,
    pub flat: bool,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    pub filters: Vec<WhereClause>,
    pub sorts: Vec<Sort>,
    pub groups: Vec<String>,
    pub children: Vec<ArrayField>,
    array_fields: OnceLock<HashMap<String, usize>>,
}

impl Schema {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        table: String,
        alias: String,
        version: String,
        primary_key: String,
        flat: bool,
        fields: Vec<Field>,
        relations: Vec<Relation>,
        filters: Vec<WhereClause>,
        sorts: Vec<Sort>,
        groups: Vec<String>,
        children: Vec<ArrayField>,
    ) -> Self {
        Schema {
            name,
            table,
            alias,
            version,
            primary_key,
            flat,
            fields,
            relations,
            filters,
            sorts,
            groups,
            children,
            array_fields: OnceLock::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn primary_field(&self) -> Option<&Field> {
        self.field(&self.primary_key)
    }

    pub fn relation(&self, alias: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.alias == alias)
    }

    /// Array children keyed by output key; built on first use.
    pub fn array_field(&self, key: &str) -> Option<&ArrayField> {
        let index = self.array_fields.get_or_init(|| {
            self.children
                .iter()
                .enumerate()
                .map(|(i, c)| (c.key.clone(), i))
                .collect()
        });
        index.get(key).map(|&i| &self.children[i])
    }

    /// Fields stored in this entity's own table, with their column names.
    pub fn own_columns(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields
            .iter()
            .filter_map(|f| f.column_of(&self.alias).map(|c| (c, f)))
    }

    pub fn primary_column(&self) -> Option<&str> {
        self.primary_field().and_then(|f| f.column_of(&self.alias))
    }
}

/// All validated schemas, keyed by entity name.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) schemas: HashMap<String, Arc<Schema>>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    /// Schemas sorted by name, for deterministic iteration.
    pub fn sorted(&self) -> Vec<Arc<Schema>> {
        let mut all: Vec<_> = self.schemas.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"\{([A-Za-z_][\w.]*)\}")
}

fn alias_ref_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"\b([A-Za-z_]\w*)\.[A-Za-z_]\w*")
}

fn quoted_literal_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"'(?:[^']|'')*'")
}

fn path_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"^[A-Za-z_]\w*(\.[A-Za-z_]\w*)?$")
}

pub(crate) fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table aliases referenced by a SQL expression (`u.name`, `COALESCE(a.x, b.y)`).
/// String literals are ignored.
pub fn expr_aliases(expr: &str) -> Vec<String> {
    let (Some(literal), Some(alias)) = (quoted_literal_re(), alias_ref_re()) else {
        return Vec::new();
    };
    let stripped = literal.replace_all(expr, "''");
    let mut out: Vec<String> = Vec::new();
    for c in alias.captures_iter(&stripped) {
        let a = &c[1];
        if !out.iter().any(|x| x == a) {
            out.push(a.to_string());
        }
    }
    out
}

/// Quote a plain `alias.column` or `column`; anything else is emitted as written.
pub fn render_expr(expr: &str, dialect: Dialect) -> String {
    if path_re().is_some_and(|re| re.is_match(expr)) {
        dialect.quote_path(expr)
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_in_expressions() {
        assert_eq!(expr_aliases("u.name"), vec!["u"]);
        assert_eq!(expr_aliases("COALESCE(a.title, b.title)"), vec!["a", "b"]);
        assert_eq!(expr_aliases("CONCAT(u.first, 'x.y', u.last)"), vec!["u"]);
        assert!(expr_aliases("COUNT(*)").is_empty());
        assert!(expr_aliases("1.5").is_empty());
    }

    #[test]
    fn renders_plain_paths_quoted() {
        assert_eq!(render_expr("a.title", Dialect::Postgres), "\"a\".\"title\"");
        assert_eq!(render_expr("a.title", Dialect::Mysql), "`a`.`title`");
        assert_eq!(render_expr("LOWER(a.title)", Dialect::Postgres), "LOWER(a.title)");
    }

    #[test]
    fn expression_patterns_compile() {
        assert!(placeholder_re().is_some());
        assert!(alias_ref_re().is_some());
        assert!(quoted_literal_re().is_some());
        assert!(path_re().is_some());
    }

    #[test]
    fn template_placeholders() {
        let child = ArrayField {
            key: "comments".into(),
            entity: "comments".into(),
            filter: "article_id={id}&author={author.id}".into(),
        };
        assert_eq!(child.placeholders(), vec!["id", "author.id"]);
    }
}
