//! Statement buffer plus the parameterized INSERT, UPDATE, DELETE for a schema's own table.

use crate::dialect::Dialect;
use crate::schema::Schema;
use crate::sql::SqlValue;

/// SQL text with its ordered bind values.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub dialect: Dialect,
}

impl QueryBuf {
    pub fn new(dialect: Dialect) -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            dialect,
        }
    }

    pub fn raw(dialect: Dialect, sql: impl Into<String>) -> Self {
        QueryBuf {
            sql: sql.into(),
            params: Vec::new(),
            dialect,
        }
    }

    /// Bind a value and return its placeholder text. NULL is never bound: the literal is returned.
    pub fn bind(&mut self, v: SqlValue) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        self.params.push(v);
        self.dialect.placeholder(self.params.len())
    }
}

/// `INSERT INTO t (c1, c2) VALUES (p1, p2)` over the given own-table columns.
pub fn insert(schema: &Schema, dialect: Dialect, values: &[(&str, SqlValue)]) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (col, v) in values {
        cols.push(dialect.quote(col));
        placeholders.push(q.bind(v.clone()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(&schema.table),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// `UPDATE t SET c1 = p1 WHERE pk = pn`. `None` when there is nothing to set.
pub fn update(
    schema: &Schema,
    dialect: Dialect,
    pk_column: &str,
    id: SqlValue,
    values: &[(&str, SqlValue)],
) -> Option<QueryBuf> {
    let mut q = QueryBuf::new(dialect);
    let sets: Vec<String> = values
        .iter()
        .filter(|(col, _)| *col != pk_column)
        .map(|(col, v)| format!("{} = {}", dialect.quote(col), q.bind(v.clone())))
        .collect();
    if sets.is_empty() {
        return None;
    }
    let id_ph = q.bind(id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        dialect.quote(&schema.table),
        sets.join(", "),
        dialect.quote(pk_column),
        id_ph
    );
    Some(q)
}

/// `DELETE FROM t WHERE pk = p1`.
pub fn delete(schema: &Schema, dialect: Dialect, pk_column: &str, id: SqlValue) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    let id_ph = q.bind(id);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        dialect.quote(&schema.table),
        dialect.quote(pk_column),
        id_ph
    );
    q
}
