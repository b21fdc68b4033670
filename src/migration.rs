//! Table DDL from schemas, and rebuilds of tables whose schema version changed.
//! Rebuilding drops the table: data in a stale table is lost.

use crate::dialect::Dialect;
use crate::error::AppError;
use crate::nullable::ScalarType;
use crate::schema::{Registry, Schema};
use crate::service::SqlExecutor;
use crate::sql::{QueryBuf, SqlValue};
use std::collections::HashMap;

const VERSIONS_TABLE: &str = "_schema_versions";

/// `CREATE TABLE` over the schema's own-table columns.
pub fn create_table_sql(schema: &Schema, dialect: Dialect) -> String {
    let pk_column = schema.primary_column();
    let mut defs: Vec<String> = Vec::new();
    for (col, field) in schema.own_columns() {
        if defs.iter().any(|d| d.starts_with(&format!("{} ", dialect.quote(col)))) {
            continue;
        }
        let mut def = format!("{} {}", dialect.quote(col), field.ty.column_type(dialect));
        if Some(col) == pk_column {
            def.push_str(" NOT NULL");
            if field.ty == ScalarType::Uuid {
                def.push_str(" DEFAULT ");
                def.push_str(dialect.uuid_default());
            }
        }
        defs.push(def);
    }
    if let Some(pk) = pk_column {
        defs.push(format!("PRIMARY KEY ({})", dialect.quote(pk)));
    }
    let mut sql = format!(
        "CREATE TABLE {} ({})",
        dialect.quote(&schema.table),
        defs.join(", ")
    );
    if dialect == Dialect::Clickhouse {
        sql.push_str(" ENGINE = MergeTree()");
        if let Some(pk) = pk_column {
            sql.push_str(&format!(" ORDER BY {}", dialect.quote(pk)));
        }
    }
    sql
}

fn drop_table_sql(table: &str, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.quote(table))
}

fn versions_table_sql(dialect: Dialect) -> String {
    let text = ScalarType::String.column_type(dialect);
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL PRIMARY KEY, {} {} NOT NULL)",
        dialect.quote(VERSIONS_TABLE),
        dialect.quote("name"),
        text,
        dialect.quote("version"),
        text
    )
}

/// Recreate every table whose stamped version differs from its schema's version.
/// Entities that read through another table (same table, different alias) are rebuilt once.
/// Returns the rebuilt entity names.
pub async fn rebuild_stale(
    executor: &dyn SqlExecutor,
    registry: &Registry,
) -> Result<Vec<String>, AppError> {
    let dialect = executor.dialect();
    executor
        .execute(&QueryBuf::raw(dialect, versions_table_sql(dialect)))
        .await?;

    let select = QueryBuf::raw(
        dialect,
        format!(
            "SELECT {}, {} FROM {}",
            dialect.quote("name"),
            dialect.quote("version"),
            dialect.quote(VERSIONS_TABLE)
        ),
    );
    let stamped: HashMap<String, String> = executor
        .fetch_all(&select)
        .await?
        .into_iter()
        .filter_map(|row| {
            let name = row.get("name")?.as_str()?.to_string();
            let version = row.get("version")?.as_str()?.to_string();
            Some((name, version))
        })
        .collect();

    let mut rebuilt = Vec::new();
    let mut tables_done: Vec<String> = Vec::new();
    for schema in registry.sorted() {
        if stamped.get(&schema.name) == Some(&schema.version) {
            continue;
        }
        if schema.own_columns().next().is_none() || tables_done.contains(&schema.table) {
            continue;
        }
        tracing::info!(
            entity = %schema.name,
            from = stamped.get(&schema.name).map(String::as_str).unwrap_or("none"),
            to = %schema.version,
            "rebuilding table"
        );
        executor
            .execute(&QueryBuf::raw(dialect, drop_table_sql(&schema.table, dialect)))
            .await?;
        executor
            .execute(&QueryBuf::raw(dialect, create_table_sql(&schema, dialect)))
            .await?;
        stamp(executor, dialect, &schema.name, &schema.version).await?;
        tables_done.push(schema.table.clone());
        rebuilt.push(schema.name.clone());
    }
    Ok(rebuilt)
}

async fn stamp(
    executor: &dyn SqlExecutor,
    dialect: Dialect,
    name: &str,
    version: &str,
) -> Result<(), AppError> {
    let mut del = QueryBuf::new(dialect);
    let ph = del.bind(SqlValue::from(name));
    del.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        dialect.quote(VERSIONS_TABLE),
        dialect.quote("name"),
        ph
    );
    executor.execute(&del).await?;

    let mut ins = QueryBuf::new(dialect);
    let name_ph = ins.bind(SqlValue::from(name));
    let version_ph = ins.bind(SqlValue::from(version));
    ins.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {})",
        dialect.quote(VERSIONS_TABLE),
        dialect.quote("name"),
        dialect.quote("version"),
        name_ph,
        version_ph
    );
    executor.execute(&ins).await?;
    Ok(())
}
