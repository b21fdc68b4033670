//! Entity validation: unique keys and aliases, alias references, primary key.

use crate::error::SchemaError;
use crate::schema::resolved::{expr_aliases, Schema};
use std::collections::HashSet;

/// Check the invariants that only need the entity itself.
pub fn validate(schema: &Schema) -> Result<(), SchemaError> {
    if schema.name.trim().is_empty() {
        return Err(SchemaError::Validation("entity name must not be empty".into()));
    }
    if schema.table.trim().is_empty() {
        return Err(SchemaError::Validation(format!(
            "entity {} has no table",
            schema.name
        )));
    }
    if schema.version.trim().is_empty() {
        return Err(SchemaError::Validation(format!(
            "entity {} has no version",
            schema.name
        )));
    }

    let mut keys = HashSet::new();
    for f in &schema.fields {
        if f.key.is_empty() || !keys.insert(f.key.as_str()) {
            return Err(SchemaError::DuplicateKey {
                entity: schema.name.clone(),
                key: f.key.clone(),
            });
        }
    }
    for c in &schema.children {
        if !keys.insert(c.key.as_str()) {
            return Err(SchemaError::DuplicateKey {
                entity: schema.name.clone(),
                key: c.key.clone(),
            });
        }
    }

    let mut aliases: HashSet<&str> = HashSet::new();
    aliases.insert(schema.alias.as_str());
    for r in &schema.relations {
        if !aliases.insert(r.alias.as_str()) {
            return Err(SchemaError::DuplicateAlias {
                entity: schema.name.clone(),
                alias: r.alias.clone(),
            });
        }
    }

    let check = |expr: &str| -> Result<(), SchemaError> {
        for a in expr_aliases(expr) {
            if !aliases.contains(a.as_str()) {
                return Err(SchemaError::UnknownAlias {
                    entity: schema.name.clone(),
                    expr: expr.to_string(),
                    alias: a,
                });
            }
        }
        Ok(())
    };
    for f in &schema.fields {
        check(&f.db)?;
    }
    for r in &schema.relations {
        for c in &r.conditions {
            check(&c.column)?;
            if let crate::schema::resolved::Operand::Column(rhs) = &c.operand {
                check(rhs)?;
            }
        }
    }
    for c in &schema.filters {
        check(&c.column)?;
    }
    for s in &schema.sorts {
        check(&s.db)?;
    }
    for g in &schema.groups {
        check(g)?;
    }

    if schema.primary_column().is_none() {
        return Err(SchemaError::InvalidPrimaryKey {
            entity: schema.name.clone(),
            key: schema.primary_key.clone(),
        });
    }
    Ok(())
}
