//! Build the registry from entity configs, in code or from a directory of JSON files.

use crate::error::SchemaError;
use crate::schema::record::{describe, output_key, Record};
use crate::schema::resolved::{
    ArrayField, Constraints, Field, Operand, Registry, Relation, RelationSource, Schema, Sort,
    WhereClause,
};
use crate::schema::types::*;
use crate::schema::validator::validate;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Split a `db` annotation into the expression and its trailing `hide` / `group` flags.
/// Commas inside the expression (function arguments) are preserved.
pub fn parse_db_annotation(raw: &str) -> (String, bool, bool) {
    let mut parts: Vec<&str> = raw.split(',').collect();
    let (mut hidden, mut group) = (false, false);
    while parts.len() > 1 {
        match parts.last().map(|p| p.trim()) {
            Some("hide") => hidden = true,
            Some("group") => group = true,
            _ => break,
        }
        parts.pop();
    }
    (parts.join(",").trim().to_string(), hidden, group)
}

/// Parse `required,oneof=a b,min=1,max=10`. Unknown rules are ignored.
pub fn parse_constraints(raw: &str) -> Result<Constraints, SchemaError> {
    let mut c = Constraints::default();
    for rule in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        let (name, arg) = rule.split_once('=').unwrap_or((rule, ""));
        let number = |arg: &str| {
            arg.trim()
                .parse::<f64>()
                .map_err(|_| SchemaError::Validation(format!("invalid constraint '{}'", rule)))
        };
        match name.trim() {
            "required" => c.required = true,
            "oneof" => c.one_of = arg.split_whitespace().map(String::from).collect(),
            "min" => c.min = Some(number(arg)?),
            "max" => c.max = Some(number(arg)?),
            _ => {}
        }
    }
    Ok(c)
}

fn resolve_clause(c: &ClauseConfig) -> WhereClause {
    WhereClause {
        column: c.column.clone(),
        op: c.op,
        operand: match &c.reference {
            Some(r) => Operand::Column(r.clone()),
            None => Operand::Value(c.value.clone()),
        },
    }
}

/// Build the runtime schema from one config and check its local invariants.
pub fn resolve(config: &EntityConfig) -> Result<Schema, SchemaError> {
    let alias = if config.alias.is_empty() {
        config.table.clone()
    } else {
        config.alias.clone()
    };

    let mut fields = Vec::with_capacity(config.fields.len());
    for f in &config.fields {
        let (db, hidden, group) = parse_db_annotation(&f.db);
        let constraints = match &f.validate {
            Some(v) => parse_constraints(v)?,
            None => Constraints::default(),
        };
        fields.push(Field {
            key: output_key(&f.json).to_string(),
            db,
            ty: f.type_,
            hidden,
            group,
            constraints,
        });
    }

    let mut relations = Vec::with_capacity(config.relations.len());
    for r in &config.relations {
        let source = match (&r.table, &r.schema) {
            (Some(t), None) => RelationSource::Table(t.clone()),
            (None, Some(s)) => RelationSource::Schema(s.clone()),
            _ => {
                return Err(SchemaError::Validation(format!(
                    "relation {} of entity {} needs exactly one of table or schema",
                    r.alias, config.name
                )))
            }
        };
        relations.push(Relation {
            kind: r.kind,
            source,
            alias: r.alias.clone(),
            conditions: r.conditions.iter().map(resolve_clause).collect(),
        });
    }

    let sorts = config
        .sorts
        .iter()
        .map(|s| Sort {
            db: s.column.clone(),
            desc: s.desc,
            case_insensitive: s.case_insensitive,
            required: s.required,
        })
        .collect();
    let children = config
        .children
        .iter()
        .map(|c| ArrayField {
            key: c.key.clone(),
            entity: c.entity.clone(),
            filter: c.filter.clone(),
        })
        .collect();

    let schema = Schema::new(
        config.name.clone(),
        config.table.clone(),
        alias,
        config.version.clone(),
        config.primary_key.clone(),
        config.flat,
        fields,
        relations,
        config.filters.iter().map(resolve_clause).collect(),
        sorts,
        config.groups.clone(),
        children,
    );
    validate(&schema)?;
    Ok(schema)
}

/// Subquery dependencies of each entity: entities whose compiled SELECT it embeds.
fn dependencies(schema: &Schema) -> Vec<&str> {
    schema
        .relations
        .iter()
        .filter_map(|r| match &r.source {
            RelationSource::Schema(s) => Some(s.as_str()),
            RelationSource::Table(_) => None,
        })
        .collect()
}

/// Topological order of entities over subquery relations; dependencies first.
fn build_order(schemas: &HashMap<String, Schema>) -> Result<Vec<String>, SchemaError> {
    let mut names: Vec<&String> = schemas.keys().collect();
    names.sort();
    let mut order = Vec::with_capacity(names.len());
    let mut done: HashSet<&str> = HashSet::new();
    while order.len() < names.len() {
        let mut made_progress = false;
        for name in &names {
            if done.contains(name.as_str()) {
                continue;
            }
            if dependencies(&schemas[*name]).iter().all(|d| done.contains(d)) {
                order.push((*name).clone());
                done.insert(name.as_str());
                made_progress = true;
            }
        }
        if !made_progress {
            let stuck = names
                .iter()
                .find(|n| !done.contains(n.as_str()))
                .map(|n| n.to_string())
                .unwrap_or_default();
            return Err(SchemaError::Cycle(stuck));
        }
    }
    Ok(order)
}

/// Collects entity configs and produces an immutable [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    configs: Vec<EntityConfig>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, config: EntityConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn entities(mut self, configs: impl IntoIterator<Item = EntityConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Register the entity described by a record type.
    pub fn record<R: Record>(self) -> Self {
        self.entity(describe::<R>())
    }

    pub fn build(self) -> Result<Registry, SchemaError> {
        let mut schemas: HashMap<String, Schema> = HashMap::new();
        for config in &self.configs {
            let schema = resolve(config)?;
            if schemas.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateEntity(schema.name));
            }
            schemas.insert(schema.name.clone(), schema);
        }

        for schema in schemas.values() {
            for dep in dependencies(schema) {
                if !schemas.contains_key(dep) {
                    return Err(SchemaError::MissingReference {
                        kind: "subquery entity",
                        id: dep.to_string(),
                    });
                }
            }
            for child in &schema.children {
                if !schemas.contains_key(&child.entity) {
                    return Err(SchemaError::MissingReference {
                        kind: "child entity",
                        id: child.entity.clone(),
                    });
                }
                for key in child.placeholders() {
                    if schema.field(key).is_none() {
                        return Err(SchemaError::MissingReference {
                            kind: "child template key",
                            id: format!("{}.{}", schema.name, key),
                        });
                    }
                }
            }
        }
        let order = build_order(&schemas)?;
        tracing::debug!(entities = ?order, "schema registry built");

        Ok(Registry {
            schemas: schemas
                .into_iter()
                .map(|(name, s)| (name, Arc::new(s)))
                .collect(),
        })
    }
}

/// Load entity configs from every `*.json` file in `dir`. A file holds one entity or an array.
pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<EntityConfig>, SchemaError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SchemaError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SchemaError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SchemaError::Load(format!("{}: {}", path.display(), e)))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| SchemaError::Load(format!("{}: {}", path.display(), e)))?;
        let parsed = match value {
            serde_json::Value::Array(_) => serde_json::from_value::<Vec<EntityConfig>>(value),
            other => serde_json::from_value::<EntityConfig>(other).map(|c| vec![c]),
        };
        out.extend(parsed.map_err(|e| SchemaError::Load(format!("{}: {}", path.display(), e)))?);
    }
    tracing::info!(dir = %dir.display(), count = out.len(), "entity configs loaded");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nullable::ScalarType;
    use pretty_assertions::assert_eq;

    fn field(json: &str, db: &str) -> FieldConfig {
        FieldConfig {
            json: json.into(),
            db: db.into(),
            type_: ScalarType::String,
            validate: None,
        }
    }

    fn article() -> EntityConfig {
        let mut c = EntityConfig::new("articles", "articles", "a", "1");
        c.fields = vec![
            field("id", "a.id"),
            field("title,omitempty", "a.title"),
            field("author.name", "u.name"),
            field("secret", "a.secret,hide"),
        ];
        c.relations = vec![RelationConfig {
            kind: JoinKind::Left,
            table: Some("users".into()),
            schema: None,
            alias: "u".into(),
            conditions: vec![ClauseConfig::column_eq("u.id", "a.author_id")],
        }];
        c
    }

    #[test]
    fn db_annotation_flags() {
        assert_eq!(parse_db_annotation("a.title"), ("a.title".into(), false, false));
        assert_eq!(parse_db_annotation("a.secret,hide"), ("a.secret".into(), true, false));
        assert_eq!(
            parse_db_annotation("coalesce(a.x, 0),group,hide"),
            ("coalesce(a.x, 0)".into(), true, true)
        );
    }

    #[test]
    fn constraint_annotation() {
        let c = parse_constraints("required,oneof=draft published,min=1,max=80").unwrap();
        assert!(c.required);
        assert_eq!(c.one_of, vec!["draft", "published"]);
        assert_eq!(c.min, Some(1.0));
        assert_eq!(c.max, Some(80.0));
        assert!(parse_constraints("min=x").is_err());
    }

    #[test]
    fn resolves_fields_and_flags() {
        let s = resolve(&article()).unwrap();
        assert_eq!(s.field("title").map(|f| f.db.as_str()), Some("a.title"));
        assert!(s.field("secret").unwrap().hidden);
        assert_eq!(s.primary_column(), Some("id"));
        assert_eq!(s.own_columns().count(), 3);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let mut c = article();
        c.fields.push(field("title", "a.other"));
        assert!(matches!(resolve(&c), Err(SchemaError::DuplicateKey { .. })));
    }

    #[test]
    fn rejects_unknown_alias() {
        let mut c = article();
        c.fields.push(field("editor", "e.name"));
        assert!(matches!(resolve(&c), Err(SchemaError::UnknownAlias { .. })));
    }

    #[test]
    fn rejects_empty_version() {
        let mut c = article();
        c.version = String::new();
        assert!(matches!(resolve(&c), Err(SchemaError::Validation(_))));
    }

    #[test]
    fn detects_subquery_cycles() {
        let mut a = EntityConfig::new("a", "a", "a", "1");
        a.fields = vec![field("id", "a.id")];
        a.relations = vec![RelationConfig {
            kind: JoinKind::Left,
            table: None,
            schema: Some("b".into()),
            alias: "bb".into(),
            conditions: vec![],
        }];
        let mut b = EntityConfig::new("b", "b", "b", "1");
        b.fields = vec![field("id", "b.id")];
        b.relations = vec![RelationConfig {
            kind: JoinKind::Left,
            table: None,
            schema: Some("a".into()),
            alias: "aa".into(),
            conditions: vec![],
        }];
        let err = RegistryBuilder::new().entity(a).entity(b).build().unwrap_err();
        assert!(matches!(err, SchemaError::Cycle(_)));
    }

    #[test]
    fn rejects_unknown_child_entity() {
        let mut c = article();
        c.children.push(ChildConfig {
            key: "comments".into(),
            entity: "comments".into(),
            filter: "article_id={id}".into(),
        });
        let err = RegistryBuilder::new().entity(c).build().unwrap_err();
        assert!(matches!(err, SchemaError::MissingReference { .. }));
    }

    #[tokio::test]
    async fn loads_entity_files() {
        let dir = std::env::temp_dir().join(format!("rowpath-load-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let one = serde_json::to_string(&article()).unwrap();
        tokio::fs::write(dir.join("articles.json"), one).await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), "ignored").await.unwrap();

        let configs = load_dir(&dir).await.unwrap();
        assert_eq!(configs.len(), 1);
        let registry = RegistryBuilder::new().entities(configs).build().unwrap();
        assert!(registry.get("articles").is_some());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
