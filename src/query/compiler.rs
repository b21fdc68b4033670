//! Compile a parsed query against a schema into dialect SQL with ordered bind values.

use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::nullable::ScalarType;
use crate::query::params::{split_pairs, Filter, ParsedQuery, SelectItem};
use crate::query::QueryOptions;
use crate::schema::{
    expr_aliases, render_expr, ArrayField, Field, Operand, Operator, Registry, Relation,
    RelationSource, Schema, WhereClause,
};
use crate::sql::{QueryBuf, SqlValue};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Statements for one read request.
#[derive(Clone, Debug)]
pub struct Plan {
    pub select: QueryBuf,
    /// Present when the request asked for pagination.
    pub count: Option<QueryBuf>,
    pub page: u64,
    pub per_page: u64,
    /// Array-child keys to expand.
    pub includes: Vec<String>,
    /// Output keys projected only to feed child templates; removed before responding.
    pub strip: Vec<String>,
}

struct Projection {
    sql: String,
    key: String,
    db: String,
    aggregate: bool,
}

enum Rhs {
    Null,
    Value(SqlValue),
    List(Vec<SqlValue>),
    Column(String),
}

enum Cond {
    Cmp {
        lhs: String,
        op: Operator,
        rhs: Rhs,
        param: String,
    },
    Any(Vec<Cond>),
}

struct OrderTerm {
    sql: String,
    db: String,
}

/// Everything resolved against the schema; rendered once per statement.
struct Resolved {
    projection: Vec<Projection>,
    conditions: Vec<Cond>,
    /// Raw expressions the WHERE clause reads, for join selection.
    where_exprs: Vec<String>,
    groups: Vec<String>,
    orders: Vec<OrderTerm>,
    strip: Vec<String>,
}

impl Resolved {
    fn has_aggregates(&self) -> bool {
        self.projection.iter().any(|p| p.aggregate)
    }
}

struct Target {
    lhs: String,
    ty: ScalarType,
    db: String,
}

fn like_pattern(s: &str, lower: bool) -> String {
    let s = if lower { s.to_lowercase() } else { s.to_string() };
    if s.contains('%') {
        s
    } else {
        format!("%{}%", s)
    }
}

fn push_unique(list: &mut Vec<String>, s: &str) {
    if !list.iter().any(|x| x == s) {
        list.push(s.to_string());
    }
}

/// Text a parent value contributes to a child filter template. Missing and null have none.
fn template_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Substitute `{key}` placeholders with the parent row's values and split into query pairs.
/// `None` when a referenced parent value is missing or null: that parent has no children.
pub fn instantiate(child: &ArrayField, row: &Map<String, Value>) -> Option<Vec<(String, String)>> {
    let placeholders = child.placeholders();
    split_pairs(&child.filter)
        .into_iter()
        .map(|(k, mut v)| {
            for p in &placeholders {
                let token = format!("{{{}}}", p);
                if v.contains(&token) {
                    v = v.replace(&token, &template_text(row.get(*p))?);
                }
            }
            Some((k, v))
        })
        .collect()
}

pub struct Compiler<'a> {
    registry: &'a Registry,
    dialect: Dialect,
    options: QueryOptions,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry, dialect: Dialect, options: QueryOptions) -> Self {
        Compiler {
            registry,
            dialect,
            options,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// List query: LIMIT/OFFSET always, a count statement when `$page` or `$per_page` is given.
    pub fn compile(&self, schema: &Schema, q: &ParsedQuery) -> Result<Plan, QueryError> {
        let page = q.page.unwrap_or(1);
        let per_page = q
            .per_page
            .unwrap_or(self.options.default_per_page)
            .clamp(1, self.options.max_per_page.max(1));
        let offset = (page - 1).saturating_mul(per_page);
        let mut plan = self.plan(schema, q, Some((per_page, offset)))?;
        plan.page = page;
        plan.per_page = per_page;
        Ok(plan)
    }

    /// Every matching row: no pagination, no count. Used for array children.
    pub fn compile_all(&self, schema: &Schema, q: &ParsedQuery) -> Result<Plan, QueryError> {
        self.plan(schema, q, None)
    }

    /// Single row by primary key.
    pub fn compile_one(&self, schema: &Schema, q: &ParsedQuery, id: &str) -> Result<Plan, QueryError> {
        let mut q = q.clone();
        q.page = None;
        q.per_page = None;
        q.filters.push(Filter {
            param: schema.primary_key.clone(),
            key: schema.primary_key.clone(),
            op: Operator::Eq,
            value: id.to_string(),
        });
        self.plan(schema, &q, None)
    }

    fn plan(
        &self,
        schema: &Schema,
        q: &ParsedQuery,
        page: Option<(u64, u64)>,
    ) -> Result<Plan, QueryError> {
        let mut includes = Vec::new();
        for key in &q.include {
            if schema.array_field(key).is_none() {
                return Err(QueryError::UnknownInclude(key.clone()));
            }
            push_unique(&mut includes, key);
        }

        let resolved = self.resolve(schema, q, &includes)?;
        let mut select = QueryBuf::new(self.dialect);
        let sql = self.render_select(schema, &resolved, &mut select, page, true)?;
        select.sql = sql;

        let count = match page {
            Some(_) if q.is_paginated() => Some(self.render_count(schema, &resolved)?),
            _ => None,
        };
        Ok(Plan {
            select,
            count,
            page: 1,
            per_page: page.map(|(l, _)| l).unwrap_or(0),
            includes,
            strip: resolved.strip,
        })
    }

    fn resolve(
        &self,
        schema: &Schema,
        q: &ParsedQuery,
        includes: &[String],
    ) -> Result<Resolved, QueryError> {
        let mut projection = self.projection(schema, q)?;
        let mut strip = Vec::new();
        for key in includes {
            let Some(child) = schema.array_field(key) else {
                continue;
            };
            for p in child.placeholders() {
                if projection.iter().any(|x| x.key == p) {
                    continue;
                }
                let f = schema
                    .field(p)
                    .ok_or_else(|| QueryError::UnknownField(p.to_string()))?;
                projection.push(self.field_projection(f));
                strip.push(p.to_string());
            }
        }

        let mut conditions = Vec::new();
        let mut where_exprs = Vec::new();
        for c in &schema.filters {
            conditions.push(self.clause_cond(c)?);
            push_unique(&mut where_exprs, &c.column);
        }
        for f in &q.filters {
            let (cond, db) = self.filter_cond(schema, f)?;
            conditions.push(cond);
            push_unique(&mut where_exprs, &db);
        }
        for group in &q.or_groups {
            let mut any = Vec::with_capacity(group.len());
            for f in group {
                let (cond, db) = self.filter_cond(schema, f)?;
                any.push(cond);
                push_unique(&mut where_exprs, &db);
            }
            conditions.push(Cond::Any(any));
        }
        for search in &q.searches {
            let mut any = Vec::with_capacity(search.fields.len());
            for key in &search.fields {
                let t = self
                    .target(schema, key)
                    .ok_or_else(|| QueryError::UnknownField("$search".into()))?;
                any.push(Cond::Cmp {
                    lhs: t.lhs,
                    op: Operator::Ilike,
                    rhs: Rhs::Value(SqlValue::Text(like_pattern(&search.term, true))),
                    param: "$search".into(),
                });
                push_unique(&mut where_exprs, &t.db);
            }
            conditions.push(Cond::Any(any));
        }

        let mut groups = schema.groups.clone();
        for key in &q.group {
            let f = schema
                .field(key)
                .ok_or_else(|| QueryError::UnknownField("$group".into()))?;
            push_unique(&mut groups, &f.db);
        }
        for f in schema.fields.iter().filter(|f| f.group) {
            push_unique(&mut groups, &f.db);
        }
        let aggregates = projection.iter().any(|p| p.aggregate);
        if aggregates && groups.is_empty() {
            for p in projection.iter().filter(|p| !p.aggregate) {
                push_unique(&mut groups, &p.db);
            }
        }

        let mut orders = Vec::new();
        match &q.sort {
            Some(items) => {
                for s in schema.sorts.iter().filter(|s| s.required) {
                    orders.push(self.order_term(&s.db, s.desc, s.case_insensitive));
                }
                for item in items {
                    let t = self
                        .target(schema, &item.key)
                        .ok_or_else(|| QueryError::UnknownField("$sort".into()))?;
                    let lhs = if item.case_insensitive {
                        format!("LOWER({})", t.lhs)
                    } else {
                        t.lhs
                    };
                    orders.push(OrderTerm {
                        sql: format!("{} {}", lhs, if item.desc { "DESC" } else { "ASC" }),
                        db: t.db,
                    });
                }
            }
            None => {
                for s in &schema.sorts {
                    orders.push(self.order_term(&s.db, s.desc, s.case_insensitive));
                }
            }
        }
        if aggregates && !projection.iter().any(|p| !p.aggregate) {
            orders.clear();
        } else if !groups.is_empty() {
            orders.retain(|o| groups.contains(&o.db));
        }

        Ok(Resolved {
            projection,
            conditions,
            where_exprs,
            groups,
            orders,
            strip,
        })
    }

    fn field_projection(&self, f: &Field) -> Projection {
        Projection {
            sql: render_expr(&f.db, self.dialect),
            key: f.key.clone(),
            db: f.db.clone(),
            aggregate: false,
        }
    }

    fn projection(&self, schema: &Schema, q: &ParsedQuery) -> Result<Vec<Projection>, QueryError> {
        let Some(items) = &q.select else {
            return Ok(schema
                .fields
                .iter()
                .filter(|f| !f.hidden)
                .map(|f| self.field_projection(f))
                .collect());
        };
        let mut out: Vec<Projection> = Vec::new();
        let mut seen = HashSet::new();
        for item in items {
            match item {
                SelectItem::Field(key) => {
                    let matched: Vec<&Field> = match schema.field(key) {
                        Some(f) if !f.hidden => vec![f],
                        Some(_) => vec![],
                        None => {
                            let prefix = format!("{}.", key);
                            schema
                                .fields
                                .iter()
                                .filter(|f| !f.hidden && f.key.starts_with(&prefix))
                                .collect()
                        }
                    };
                    if matched.is_empty() {
                        return Err(QueryError::UnknownField("$select".into()));
                    }
                    for f in matched {
                        if seen.insert(f.key.clone()) {
                            out.push(self.field_projection(f));
                        }
                    }
                }
                SelectItem::Aggregate(agg, key) => {
                    let f = schema
                        .field(key)
                        .ok_or_else(|| QueryError::UnknownField("$select".into()))?;
                    let alias = format!("{}.{}", agg.name(), key);
                    if seen.insert(alias.clone()) {
                        out.push(Projection {
                            sql: format!("{}({})", agg.sql(), render_expr(&f.db, self.dialect)),
                            key: alias,
                            db: f.db.clone(),
                            aggregate: true,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Resolve an output key to its SQL. Sub-paths of `json` fields use the dialect's extract form.
    fn target(&self, schema: &Schema, key: &str) -> Option<Target> {
        if let Some(f) = schema.field(key) {
            return Some(Target {
                lhs: render_expr(&f.db, self.dialect),
                ty: f.ty,
                db: f.db.clone(),
            });
        }
        let f = schema
            .fields
            .iter()
            .filter(|f| {
                f.ty == ScalarType::Json
                    && key.len() > f.key.len() + 1
                    && key.starts_with(f.key.as_str())
                    && key.as_bytes()[f.key.len()] == b'.'
            })
            .max_by_key(|f| f.key.len())?;
        let path: Vec<&str> = key[f.key.len() + 1..].split('.').collect();
        Some(Target {
            lhs: self
                .dialect
                .quote_json(&render_expr(&f.db, self.dialect), &path),
            ty: ScalarType::String,
            db: f.db.clone(),
        })
    }

    fn order_term(&self, db: &str, desc: bool, case_insensitive: bool) -> OrderTerm {
        let expr = render_expr(db, self.dialect);
        let expr = if case_insensitive {
            format!("LOWER({})", expr)
        } else {
            expr
        };
        OrderTerm {
            sql: format!("{} {}", expr, if desc { "DESC" } else { "ASC" }),
            db: db.to_string(),
        }
    }

    fn filter_cond(&self, schema: &Schema, f: &Filter) -> Result<(Cond, String), QueryError> {
        let t = self
            .target(schema, &f.key)
            .ok_or_else(|| QueryError::UnknownField(f.param.clone()))?;
        let coerce = |s: &str| {
            t.ty.parse_param(s)
                .ok_or_else(|| QueryError::InvalidValue(f.param.clone()))
        };
        let rhs = match f.op {
            Operator::Eq | Operator::Ne if f.value.eq_ignore_ascii_case("null") => Rhs::Null,
            Operator::Like | Operator::Nlike => Rhs::Value(SqlValue::Text(like_pattern(&f.value, false))),
            Operator::Ilike | Operator::Nilike => {
                Rhs::Value(SqlValue::Text(like_pattern(&f.value, true)))
            }
            Operator::Regexp | Operator::Nregexp => {
                if self.dialect.regexp("", "", false).is_none() {
                    return Err(QueryError::UnsupportedOperator(f.param.clone()));
                }
                Rhs::Value(SqlValue::Text(f.value.clone()))
            }
            Operator::In | Operator::Nin => Rhs::List(
                f.value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(coerce)
                    .collect::<Result<_, _>>()?,
            ),
            _ => Rhs::Value(coerce(&f.value)?),
        };
        Ok((
            Cond::Cmp {
                lhs: t.lhs,
                op: f.op,
                rhs,
                param: f.param.clone(),
            },
            t.db,
        ))
    }

    fn clause_cond(&self, c: &WhereClause) -> Result<Cond, QueryError> {
        let rhs = match &c.operand {
            Operand::Column(x) => Rhs::Column(render_expr(x, self.dialect)),
            Operand::Value(Value::Null) => Rhs::Null,
            Operand::Value(Value::Array(items)) => {
                Rhs::List(items.iter().map(SqlValue::from_json).collect())
            }
            Operand::Value(v) if c.op.is_like() => {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Rhs::Value(SqlValue::Text(like_pattern(&text, c.op.is_case_insensitive())))
            }
            Operand::Value(v) => Rhs::Value(SqlValue::from_json(v)),
        };
        Ok(Cond::Cmp {
            lhs: render_expr(&c.column, self.dialect),
            op: c.op,
            rhs,
            param: c.column.clone(),
        })
    }

    fn render_cond(&self, c: &Cond, buf: &mut QueryBuf) -> Result<String, QueryError> {
        let (lhs, op, rhs, param) = match c {
            Cond::Any(list) => {
                let parts = list
                    .iter()
                    .map(|c| self.render_cond(c, buf))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(format!("({})", parts.join(" OR ")));
            }
            Cond::Cmp {
                lhs,
                op,
                rhs,
                param,
            } => (lhs, *op, rhs, param),
        };

        match (op, rhs) {
            (Operator::Eq, Rhs::Null) => return Ok(format!("{} IS NULL", lhs)),
            (Operator::Ne, Rhs::Null) => return Ok(format!("{} IS NOT NULL", lhs)),
            (_, Rhs::Null) => return Err(QueryError::InvalidValue(param.clone())),
            (Operator::In | Operator::Nin, _) => {
                let values = match rhs {
                    Rhs::List(vs) => vs.clone(),
                    Rhs::Value(v) => vec![v.clone()],
                    _ => return Err(QueryError::InvalidValue(param.clone())),
                };
                let negated = op == Operator::Nin;
                if values.is_empty() {
                    return Ok(if negated { "1=1" } else { "1=0" }.into());
                }
                let phs: Vec<String> = values.into_iter().map(|v| buf.bind(v)).collect();
                return Ok(format!(
                    "{} {}IN ({})",
                    lhs,
                    if negated { "NOT " } else { "" },
                    phs.join(",")
                ));
            }
            _ => {}
        }

        let case_insensitive = op.is_case_insensitive();
        let r = match rhs {
            Rhs::Value(v) => buf.bind(v.clone()),
            Rhs::Column(col) if case_insensitive => format!("LOWER({})", col),
            Rhs::Column(col) => col.clone(),
            Rhs::List(_) | Rhs::Null => return Err(QueryError::InvalidValue(param.clone())),
        };
        Ok(match op {
            Operator::Eq => format!("{}={}", lhs, r),
            Operator::Ne => format!("{}!={}", lhs, r),
            Operator::Gt => format!("{}>{}", lhs, r),
            Operator::Gte => format!("{}>={}", lhs, r),
            Operator::Lt => format!("{}<{}", lhs, r),
            Operator::Lte => format!("{}<={}", lhs, r),
            Operator::Like => format!("{} LIKE {}", lhs, r),
            Operator::Nlike => format!("{} NOT LIKE {}", lhs, r),
            Operator::Ilike => format!("LOWER({}) LIKE {}", lhs, r),
            Operator::Nilike => format!("LOWER({}) NOT LIKE {}", lhs, r),
            Operator::Regexp | Operator::Nregexp => self
                .dialect
                .regexp(lhs, &r, op == Operator::Nregexp)
                .ok_or_else(|| QueryError::UnsupportedOperator(param.clone()))?,
            Operator::In | Operator::Nin => return Err(QueryError::InvalidValue(param.clone())),
        })
    }

    fn render_where(&self, conds: &[Cond], buf: &mut QueryBuf) -> Result<String, QueryError> {
        if conds.is_empty() {
            return Ok(String::new());
        }
        let parts = conds
            .iter()
            .map(|c| self.render_cond(c, buf))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(" WHERE {}", parts.join(" AND ")))
    }

    /// Relations referenced by `exprs`, plus those their join conditions depend on, in declared order.
    fn required_joins<'s, 'e>(
        &self,
        schema: &'s Schema,
        exprs: impl IntoIterator<Item = &'e str>,
    ) -> Vec<&'s Relation> {
        let mut need: HashSet<String> = exprs
            .into_iter()
            .flat_map(expr_aliases)
            .filter(|a| *a != schema.alias)
            .collect();
        loop {
            let mut found = Vec::new();
            for r in schema.relations.iter().filter(|r| need.contains(&r.alias)) {
                for c in &r.conditions {
                    let mut refs = expr_aliases(&c.column);
                    if let Operand::Column(x) = &c.operand {
                        refs.extend(expr_aliases(x));
                    }
                    found.extend(
                        refs.into_iter()
                            .filter(|a| *a != schema.alias && *a != r.alias),
                    );
                }
            }
            let mut changed = false;
            for a in found {
                changed |= need.insert(a);
            }
            if !changed {
                break;
            }
        }
        schema
            .relations
            .iter()
            .filter(|r| need.contains(&r.alias))
            .collect()
    }

    fn render_from(
        &self,
        schema: &Schema,
        joins: &[&Relation],
        buf: &mut QueryBuf,
    ) -> Result<String, QueryError> {
        let d = self.dialect;
        let mut out = format!("{} AS {}", d.quote(&schema.table), d.quote(&schema.alias));
        for r in joins {
            let source = match &r.source {
                RelationSource::Table(t) => d.quote(t),
                RelationSource::Schema(name) => {
                    let sub = self
                        .registry
                        .get(name)
                        .ok_or_else(|| QueryError::UnknownField(name.clone()))?;
                    let resolved = self.resolve(&sub, &ParsedQuery::default(), &[])?;
                    format!("({})", self.render_select(&sub, &resolved, buf, None, true)?)
                }
            };
            let on = r
                .conditions
                .iter()
                .map(|c| {
                    let cond = self.clause_cond(c)?;
                    self.render_cond(&cond, buf)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let on = if on.is_empty() {
                "1=1".to_string()
            } else {
                on.join(" AND ")
            };
            out.push_str(&format!(
                " {} {} AS {} ON {}",
                r.kind.sql(),
                source,
                d.quote(&r.alias),
                on
            ));
        }
        Ok(out)
    }

    fn render_select(
        &self,
        schema: &Schema,
        r: &Resolved,
        buf: &mut QueryBuf,
        page: Option<(u64, u64)>,
        ordered: bool,
    ) -> Result<String, QueryError> {
        let d = self.dialect;
        let orders: &[OrderTerm] = if ordered { &r.orders } else { &[] };
        let cols: Vec<String> = r
            .projection
            .iter()
            .map(|p| format!("{} AS {}", p.sql, d.quote(&p.key)))
            .collect();
        let exprs = r
            .projection
            .iter()
            .map(|p| p.db.as_str())
            .chain(r.where_exprs.iter().map(String::as_str))
            .chain(r.groups.iter().map(String::as_str))
            .chain(orders.iter().map(|o| o.db.as_str()));
        let joins = self.required_joins(schema, exprs);
        let from = self.render_from(schema, &joins, buf)?;
        let where_sql = self.render_where(&r.conditions, buf)?;
        let group_sql = if r.groups.is_empty() {
            String::new()
        } else {
            let g: Vec<String> = r.groups.iter().map(|g| render_expr(g, d)).collect();
            format!(" GROUP BY {}", g.join(", "))
        };
        let order_sql = if orders.is_empty() {
            String::new()
        } else {
            let o: Vec<&str> = orders.iter().map(|o| o.sql.as_str()).collect();
            format!(" ORDER BY {}", o.join(", "))
        };
        let limit_sql = page
            .map(|(limit, offset)| d.limit_offset(Some(limit), offset, !orders.is_empty()))
            .unwrap_or_default();
        Ok(format!(
            "SELECT {} FROM {}{}{}{}{}",
            cols.join(", "),
            from,
            where_sql,
            group_sql,
            order_sql,
            limit_sql
        ))
    }

    /// Same FROM/JOIN/WHERE as the row query. Grouped or aggregated queries are counted as a
    /// derived table; otherwise `COUNT(*)`, or `COUNT(DISTINCT pk)` when joins may duplicate rows.
    fn render_count(&self, schema: &Schema, r: &Resolved) -> Result<QueryBuf, QueryError> {
        let d = self.dialect;
        let mut buf = QueryBuf::new(d);
        if r.has_aggregates() || !r.groups.is_empty() {
            let inner = self.render_select(schema, r, &mut buf, None, false)?;
            buf.sql = format!("SELECT COUNT(*) FROM ({}) AS {}", inner, d.quote("_grouped"));
            return Ok(buf);
        }

        let joins = self.required_joins(schema, r.where_exprs.iter().map(String::as_str));
        let counted = match schema.primary_field() {
            Some(pk) if !joins.is_empty() => format!("COUNT(DISTINCT {})", render_expr(&pk.db, d)),
            _ => "COUNT(*)".to_string(),
        };
        let from = self.render_from(schema, &joins, &mut buf)?;
        let where_sql = self.render_where(&r.conditions, &mut buf)?;
        buf.sql = format!("SELECT {} FROM {}{}", counted, from, where_sql);
        Ok(buf)
    }
}
