//! Query-string grammar: reserved `$` keys and filter clauses.

use crate::error::QueryError;
use crate::schema::Operator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "$count" => Aggregate::Count,
            "$sum" => Aggregate::Sum,
            "$avg" => Aggregate::Avg,
            "$min" => Aggregate::Min,
            "$max" => Aggregate::Max,
            _ => return None,
        })
    }

    pub fn sql(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }

    /// Prefix of the output alias, e.g. `count` in `count.id`.
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Field(String),
    Aggregate(Aggregate, String),
}

/// `key[.$op]=value`. `param` is the key as written, for error reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub param: String,
    pub key: String,
    pub op: Operator,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    pub key: String,
    pub desc: bool,
    pub case_insensitive: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Search {
    pub fields: Vec<String>,
    pub term: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedQuery {
    pub select: Option<Vec<SelectItem>>,
    pub group: Vec<String>,
    pub filters: Vec<Filter>,
    /// Each inner list is one `(a OR b ...)` group.
    pub or_groups: Vec<Vec<Filter>>,
    pub searches: Vec<Search>,
    pub sort: Option<Vec<SortItem>>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub include: Vec<String>,
}

fn comma_list(v: &str) -> impl Iterator<Item = &str> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive(key: &str, v: &str) -> Result<u64, QueryError> {
    match v.trim().parse::<u64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(QueryError::InvalidNumber(key.to_string())),
    }
}

/// Parse `key[.$op]` with its value into a filter clause.
pub fn parse_filter(param: &str, value: &str) -> Result<Filter, QueryError> {
    let (key, op) = match param.rsplit_once(".$") {
        Some((key, op)) => {
            let op = Operator::from_param(&format!("${}", op))
                .ok_or_else(|| QueryError::UnknownOperator(param.to_string()))?;
            (key, op)
        }
        None => (param, Operator::Eq),
    };
    if key.is_empty() || key.starts_with('$') {
        return Err(QueryError::UnknownField(param.to_string()));
    }
    Ok(Filter {
        param: param.to_string(),
        key: key.to_string(),
        op,
        value: value.to_string(),
    })
}

fn parse_select(v: &str) -> Result<Vec<SelectItem>, QueryError> {
    comma_list(v)
        .map(|item| {
            if item.starts_with('$') {
                let (agg, field) = item
                    .split_once(':')
                    .ok_or_else(|| QueryError::Malformed("$select".into()))?;
                let agg = Aggregate::parse(agg)
                    .ok_or_else(|| QueryError::UnknownOperator("$select".into()))?;
                if field.trim().is_empty() {
                    return Err(QueryError::Malformed("$select".into()));
                }
                Ok(SelectItem::Aggregate(agg, field.trim().to_string()))
            } else {
                Ok(SelectItem::Field(item.to_string()))
            }
        })
        .collect()
}

fn parse_sort(v: &str) -> Vec<SortItem> {
    comma_list(v)
        .map(|item| {
            let (desc, rest) = match item.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, item),
            };
            let (key, case_insensitive) = match rest.strip_suffix(":i") {
                Some(key) => (key, true),
                None => (rest, false),
            };
            SortItem {
                key: key.to_string(),
                desc,
                case_insensitive,
            }
        })
        .collect()
}

/// `;;` separates groups, `||` separates the clauses of one group.
fn parse_or(v: &str) -> Result<Vec<Vec<Filter>>, QueryError> {
    let mut groups = Vec::new();
    for family in v.split(";;").map(str::trim).filter(|f| !f.is_empty()) {
        let mut group = Vec::new();
        for clause in family.split("||").map(str::trim).filter(|c| !c.is_empty()) {
            let (key, value) = clause
                .split_once('=')
                .ok_or_else(|| QueryError::Malformed("$or".into()))?;
            group.push(parse_filter(key.trim(), value)?);
        }
        if !group.is_empty() {
            groups.push(group);
        }
    }
    Ok(groups)
}

fn parse_search(v: &str) -> Result<Search, QueryError> {
    let (fields, term) = v
        .split_once('=')
        .ok_or_else(|| QueryError::Malformed("$search".into()))?;
    let fields: Vec<String> = comma_list(fields).map(String::from).collect();
    if fields.is_empty() {
        return Err(QueryError::Malformed("$search".into()));
    }
    Ok(Search {
        fields,
        term: term.to_string(),
    })
}

impl ParsedQuery {
    pub fn parse(pairs: &[(String, String)]) -> Result<Self, QueryError> {
        let mut q = ParsedQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "$select" => {
                    let items = parse_select(value)?;
                    if !items.is_empty() {
                        q.select.get_or_insert_with(Vec::new).extend(items);
                    }
                }
                "$group" => q.group.extend(comma_list(value).map(String::from)),
                "$sort" => {
                    let items = parse_sort(value);
                    if !items.is_empty() {
                        q.sort.get_or_insert_with(Vec::new).extend(items);
                    }
                }
                "$page" => q.page = Some(positive(key, value)?),
                "$per_page" => q.per_page = Some(positive(key, value)?),
                "$include" => q.include.extend(comma_list(value).map(String::from)),
                "$or" => q.or_groups.extend(parse_or(value)?),
                "$search" => q.searches.push(parse_search(value)?),
                k if k.starts_with('$') => return Err(QueryError::UnknownParam(key.clone())),
                _ => q.filters.push(parse_filter(key, value)?),
            }
        }
        Ok(q)
    }

    /// Pagination metadata (and the count query) are produced only when asked for.
    pub fn is_paginated(&self) -> bool {
        self.page.is_some() || self.per_page.is_some()
    }

    pub fn has_aggregates(&self) -> bool {
        self.select
            .iter()
            .flatten()
            .any(|s| matches!(s, SelectItem::Aggregate(..)))
    }
}

/// Split a raw query string into decoded pairs. Used for array-child filter templates.
pub fn split_pairs(template: &str) -> Vec<(String, String)> {
    template
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn filters_with_operators() {
        let q = ParsedQuery::parse(&pairs(&[("views.$gte", "10"), ("title", "x")])).unwrap();
        assert_eq!(q.filters[0].key, "views");
        assert_eq!(q.filters[0].op, Operator::Gte);
        assert_eq!(q.filters[1].op, Operator::Eq);
    }

    #[test]
    fn dotted_keys_keep_their_path() {
        let f = parse_filter("author.name.$ilike", "foo").unwrap();
        assert_eq!(f.key, "author.name");
        assert_eq!(f.op, Operator::Ilike);
    }

    #[test]
    fn unknown_operator_carries_key() {
        let err = ParsedQuery::parse(&pairs(&[("views.$between", "1")])).unwrap_err();
        assert_eq!(err, QueryError::UnknownOperator("views.$between".into()));
    }

    #[test]
    fn or_groups_and_search() {
        let q = ParsedQuery::parse(&pairs(&[
            ("$or", "author.name.$ilike=foo||is_active=true;;views.$gt=3||views.$lt=1"),
            ("$search", "title,content=bar=baz"),
        ]))
        .unwrap();
        assert_eq!(q.or_groups.len(), 2);
        assert_eq!(q.or_groups[0][1].key, "is_active");
        assert_eq!(q.or_groups[0][1].value, "true");
        assert_eq!(q.searches[0].fields, vec!["title", "content"]);
        assert_eq!(q.searches[0].term, "bar=baz");
    }

    #[test]
    fn select_with_aggregates() {
        let q = ParsedQuery::parse(&pairs(&[("$select", "title, $count:id")])).unwrap();
        assert_eq!(
            q.select,
            Some(vec![
                SelectItem::Field("title".into()),
                SelectItem::Aggregate(Aggregate::Count, "id".into())
            ])
        );
        assert!(q.has_aggregates());
    }

    #[test]
    fn sort_flags() {
        let q = ParsedQuery::parse(&pairs(&[("$sort", "-title:i,id")])).unwrap();
        let sort = q.sort.unwrap();
        assert!(sort[0].desc && sort[0].case_insensitive);
        assert_eq!(sort[0].key, "title");
        assert!(!sort[1].desc);
    }

    #[test]
    fn pagination_must_be_positive() {
        assert_eq!(
            ParsedQuery::parse(&pairs(&[("$page", "abc")])).unwrap_err(),
            QueryError::InvalidNumber("$page".into())
        );
        assert_eq!(
            ParsedQuery::parse(&pairs(&[("$per_page", "0")])).unwrap_err(),
            QueryError::InvalidNumber("$per_page".into())
        );
        let q = ParsedQuery::parse(&pairs(&[("$page", "2")])).unwrap();
        assert!(q.is_paginated());
    }

    #[test]
    fn unknown_reserved_key() {
        assert_eq!(
            ParsedQuery::parse(&pairs(&[("$limit", "3")])).unwrap_err(),
            QueryError::UnknownParam("$limit".into())
        );
    }

    #[test]
    fn template_pairs() {
        assert_eq!(
            split_pairs("article_id=5&$sort=-id"),
            pairs(&[("article_id", "5"), ("$sort", "-id")])
        );
    }
}
