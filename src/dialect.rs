//! SQL dialects: identifier quoting, JSON extraction, placeholders and pagination syntax.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
    Sqlserver,
    Firebird,
    Clickhouse,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown database driver: {0}")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Dialect::Postgres,
            "mysql" | "mariadb" => Dialect::Mysql,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "sqlserver" | "mssql" => Dialect::Sqlserver,
            "firebird" | "firebirdsql" => Dialect::Firebird,
            "clickhouse" => Dialect::Clickhouse,
            _ => return Err(UnknownDialect(s.to_string())),
        })
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Sqlserver => "sqlserver",
            Dialect::Firebird => "firebird",
            Dialect::Clickhouse => "clickhouse",
        })
    }
}

impl Dialect {
    fn quote_char(self) -> char {
        match self {
            Dialect::Sqlite | Dialect::Mysql | Dialect::Clickhouse => '`',
            Dialect::Postgres | Dialect::Sqlserver | Dialect::Firebird => '"',
        }
    }

    /// Quote one identifier. Embedded quote characters are doubled.
    pub fn quote(self, ident: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Quote a dotted identifier path part by part: `a.title` -> `"a"."title"`.
    pub fn quote_path(self, path: &str) -> String {
        path.split('.').map(|p| self.quote(p)).collect::<Vec<_>>().join(".")
    }

    /// Extract a text value at `path` inside a JSON column. `column` is already rendered SQL.
    pub fn quote_json(self, column: &str, path: &[&str]) -> String {
        let esc = |s: &str| s.replace('\'', "''");
        match self {
            Dialect::Sqlite | Dialect::Mysql => {
                format!("JSON_EXTRACT({},'$.{}')", column, esc(&path.join(".")))
            }
            Dialect::Sqlserver | Dialect::Firebird => {
                format!("JSON_VALUE({},'$.{}')", column, esc(&path.join(".")))
            }
            Dialect::Postgres => {
                let keys: Vec<String> = path.iter().map(|p| format!("'{}'", esc(p))).collect();
                format!("json_extract_path_text({}::json,{})", column, keys.join(","))
            }
            Dialect::Clickhouse => {
                let keys: Vec<String> = path.iter().map(|p| format!("'{}'", esc(p))).collect();
                format!("JSONExtractString({},{})", column, keys.join(","))
            }
        }
    }

    /// Bind placeholder for the `n`th parameter (1-based).
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlserver => format!("@p{}", n),
            Dialect::Mysql | Dialect::Sqlite | Dialect::Firebird | Dialect::Clickhouse => "?".into(),
        }
    }

    /// Expression suitable for a column `DEFAULT` that generates a UUID string.
    pub fn uuid_default(self) -> &'static str {
        match self {
            Dialect::Postgres => "gen_random_uuid()",
            Dialect::Mysql => "(UUID())",
            Dialect::Sqlite => {
                "(lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) || '-4' || substr(lower(hex(randomblob(2))),2) || '-' || substr('89ab',abs(random()) % 4 + 1, 1) || substr(lower(hex(randomblob(2))),2) || '-' || lower(hex(randomblob(6))))"
            }
            Dialect::Sqlserver => "NEWID()",
            Dialect::Firebird => "UUID_TO_CHAR(GEN_UUID())",
            Dialect::Clickhouse => "generateUUIDv4()",
        }
    }

    /// Render a regular-expression comparison, or `None` when the dialect has no operator for it.
    pub fn regexp(self, column: &str, placeholder: &str, negated: bool) -> Option<String> {
        match self {
            Dialect::Postgres => Some(format!(
                "{} {} {}",
                column,
                if negated { "!~" } else { "~" },
                placeholder
            )),
            Dialect::Mysql | Dialect::Sqlite => Some(format!(
                "{} {} {}",
                column,
                if negated { "NOT REGEXP" } else { "REGEXP" },
                placeholder
            )),
            Dialect::Firebird => Some(format!(
                "{} {} {}",
                column,
                if negated { "NOT SIMILAR TO" } else { "SIMILAR TO" },
                placeholder
            )),
            Dialect::Clickhouse => Some(format!(
                "{}match({},{})",
                if negated { "NOT " } else { "" },
                column,
                placeholder
            )),
            Dialect::Sqlserver => None,
        }
    }

    /// Pagination suffix (with leading space). `has_order` tells sqlserver/firebird whether an
    /// ORDER BY is present, since their OFFSET form requires one.
    pub fn limit_offset(self, limit: Option<u64>, offset: u64, has_order: bool) -> String {
        match self {
            Dialect::Sqlserver | Dialect::Firebird => {
                let Some(limit) = limit else {
                    return String::new();
                };
                let order = if has_order || self == Dialect::Firebird {
                    ""
                } else {
                    " ORDER BY (SELECT NULL)"
                };
                format!(
                    "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                    order, offset, limit
                )
            }
            _ => {
                let mut out = String::new();
                if let Some(limit) = limit {
                    out.push_str(&format!(" LIMIT {}", limit));
                }
                if offset > 0 {
                    out.push_str(&format!(" OFFSET {}", offset));
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_follows_dialect() {
        assert_eq!(Dialect::Postgres.quote("a"), "\"a\"");
        assert_eq!(Dialect::Mysql.quote("a"), "`a`");
        assert_eq!(Dialect::Sqlite.quote_path("a.title"), "`a`.`title`");
        assert_eq!(Dialect::Sqlserver.quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn json_extract_forms() {
        let pg = Dialect::Postgres.quote_json("\"a\".\"meta\"", &["theme", "color"]);
        assert_eq!(pg, "json_extract_path_text(\"a\".\"meta\"::json,'theme','color')");
        let my = Dialect::Mysql.quote_json("`a`.`meta`", &["theme", "color"]);
        assert_eq!(my, "JSON_EXTRACT(`a`.`meta`,'$.theme.color')");
        let ms = Dialect::Sqlserver.quote_json("\"a\".\"meta\"", &["theme"]);
        assert_eq!(ms, "JSON_VALUE(\"a\".\"meta\",'$.theme')");
    }

    #[test]
    fn placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlserver.placeholder(2), "@p2");
        assert_eq!(Dialect::Sqlite.placeholder(9), "?");
    }

    #[test]
    fn driver_names_parse() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mssql".parse::<Dialect>().unwrap(), Dialect::Sqlserver);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn pagination_syntax() {
        assert_eq!(Dialect::Postgres.limit_offset(Some(10), 0, true), " LIMIT 10");
        assert_eq!(Dialect::Mysql.limit_offset(Some(25), 25, false), " LIMIT 25 OFFSET 25");
        assert_eq!(
            Dialect::Sqlserver.limit_offset(Some(5), 10, false),
            " ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(Dialect::Postgres.limit_offset(None, 0, true), "");
    }
}
