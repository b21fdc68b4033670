//! Message catalog keyed by language tag, with `:name` placeholders.

use crate::error::AppError;
use std::collections::HashMap;

const BUILTIN: &[(&str, &[(&str, &str)])] = &[
    (
        "en",
        &[
            ("query.unknown_field", "unknown field in ':param'"),
            ("query.unknown_operator", "unknown operator in ':param'"),
            ("query.invalid_number", "':param' must be a positive integer"),
            ("query.invalid_value", "invalid value for ':param'"),
            ("query.unknown_include", "unknown array field in ':param'"),
            ("query.unknown_param", "unknown query parameter ':param'"),
            ("query.malformed", "malformed expression in ':param'"),
            ("query.unsupported_operator", "operator in ':param' is not supported by this database"),
            ("not_found", ":resource not found"),
        ],
    ),
    (
        "en-US",
        &[("not_found", ":resource was not found")],
    ),
    (
        "id",
        &[
            ("query.unknown_field", "kolom tidak dikenal pada ':param'"),
            ("query.unknown_operator", "operator tidak dikenal pada ':param'"),
            ("query.invalid_number", "':param' harus berupa bilangan bulat positif"),
            ("query.invalid_value", "nilai tidak valid untuk ':param'"),
            ("query.unknown_include", "kolom array tidak dikenal pada ':param'"),
            ("query.unknown_param", "parameter kueri tidak dikenal ':param'"),
            ("query.malformed", "ekspresi tidak valid pada ':param'"),
            ("query.unsupported_operator", "operator pada ':param' tidak didukung oleh basis data ini"),
            ("not_found", ":resource tidak ditemukan"),
        ],
    ),
];

#[derive(Clone, Debug)]
pub struct Translator {
    default_lang: String,
    catalog: HashMap<String, HashMap<String, String>>,
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

fn primary(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Replace `:name` placeholders. Longer names go first so `:id` never eats `:identity`.
pub fn interpolate(template: &str, args: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = args.iter().collect();
    sorted.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    let mut out = template.to_string();
    for (name, value) in sorted {
        out = out.replace(&format!(":{}", name), value);
    }
    out
}

impl Translator {
    pub fn new(default_lang: &str) -> Self {
        Translator {
            default_lang: normalize_tag(default_lang),
            catalog: HashMap::new(),
        }
    }

    /// Translator preloaded with the built-in catalog.
    pub fn builtin(default_lang: &str) -> Self {
        let mut t = Self::new(default_lang);
        for (lang, entries) in BUILTIN {
            for (key, template) in entries.iter() {
                t.add(lang, key, template);
            }
        }
        t
    }

    pub fn add(&mut self, lang: &str, key: &str, template: &str) {
        self.catalog
            .entry(normalize_tag(lang))
            .or_default()
            .insert(key.to_string(), template.to_string());
    }

    /// Template for `key`: full tag, then primary subtag, then any tag sharing the
    /// primary subtag, then the default language. Falls back to the key itself.
    fn template(&self, lang: &str, key: &str) -> Option<&str> {
        let tag = normalize_tag(lang);
        let prim = primary(&tag);
        let lookup = |t: &str| self.catalog.get(t).and_then(|m| m.get(key));
        if let Some(s) = lookup(&tag).or_else(|| lookup(prim)) {
            return Some(s);
        }
        let mut sharing: Vec<&String> = self
            .catalog
            .keys()
            .filter(|t| primary(t) == prim)
            .collect();
        sharing.sort();
        sharing
            .into_iter()
            .find_map(|t| lookup(t))
            .or_else(|| lookup(&self.default_lang))
            .or_else(|| lookup(primary(&self.default_lang)))
            .map(String::as_str)
    }

    pub fn translate(&self, lang: &str, key: &str, args: &[(&str, &str)]) -> String {
        match self.template(lang, key) {
            Some(t) => interpolate(t, args),
            None => key.to_string(),
        }
    }

    /// Render user-facing error messages in `lang`. Other errors pass through.
    pub fn localize(&self, lang: &str, err: AppError) -> AppError {
        match err {
            AppError::Query(e) => {
                let message = self.translate(lang, e.message_key(), &[("param", e.key())]);
                AppError::BadRequest {
                    message,
                    detail: AppError::Query(e).detail(),
                }
            }
            AppError::NotFound(resource) => AppError::Status {
                code: 404,
                message: self.translate(lang, "not_found", &[("resource", &resource)]),
                detail: None,
            },
            other => other,
        }
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::builtin("en")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn placeholders_longest_first() {
        assert_eq!(
            interpolate(":id of :identity", &[("id", "1"), ("identity", "user")]),
            "1 of user"
        );
    }

    #[test]
    fn tag_fallback() {
        let t = Translator::builtin("en");
        assert_eq!(t.translate("en-US", "not_found", &[("resource", "article")]), "article was not found");
        assert_eq!(t.translate("en-GB", "not_found", &[("resource", "article")]), "article not found");
        assert_eq!(t.translate("id-ID", "not_found", &[("resource", "artikel")]), "artikel tidak ditemukan");
        assert_eq!(t.translate("fr", "not_found", &[("resource", "x")]), "x not found");
        assert_eq!(t.translate("fr", "missing.key", &[]), "missing.key");
    }

    #[test]
    fn region_only_catalog_matches_primary() {
        let mut t = Translator::new("en");
        t.add("pt-BR", "hello", "olá");
        assert_eq!(t.translate("pt", "hello", &[]), "olá");
        assert_eq!(t.translate("pt-PT", "hello", &[]), "olá");
    }

    #[test]
    fn localizes_query_errors() {
        let t = Translator::builtin("en");
        let e = t.localize("id", AppError::Query(QueryError::UnknownField("nope".into())));
        assert_eq!(e.code(), 400);
        assert_eq!(e.to_string(), "kolom tidak dikenal pada 'nope'");
        assert_eq!(e.detail(), Some(json!({"param": "nope"})));
    }
}
