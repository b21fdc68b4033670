//! Preferred response language from the `Accept-Language` header.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::ACCEPT_LANGUAGE, http::request::Parts};

/// Highest-weighted language tag, if the client sent one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lang(pub Option<String>);

impl Lang {
    pub fn or<'a>(&'a self, default: &'a str) -> &'a str {
        self.0.as_deref().unwrap_or(default)
    }
}

/// `da, en-GB;q=0.8, en;q=0.7` -> `da`. Wildcards and `q=0` entries are skipped.
pub fn preferred(header: &str) -> Option<String> {
    let mut best: Option<(f32, &str)> = None;
    for part in header.split(',') {
        let mut pieces = part.split(';');
        let tag = pieces.next().unwrap_or("").trim();
        if tag.is_empty() || tag == "*" {
            continue;
        }
        let q = pieces
            .find_map(|p| p.trim().strip_prefix("q="))
            .and_then(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if q <= 0.0 {
            continue;
        }
        if best.map_or(true, |(bq, _)| q > bq) {
            best = Some((q, tag));
        }
    }
    best.map(|(_, tag)| tag.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for Lang
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(preferred);
        Ok(Lang(value))
    }
}

#[cfg(test)]
mod tests {
    use super::preferred;

    #[test]
    fn picks_highest_weight() {
        assert_eq!(preferred("da, en-GB;q=0.8, en;q=0.7").as_deref(), Some("da"));
        assert_eq!(preferred("en;q=0.5, id;q=0.9").as_deref(), Some("id"));
        assert_eq!(preferred("*, fr;q=0").as_deref(), None);
        assert_eq!(preferred("").as_deref(), None);
    }
}
