//! Flat (path-keyed) and structured (nested) JSON conversions.

use serde_json::{Map, Value};

/// Path separator: a flat key is `a{before}b{after}`, e.g. `a.b` or `a[b]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Separator {
    pub before: &'static str,
    pub after: &'static str,
}

impl Separator {
    pub const DOT: Separator = Separator {
        before: ".",
        after: "",
    };

    pub const BRACKET: Separator = Separator {
        before: "[",
        after: "]",
    };
}

impl Default for Separator {
    fn default() -> Self {
        Separator::DOT
    }
}

/// Move every nested leaf to a single path key. Arrays are kept, their elements flattened.
/// Empty objects are leaves.
pub fn to_flat(v: &Value, sep: Separator) -> Value {
    match v {
        Value::Object(m) => {
            let mut out = Map::new();
            for (k, val) in m {
                flatten_into(&mut out, k.clone(), val, sep);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|x| to_flat(x, sep)).collect()),
        other => other.clone(),
    }
}

fn flatten_into(out: &mut Map<String, Value>, key: String, v: &Value, sep: Separator) {
    match v {
        Value::Object(m) if !m.is_empty() => {
            for (k, val) in m {
                flatten_into(out, format!("{}{}{}{}", key, sep.before, k, sep.after), val, sep);
            }
        }
        Value::Array(items) => {
            out.insert(key, Value::Array(items.iter().map(|x| to_flat(x, sep)).collect()));
        }
        other => {
            out.insert(key, other.clone());
        }
    }
}

fn split_key(key: &str, sep: Separator) -> Vec<String> {
    if sep.before.is_empty() {
        return vec![key.to_string()];
    }
    let mut parts = key.split(sep.before);
    let mut out = vec![parts.next().unwrap_or_default().to_string()];
    for p in parts {
        let p = if sep.after.is_empty() {
            p
        } else {
            p.strip_suffix(sep.after).unwrap_or(p)
        };
        out.push(p.to_string());
    }
    out
}

/// Rebuild nested objects from path keys. On conflict the object wins: a scalar never
/// replaces an object, and a scalar where an object is needed is dropped.
pub fn to_structured(v: &Value, sep: Separator) -> Value {
    match v {
        Value::Object(m) => {
            let mut out = Map::new();
            for (k, val) in m {
                let path = split_key(k, sep);
                insert_path(&mut out, &path, to_structured(val, sep));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|x| to_structured(x, sep)).collect()),
        other => other.clone(),
    }
}

fn insert_path(map: &mut Map<String, Value>, path: &[String], v: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        match map.get_mut(head) {
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = v {
                    merge(existing, incoming);
                }
            }
            _ => {
                map.insert(head.clone(), v);
            }
        }
        return;
    }
    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(inner) = entry {
        insert_path(inner, rest, v);
    }
}

fn merge(into: &mut Map<String, Value>, from: Map<String, Value>) {
    for (k, v) in from {
        insert_path(into, std::slice::from_ref(&k), v);
    }
}

/// Combinators over a JSON result, so conversions chain with `?`-style error carrying.
pub trait ShapeExt: Sized {
    fn flat(self, sep: Separator) -> Self;
    fn structured(self, sep: Separator) -> Self;
}

impl<E> ShapeExt for Result<Value, E> {
    fn flat(self, sep: Separator) -> Self {
        self.map(|v| to_flat(&v, sep))
    }

    fn structured(self, sep: Separator) -> Self {
        self.map(|v| to_structured(&v, sep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn flat_and_structured_round_trip() {
        let flat = json!({"name.first":"Phay","name.last":"Joe","friends":[{"name.first":"John"}]});
        let structured = to_structured(&flat, Separator::DOT);
        assert_eq!(
            structured,
            json!({"name":{"first":"Phay","last":"Joe"},"friends":[{"name":{"first":"John"}}]})
        );
        assert_eq!(to_flat(&structured, Separator::DOT), flat);
    }

    #[test]
    fn flat_is_idempotent() {
        let flat = json!({"a.b": 1, "c": [1, 2], "d": {}});
        assert_eq!(to_flat(&flat, Separator::DOT), flat);
    }

    #[test]
    fn bracket_separator() {
        let flat = json!({"name[first]": "A", "name[meta][x]": 1});
        let structured = to_structured(&flat, Separator::BRACKET);
        assert_eq!(structured, json!({"name": {"first": "A", "meta": {"x": 1}}}));
        assert_eq!(to_flat(&structured, Separator::BRACKET), flat);
    }

    #[test]
    fn object_wins_over_scalar() {
        let v = json!({"a": 1, "a.b": 2});
        assert_eq!(to_structured(&v, Separator::DOT), json!({"a": {"b": 2}}));
        let v = json!({"a.b": 2, "a": 1});
        assert_eq!(to_structured(&v, Separator::DOT), json!({"a": {"b": 2}}));
    }

    #[test]
    fn objects_merge_deeply() {
        let v = json!({"a": {"x": 1}, "a.y": 2});
        assert_eq!(to_structured(&v, Separator::DOT), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn combinators_carry_errors() {
        let ok: Result<Value, String> = Ok(json!({"a.b": 1}));
        assert_eq!(ok.structured(Separator::DOT).flat(Separator::DOT), Ok(json!({"a.b": 1})));
        let err: Result<Value, String> = Err("bad".into());
        assert_eq!(err.structured(Separator::DOT), Err("bad".to_string()));
    }
}
