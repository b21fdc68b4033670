//! Typed unmarshal/marshal driven by record descriptors, and the schema-driven payload reader.

use crate::schema::{ChildSlot, FieldSlot, FieldVisitor, Record, Schema, Tag};
use crate::shape::flat::{to_structured, Separator};
use serde_json::{Map, Value};

/// Look up a dotted output key: as a flat key first, then by walking nested objects.
pub fn lookup<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(found) = v.get(key) {
        return Some(found);
    }
    let mut cur = v;
    for part in key.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur)
}

struct Unmarshaller<'a> {
    src: &'a Value,
}

impl FieldVisitor for Unmarshaller<'_> {
    fn field(&mut self, tag: &Tag, slot: &mut dyn FieldSlot) {
        if let Some(v) = lookup(self.src, tag.key()) {
            slot.set_json(v);
        }
    }

    fn children(&mut self, tag: &Tag, slot: &mut dyn ChildSlot) {
        if let Some(Value::Array(items)) = lookup(self.src, tag.key()) {
            slot.set_json(items);
        }
    }
}

/// Fill a record from flat or structured JSON. Missing keys leave fields invalid;
/// values are coerced with the nullable rules.
pub fn unmarshal<R: Record>(v: &Value) -> R {
    let mut record = R::default();
    record.visit(&mut Unmarshaller { src: v });
    record
}

#[derive(Default)]
struct Marshaller {
    out: Map<String, Value>,
}

impl FieldVisitor for Marshaller {
    fn field(&mut self, tag: &Tag, slot: &mut dyn FieldSlot) {
        if tag.omit_empty() && slot.is_zero() {
            return;
        }
        self.out.insert(tag.key().to_string(), slot.to_json());
    }

    fn children(&mut self, tag: &Tag, slot: &mut dyn ChildSlot) {
        self.out
            .insert(tag.key().to_string(), Value::Array(slot.to_json()));
    }
}

/// Structured JSON of a record. Fields tagged `omitempty` are left out when invalid, or at
/// the epoch for timestamps.
pub fn marshal<R: Record>(record: &R) -> Value {
    let mut m = Marshaller::default();
    record.clone().visit(&mut m);
    to_structured(&Value::Object(m.out), Separator::DOT)
}

/// Read the schema's fields present in a payload, coerced to their scalar types and keyed by
/// output key. Keys absent from the payload are absent from the result.
pub fn unmarshal_schema(schema: &Schema, v: &Value) -> Map<String, Value> {
    schema
        .fields
        .iter()
        .filter_map(|f| lookup(v, &f.key).map(|x| (f.key.clone(), f.ty.coerce_json(x))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nullable::{NullBool, NullDateTime, NullInt, NullString};
    use chrono::{TimeZone, Utc};
    use crate::schema::EntityConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Comment {
        id: NullInt,
        body: NullString,
    }

    impl Record for Comment {
        fn entity() -> EntityConfig {
            EntityConfig::new("comments", "comments", "c", "1")
        }

        fn visit(&mut self, v: &mut dyn FieldVisitor) {
            v.field(&Tag::new("id", "c.id"), &mut self.id);
            v.field(&Tag::new("body", "c.body"), &mut self.body);
        }
    }

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Post {
        id: NullInt,
        published: NullBool,
        author_name: NullString,
        comments: Vec<Comment>,
    }

    impl Record for Post {
        fn entity() -> EntityConfig {
            EntityConfig::new("posts", "posts", "p", "1")
        }

        fn visit(&mut self, v: &mut dyn FieldVisitor) {
            v.field(&Tag::new("id", "p.id"), &mut self.id);
            v.field(&Tag::new("published", "p.published"), &mut self.published);
            v.field(&Tag::new("author.name,omitempty", "u.name"), &mut self.author_name);
            v.children(&Tag::new("comments", "post_id={id}"), &mut self.comments);
        }
    }

    #[test]
    fn typed_unmarshal_coerces_and_recurses() {
        let v = json!({
            "id": "7",
            "published": "t",
            "author": {"name": "Ann"},
            "comments": [{"id": 1, "body": "hi"}, {"id": "x"}]
        });
        let post: Post = unmarshal(&v);
        assert_eq!(post.id, NullInt::new(7));
        assert_eq!(post.published, NullBool::new(true));
        assert_eq!(post.author_name, NullString::new("Ann".into()));
        assert_eq!(post.comments.len(), 2);
        assert!(!post.comments[1].id.is_valid());
        assert!(!post.comments[1].body.is_valid());
    }

    #[test]
    fn flat_input_is_accepted() {
        let post: Post = unmarshal(&json!({"author.name": "Bo"}));
        assert_eq!(post.author_name, NullString::new("Bo".into()));
        assert!(!post.id.is_valid());
    }

    #[test]
    fn marshal_is_structured() {
        let post = Post {
            id: NullInt::new(1),
            published: NullBool::null(),
            author_name: NullString::new("Ann".into()),
            comments: vec![Comment {
                id: NullInt::new(2),
                body: NullString::null(),
            }],
        };
        assert_eq!(
            marshal(&post),
            json!({
                "id": 1,
                "published": null,
                "author": {"name": "Ann"},
                "comments": [{"id": 2, "body": null}]
            })
        );
        assert_eq!(unmarshal::<Post>(&marshal(&post)), post);
    }

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Event {
        id: NullInt,
        score: NullInt,
        note: NullString,
        at: NullDateTime,
    }

    impl Record for Event {
        fn entity() -> EntityConfig {
            EntityConfig::new("events", "events", "e", "1")
        }

        fn visit(&mut self, v: &mut dyn FieldVisitor) {
            v.field(&Tag::new("id", "e.id"), &mut self.id);
            v.field(&Tag::new("score,omitempty", "e.score"), &mut self.score);
            v.field(&Tag::new("note,omitempty", "e.note"), &mut self.note);
            v.field(&Tag::new("at,omitempty", "e.at"), &mut self.at);
        }
    }

    #[test]
    fn omitempty_drops_invalid_and_epoch_values() {
        let event = Event {
            id: NullInt::null(),
            score: NullInt::new(0),
            note: NullString::null(),
            at: NullDateTime::new(Utc.timestamp_opt(0, 0).unwrap()),
        };
        assert_eq!(marshal(&event), json!({"id": null, "score": 0}));
    }

    #[test]
    fn omitempty_keeps_set_values() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let event = Event {
            id: NullInt::new(1),
            score: NullInt::new(3),
            note: NullString::new("hi".into()),
            at: NullDateTime::new(at),
        };
        let v = marshal(&event);
        assert_eq!(v["note"], json!("hi"));
        assert!(v.get("at").is_some());
        assert_eq!(unmarshal::<Event>(&v), event);
    }

    #[test]
    fn omitempty_flag_is_read_after_the_key() {
        assert!(Tag::new("author.name,omitempty", "u.name").omit_empty());
        assert!(!Tag::new("author.name", "u.name").omit_empty());
        assert_eq!(Tag::new("author.name,omitempty", "u.name").key(), "author.name");
    }
}
