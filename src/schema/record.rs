//! Record descriptors: typed structs that describe their own fields to a visitor.
//!
//! A record implements [`Record::visit`] by handing each field's [`Tag`] and a mutable slot
//! to the visitor. The same walk reads the annotations ([`describe`]), fills a record from
//! JSON (`shape::unmarshal`) and renders it back (`shape::marshal`).
//!
//! ```ignore
//! impl Record for Article {
//!     fn entity() -> EntityConfig {
//!         EntityConfig::new("articles", "articles", "a", "1")
//!     }
//!     fn visit(&mut self, v: &mut dyn FieldVisitor) {
//!         v.field(&Tag::new("id", "a.id"), &mut self.id);
//!         v.field(&Tag::new("author.name", "u.name"), &mut self.author_name);
//!         v.children(&Tag::new("comments", "article_id={id}"), &mut self.comments);
//!     }
//! }
//! ```

use crate::nullable::{Nullable, Payload, ScalarType};
use crate::schema::types::{ChildConfig, EntityConfig, FieldConfig};
use serde_json::Value;

/// Field annotations. For array children `db` holds the child filter template.
#[derive(Clone, Copy, Debug)]
pub struct Tag {
    pub json: &'static str,
    pub db: &'static str,
    pub validate: &'static str,
}

impl Tag {
    pub const fn new(json: &'static str, db: &'static str) -> Self {
        Tag {
            json,
            db,
            validate: "",
        }
    }

    pub const fn validate(self, validate: &'static str) -> Self {
        Tag { validate, ..self }
    }

    pub fn key(&self) -> &'static str {
        output_key(self.json)
    }

    /// `omitempty` among the flags after the output key.
    pub fn omit_empty(&self) -> bool {
        self.json.split(',').skip(1).any(|f| f.trim() == "omitempty")
    }
}

/// First comma component of an output-name annotation.
pub fn output_key(json: &str) -> &str {
    json.split(',').next().unwrap_or("").trim()
}

/// A scalar field slot.
pub trait FieldSlot {
    fn scalar_type(&self) -> ScalarType;
    fn set_json(&mut self, v: &Value);
    fn to_json(&self) -> Value;
    fn is_zero(&self) -> bool;
}

impl<T: Payload> FieldSlot for Nullable<T> {
    fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }

    fn set_json(&mut self, v: &Value) {
        *self = Nullable::from_json(v);
    }

    fn to_json(&self) -> Value {
        Nullable::to_json(self)
    }

    fn is_zero(&self) -> bool {
        Nullable::is_zero(self)
    }
}

/// An array-of-records slot.
pub trait ChildSlot {
    fn entity(&self) -> String;
    fn set_json(&mut self, items: &[Value]);
    fn to_json(&self) -> Vec<Value>;
}

impl<R: Record> ChildSlot for Vec<R> {
    fn entity(&self) -> String {
        R::entity().name
    }

    fn set_json(&mut self, items: &[Value]) {
        *self = items.iter().map(crate::shape::unmarshal::<R>).collect();
    }

    fn to_json(&self) -> Vec<Value> {
        self.iter().map(crate::shape::marshal).collect()
    }
}

pub trait FieldVisitor {
    fn field(&mut self, tag: &Tag, slot: &mut dyn FieldSlot);
    fn children(&mut self, tag: &Tag, slot: &mut dyn ChildSlot);
}

pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Entity identity: name, table, alias, version, relations, filters, sorts.
    /// Fields and children come from [`Record::visit`].
    fn entity() -> EntityConfig;

    fn visit(&mut self, visitor: &mut dyn FieldVisitor);
}

#[derive(Default)]
struct TagReader {
    fields: Vec<FieldConfig>,
    children: Vec<ChildConfig>,
}

impl FieldVisitor for TagReader {
    fn field(&mut self, tag: &Tag, slot: &mut dyn FieldSlot) {
        self.fields.push(FieldConfig {
            json: tag.json.to_string(),
            db: tag.db.to_string(),
            type_: slot.scalar_type(),
            validate: (!tag.validate.is_empty()).then(|| tag.validate.to_string()),
        });
    }

    fn children(&mut self, tag: &Tag, slot: &mut dyn ChildSlot) {
        self.children.push(ChildConfig {
            key: tag.key().to_string(),
            entity: slot.entity(),
            filter: tag.db.to_string(),
        });
    }
}

/// Read a record type's annotations into an entity config.
pub fn describe<R: Record>() -> EntityConfig {
    let mut config = R::entity();
    let mut reader = TagReader::default();
    R::default().visit(&mut reader);
    config.fields.extend(reader.fields);
    config.children.extend(reader.children);
    config
}
