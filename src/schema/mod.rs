//! Declarative entity descriptions and the process-wide registry built from them.

pub mod loader;
pub mod record;
pub mod resolved;
pub mod types;
pub mod validator;

pub use loader::{load_dir, parse_constraints, parse_db_annotation, resolve, RegistryBuilder};
pub use record::{describe, output_key, ChildSlot, FieldSlot, FieldVisitor, Record, Tag};
pub use resolved::*;
pub use types::*;
pub use validator::validate;
