//! Query-string grammar and the SQL compiler.

pub mod compiler;
pub mod params;

pub use compiler::{instantiate, Compiler, Plan};
pub use params::{Aggregate, Filter, ParsedQuery, Search, SelectItem, SortItem};

/// Page-size limits for list queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    pub default_per_page: u64,
    pub max_per_page: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            default_per_page: 10,
            max_per_page: 100,
        }
    }
}
