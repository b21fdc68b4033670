//! Request extractors.

mod lang;
pub use lang::{preferred, Lang};
