//! Row and payload shaping: flat/structured JSON and typed record conversion.

mod flat;
mod typed;

pub use flat::{to_flat, to_structured, Separator, ShapeExt};
pub use typed::{lookup, marshal, unmarshal, unmarshal_schema};
