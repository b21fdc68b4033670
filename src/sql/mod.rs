//! Safe SQL building: identifiers from schemas only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
