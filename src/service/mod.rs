//! Request pipeline over an injected SQL executor.

mod crud;
mod executor;
mod validation;
pub use crud::CrudService;
pub use executor::{PgExecutor, SqlExecutor};
pub use validation::RequestValidator;
