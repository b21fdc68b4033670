//! Entity CRUD routes. Handlers resolve the entity from the collection segment.

use crate::handlers::entity::{create, delete as delete_handler, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:collection", get(list).post(create))
        .route(
            "/:collection/:id",
            get(read).put(update).delete(delete_handler),
        )
        .with_state(state)
}
