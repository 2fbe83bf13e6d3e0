pub mod deep_link;
mod dto;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod repo;
pub mod repo_types;
pub mod resolver;
pub mod source;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::read_routes())
}
