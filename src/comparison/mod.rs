mod dto;
pub mod handlers;
pub mod persistence;
pub mod registry;
pub mod selection;
pub mod session;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::session_routes())
        .merge(handlers::selection_routes())
}
