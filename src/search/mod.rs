use crate::state::AppState;
use axum::Router;

pub mod client;
mod dto;
pub mod format;
pub mod handlers;

pub fn router() -> Router<AppState> {
    handlers::search_routes()
}
