use crate::state::AppState;
use axum::Router;

pub mod archive;
mod dto;
pub mod handlers;

pub fn router() -> Router<AppState> {
    handlers::dataset_routes()
}
