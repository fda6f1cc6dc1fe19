pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

#[cfg(test)]
pub mod memory;

use axum::{extract::DefaultBodyLimit, Router};

use crate::state::AppState;

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024; // 10MB

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::account_routes())
        .merge(handlers::profile_routes())
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}
