use axum::{
    routing::{get, patch},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::user::{get_all_users, get_me, get_user, update_user_lock, update_user_role};

pub fn user_routes() -> Router<PgPool> {
    Router::new()
        .route("/users", get(get_all_users))
        .route("/users/me", get(get_me))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/role", patch(update_user_role))
        .route("/users/{id}/lock", patch(update_user_lock))
}
