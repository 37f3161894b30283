use axum::{routing::get, Router};
use sqlx::PgPool;

use crate::db::queries::item::{get_item, get_items, update_item};

pub fn item_routes() -> Router<PgPool> {
    Router::new()
        .route("/items", get(get_items))
        .route("/items/{item_id}", get(get_item).patch(update_item))
}
