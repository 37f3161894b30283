use axum::{routing::get, Router};
use sqlx::PgPool;

use crate::db::queries::category::{create_category, get_categories};

pub fn category_routes() -> Router<PgPool> {
    Router::new().route("/categories", get(get_categories).post(create_category))
}
