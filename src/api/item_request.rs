use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::item_request::{
    cancel_my_request, get_all_requests, get_my_requests, review_item_request,
    submit_add_item_request, submit_request_item_request,
};

pub fn item_request_routes() -> Router<PgPool> {
    Router::new()
        .route("/all-requests", get(get_all_requests))
        .route("/requests/{request_id}/review", patch(review_item_request))
        .route("/item-requests/add-item", post(submit_add_item_request))
        .route(
            "/item-requests/request-item",
            post(submit_request_item_request),
        )
        .route("/my-requests", get(get_my_requests))
        .route("/my-requests/{request_id}", delete(cancel_my_request))
}
