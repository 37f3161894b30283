use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::waitlist::{
    allocate_to_queue_head, get_item_waitlist, get_my_waitlist, join_waitlist,
    withdraw_from_waitlist,
};

pub fn waitlist_routes() -> Router<PgPool> {
    Router::new()
        .route(
            "/items/{item_id}/waitlist",
            post(join_waitlist)
                .delete(withdraw_from_waitlist)
                .get(get_item_waitlist),
        )
        .route(
            "/items/{item_id}/waitlist/allocate",
            post(allocate_to_queue_head),
        )
        .route("/waitlist/mine", get(get_my_waitlist))
}
