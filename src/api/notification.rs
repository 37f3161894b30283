use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::notification::{
    create_notification, dismiss_all_notifications, dismiss_notification, get_notification_count,
    get_notifications,
};

pub fn notification_routes() -> Router<PgPool> {
    Router::new()
        .route(
            "/notifications",
            post(create_notification).get(get_notifications),
        )
        .route("/notifications/count", get(get_notification_count))
        .route(
            "/notifications/dismiss-all",
            post(dismiss_all_notifications),
        )
        .route(
            "/notifications/{notification_id}/dismiss",
            post(dismiss_notification),
        )
}
