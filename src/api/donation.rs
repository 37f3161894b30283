use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::donation::{
    create_donation, get_donation, get_donations, get_my_donations, process_donation,
    review_donation,
};

pub fn donation_routes() -> Router<PgPool> {
    Router::new()
        .route("/donations", get(get_donations).post(create_donation))
        .route("/donations/mine", get(get_my_donations))
        .route(
            "/donations/{donation_id}",
            get(get_donation).patch(review_donation),
        )
        .route("/donations/{donation_id}/process", post(process_donation))
}
