use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "waitlist_status")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Allocated,
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitlistStatus::Waiting => "Waiting",
            WaitlistStatus::Notified => "Notified",
            WaitlistStatus::Allocated => "Allocated",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WaitlistEntry {
    pub id: i32,
    pub item_id: i32,
    pub user_id: i32,
    pub queue_position: Option<i32>,
    pub status: WaitlistStatus,
    pub created_at: NaiveDateTime,
    pub notified_at: Option<NaiveDateTime>,
    pub allocated_at: Option<NaiveDateTime>,
}

/// Queue entry with the item and user expanded for listings.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WaitlistEntryDetail {
    pub id: i32,
    pub item_id: i32,
    pub item_title: String,
    pub user_id: i32,
    pub username: String,
    pub queue_position: Option<i32>,
    pub status: WaitlistStatus,
    pub created_at: NaiveDateTime,
    pub notified_at: Option<NaiveDateTime>,
    pub allocated_at: Option<NaiveDateTime>,
}
