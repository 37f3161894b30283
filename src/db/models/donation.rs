use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::db::models::item::ItemCondition;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "donation_status")]
pub enum DonationStatus {
    Pending,
    Accepted,
    Rejected,
    Received,
    Processed,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 5] = [
        DonationStatus::Pending,
        DonationStatus::Accepted,
        DonationStatus::Rejected,
        DonationStatus::Received,
        DonationStatus::Processed,
    ];

    /// Statuses reachable from `self` through a reviewer action. Does not
    /// include `self`; idempotent re-writes are handled by
    /// [`can_transition_to`](Self::can_transition_to).
    pub fn allowed_transitions(self) -> &'static [DonationStatus] {
        match self {
            DonationStatus::Pending => &[DonationStatus::Accepted, DonationStatus::Rejected],
            DonationStatus::Accepted => &[DonationStatus::Received, DonationStatus::Rejected],
            DonationStatus::Received => &[DonationStatus::Processed],
            DonationStatus::Rejected | DonationStatus::Processed => &[],
        }
    }

    /// A transition to the current status is always permitted; anything else
    /// must appear in the transition table.
    pub fn can_transition_to(self, next: DonationStatus) -> bool {
        next == self || self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DonationStatus::Pending => "Pending",
            DonationStatus::Accepted => "Accepted",
            DonationStatus::Rejected => "Rejected",
            DonationStatus::Received => "Received",
            DonationStatus::Processed => "Processed",
        };
        write!(f, "{label}")
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(DonationStatus::Pending),
            "Accepted" => Ok(DonationStatus::Accepted),
            "Rejected" => Ok(DonationStatus::Rejected),
            "Received" => Ok(DonationStatus::Received),
            "Processed" => Ok(DonationStatus::Processed),
            other => Err(format!(
                "Invalid status '{other}', expected one of Pending, Accepted, Rejected, Received, Processed"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct DonationPhoto {
    pub url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Donation {
    pub id: i32,
    pub user_id: i32,
    pub item_name: String,
    pub description: Option<String>,
    pub condition: ItemCondition,
    pub available_date: Option<NaiveDate>,
    pub status: DonationStatus,
    pub notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub review_date: Option<NaiveDateTime>,
    pub received_date: Option<NaiveDateTime>,
    pub processed_item_id: Option<i32>,
    #[schema(value_type = Vec<DonationPhoto>)]
    pub photos: Json<Vec<DonationPhoto>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Donation with its user, reviewer, and processed-item references expanded
/// for detail views.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DonationDetail {
    pub id: i32,
    pub user_id: i32,
    pub donor_username: String,
    pub item_name: String,
    pub description: Option<String>,
    pub condition: ItemCondition,
    pub available_date: Option<NaiveDate>,
    pub status: DonationStatus,
    pub notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewer_username: Option<String>,
    pub review_date: Option<NaiveDateTime>,
    pub received_date: Option<NaiveDateTime>,
    pub processed_item_id: Option<i32>,
    pub processed_item_title: Option<String>,
    pub processed_item_barcode: Option<String>,
    #[schema(value_type = Vec<DonationPhoto>)]
    pub photos: Json<Vec<DonationPhoto>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDonation {
    pub item_name: String,
    pub description: Option<String>,
    pub condition: String,
    pub available_date: Option<String>,
    pub photos: Option<Vec<DonationPhoto>>,
}

/// Body of the reviewer's status change, `PATCH /donations/{donation_id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DonationReview {
    pub status: String,
    pub notes: Option<String>,
}

/// Optional overrides for the inventory item created when a received
/// donation is processed. Absent fields fall back to the donation's own
/// item name and description.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDonation {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub price: Option<bigdecimal::BigDecimal>,
    pub category_id: Option<i32>,
    pub subcategory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonationFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Exclusive end of a `toDate` filter: the filter covers the whole named
/// day, so rows are matched with `created_at < exclusive_date_end(to_date)`.
pub fn exclusive_date_end(to_date: NaiveDate) -> NaiveDate {
    to_date.succ_opt().unwrap_or(to_date)
}

/// Per-status totals returned alongside the staff donation listing.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DonationStatusCounts {
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub received: i64,
    pub processed: i64,
}

impl DonationStatusCounts {
    pub fn record(&mut self, status: DonationStatus, count: i64) {
        match status {
            DonationStatus::Pending => self.pending = count,
            DonationStatus::Accepted => self.accepted = count,
            DonationStatus::Rejected => self.rejected = count,
            DonationStatus::Received => self.received = count,
            DonationStatus::Processed => self.processed = count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_transition_table() {
        use DonationStatus::*;
        let legal = [
            (Pending, Accepted),
            (Pending, Rejected),
            (Accepted, Received),
            (Accepted, Rejected),
            (Received, Processed),
        ];
        for current in DonationStatus::ALL {
            for next in DonationStatus::ALL {
                let expected = current == next || legal.contains(&(current, next));
                assert_eq!(
                    current.can_transition_to(next),
                    expected,
                    "{current} -> {next}"
                );
            }
        }
    }

    #[test]
    fn accepted_cannot_skip_to_processed() {
        assert!(!DonationStatus::Accepted.can_transition_to(DonationStatus::Processed));
        assert!(DonationStatus::Accepted.can_transition_to(DonationStatus::Received));
    }

    #[test]
    fn terminal_statuses_only_allow_themselves() {
        for terminal in [DonationStatus::Rejected, DonationStatus::Processed] {
            assert!(terminal.is_terminal());
            for next in DonationStatus::ALL {
                assert_eq!(terminal.can_transition_to(next), next == terminal);
            }
        }
    }

    #[test]
    fn same_status_is_always_permitted() {
        for status in DonationStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn status_parsing_is_exact() {
        assert_eq!(
            "Received".parse::<DonationStatus>(),
            Ok(DonationStatus::Received)
        );
        assert!("received".parse::<DonationStatus>().is_err());
        assert!("Approved".parse::<DonationStatus>().is_err());
        assert!("".parse::<DonationStatus>().is_err());
    }

    #[test]
    fn submission_body_uses_camel_case_keys() {
        let body: NewDonation = serde_json::from_value(serde_json::json!({
            "itemName": "Desk Lamp",
            "description": "Works fine",
            "condition": "Good",
            "availableDate": "2025-05-01",
            "photos": [{ "url": "https://cdn.example/lamp.jpg", "caption": null }]
        }))
        .unwrap();
        assert_eq!(body.item_name, "Desk Lamp");
        assert_eq!(body.available_date.as_deref(), Some("2025-05-01"));
        assert_eq!(body.photos.unwrap().len(), 1);
    }

    #[test]
    fn filter_params_use_camel_case_date_keys() {
        let params: DonationFilterParams = serde_json::from_value(serde_json::json!({
            "status": "Pending",
            "fromDate": "2025-01-01",
            "toDate": "2025-01-31"
        }))
        .unwrap();
        assert_eq!(
            params.from_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
        assert_eq!(
            params.to_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap())
        );
    }

    #[test]
    fn to_date_filter_covers_the_whole_day() {
        let end = exclusive_date_end(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        // The last representable date has no successor and stays put.
        assert_eq!(exclusive_date_end(NaiveDate::MAX), NaiveDate::MAX);
    }

    #[test]
    fn status_counts_record_each_bucket() {
        let mut counts = DonationStatusCounts::default();
        counts.record(DonationStatus::Pending, 4);
        counts.record(DonationStatus::Processed, 2);
        assert_eq!(counts.pending, 4);
        assert_eq!(counts.processed, 2);
        assert_eq!(counts.accepted, 0);
    }
}
