use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

/// Lending period, in days, applied to every item created by the donation
/// and shared-item workflows.
pub const DEFAULT_LENDING_PERIOD: i32 = 14;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_condition")]
pub enum ItemCondition {
    New,
    Good,
    Fair,
    Poor,
}

impl ItemCondition {
    pub const ALL: [ItemCondition; 4] = [
        ItemCondition::New,
        ItemCondition::Good,
        ItemCondition::Fair,
        ItemCondition::Poor,
    ];
}

impl fmt::Display for ItemCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemCondition::New => "New",
            ItemCondition::Good => "Good",
            ItemCondition::Fair => "Fair",
            ItemCondition::Poor => "Poor",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ItemCondition {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "New" => Ok(ItemCondition::New),
            "Good" => Ok(ItemCondition::Good),
            "Fair" => Ok(ItemCondition::Fair),
            "Poor" => Ok(ItemCondition::Poor),
            other => Err(format!(
                "Invalid condition '{other}', expected one of New, Good, Fair, Poor"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_status")]
pub enum ItemStatus {
    Available,
    #[sqlx(rename = "Donation Pending")]
    #[serde(rename = "Donation Pending")]
    DonationPending,
    Unavailable,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemStatus::Available => "Available",
            ItemStatus::DonationPending => "Donation Pending",
            ItemStatus::Unavailable => "Unavailable",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Available" => Ok(ItemStatus::Available),
            "Donation Pending" => Ok(ItemStatus::DonationPending),
            "Unavailable" => Ok(ItemStatus::Unavailable),
            other => Err(format!(
                "Invalid item status '{other}', expected one of Available, Donation Pending, Unavailable"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_type")]
pub enum ItemType {
    Library,
    Shared,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemType::Library => "Library",
            ItemType::Shared => "Shared",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Item {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub price: Option<BigDecimal>,
    pub category_id: Option<i32>,
    pub subcategory: Option<String>,
    pub condition: ItemCondition,
    pub quantity: i32,
    pub available_copies: i32,
    pub status: ItemStatus,
    pub item_type: ItemType,
    pub barcode: String,
    pub default_lending_period: i32,
    pub owner_id: Option<i32>,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Column values for an item insert. The barcode is generated by the insert
/// helper, not supplied here.
#[derive(Debug)]
pub struct NewItem {
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub price: Option<BigDecimal>,
    pub category_id: Option<i32>,
    pub subcategory: Option<String>,
    pub condition: ItemCondition,
    pub quantity: i32,
    pub available_copies: i32,
    pub status: ItemStatus,
    pub item_type: ItemType,
    pub default_lending_period: i32,
    pub owner_id: Option<i32>,
    pub created_by: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub price: Option<BigDecimal>,
    pub category_id: Option<i32>,
    pub subcategory: Option<String>,
    pub condition: Option<String>,
    pub quantity: Option<i32>,
    pub available_copies: Option<i32>,
    pub status: Option<String>,
    pub default_lending_period: Option<i32>,
}

impl UpdateItem {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.isbn.is_none()
            && self.description.is_none()
            && self.publisher.is_none()
            && self.publication_year.is_none()
            && self.price.is_none()
            && self.category_id.is_none()
            && self.subcategory.is_none()
            && self.condition.is_none()
            && self.quantity.is_none()
            && self.available_copies.is_none()
            && self.status.is_none()
            && self.default_lending_period.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub item_type: Option<String>,
    pub condition: Option<String>,
    pub category_id: Option<i32>,
    pub search: Option<String>,
}

/// Date string from a request body, `YYYY-MM-DD`.
pub fn parse_wire_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid {field} '{value}', expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parses_exact_labels_only() {
        assert_eq!("Good".parse::<ItemCondition>(), Ok(ItemCondition::Good));
        assert!("good".parse::<ItemCondition>().is_err());
        assert!("Excellent".parse::<ItemCondition>().is_err());
    }

    #[test]
    fn donation_pending_label_round_trips() {
        let status: ItemStatus = "Donation Pending".parse().unwrap();
        assert_eq!(status, ItemStatus::DonationPending);
        assert_eq!(status.to_string(), "Donation Pending");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"Donation Pending\"");
    }

    #[test]
    fn filter_and_update_bodies_use_camel_case_keys() {
        let params: ItemFilterParams = serde_json::from_value(serde_json::json!({
            "itemType": "Shared",
            "categoryId": 5,
            "search": "atlas"
        }))
        .unwrap();
        assert_eq!(params.item_type.as_deref(), Some("Shared"));
        assert_eq!(params.category_id, Some(5));

        let update: UpdateItem = serde_json::from_value(serde_json::json!({
            "status": "Available",
            "availableCopies": 2,
            "defaultLendingPeriod": 7
        }))
        .unwrap();
        assert_eq!(update.available_copies, Some(2));
        assert_eq!(update.default_lending_period, Some(7));
        assert!(!update.is_empty());
    }

    #[test]
    fn wire_date_parsing() {
        assert_eq!(
            parse_wire_date("available_date", "2025-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert!(parse_wire_date("available_date", "03/01/2025").is_err());
        assert!(parse_wire_date("available_date", "not-a-date").is_err());
    }
}
