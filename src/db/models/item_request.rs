use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::db::models::item::{parse_wire_date, ItemCondition};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_request_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemRequestType {
    AddItem,
    RequestItem,
}

impl fmt::Display for ItemRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemRequestType::AddItem => "ADD_ITEM",
            ItemRequestType::RequestItem => "REQUEST_ITEM",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ItemRequestType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ADD_ITEM" => Ok(ItemRequestType::AddItem),
            "REQUEST_ITEM" => Ok(ItemRequestType::RequestItem),
            other => Err(format!(
                "Invalid request type '{other}', expected ADD_ITEM or REQUEST_ITEM"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "item_request_status")]
pub enum ItemRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ItemRequestStatus {
    /// Parses a reviewer's target status. Only `Approved` and `Rejected` are
    /// legal decisions; everything else is rejected before the request is
    /// even looked up.
    pub fn parse_decision(value: &str) -> Result<ItemRequestStatus, String> {
        match value {
            "Approved" => Ok(ItemRequestStatus::Approved),
            "Rejected" => Ok(ItemRequestStatus::Rejected),
            other => Err(format!(
                "Invalid review status '{other}', expected Approved or Rejected"
            )),
        }
    }
}

impl fmt::Display for ItemRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemRequestStatus::Pending => "Pending",
            ItemRequestStatus::Approved => "Approved",
            ItemRequestStatus::Rejected => "Rejected",
            ItemRequestStatus::Cancelled => "Cancelled",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ItemRequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(ItemRequestStatus::Pending),
            "Approved" => Ok(ItemRequestStatus::Approved),
            "Rejected" => Ok(ItemRequestStatus::Rejected),
            "Cancelled" => Ok(ItemRequestStatus::Cancelled),
            other => Err(format!(
                "Invalid status '{other}', expected one of Pending, Approved, Rejected, Cancelled"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        };
        write!(f, "{label}")
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Low" => Ok(Urgency::Low),
            "Medium" => Ok(Urgency::Medium),
            "High" => Ok(Urgency::High),
            other => Err(format!(
                "Invalid urgency '{other}', expected one of Low, Medium, High"
            )),
        }
    }
}

/// Type-specific payload of an item request, stored as JSONB with the
/// request type as the tag.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(tag = "request_type")]
pub enum ItemRequestDetails {
    #[serde(rename = "ADD_ITEM")]
    AddItem(AddItemDetails),
    #[serde(rename = "REQUEST_ITEM")]
    RequestItem(RequestItemDetails),
}

impl ItemRequestDetails {
    pub fn request_type(&self) -> ItemRequestType {
        match self {
            ItemRequestDetails::AddItem(_) => ItemRequestType::AddItem,
            ItemRequestDetails::RequestItem(_) => ItemRequestType::RequestItem,
        }
    }

    pub fn item_name(&self) -> &str {
        match self {
            ItemRequestDetails::AddItem(details) => &details.item_name,
            ItemRequestDetails::RequestItem(details) => &details.item_name,
        }
    }

    pub fn category_id(&self) -> Option<i32> {
        match self {
            ItemRequestDetails::AddItem(details) => details.category_id,
            ItemRequestDetails::RequestItem(details) => details.category_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct AddItemDetails {
    pub item_name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<i32>,
    pub condition: ItemCondition,
    pub available_from: Option<NaiveDate>,
    pub available_until: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct RequestItemDetails {
    pub item_name: String,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub urgency: Urgency,
    pub needed_by: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ItemRequest {
    pub id: i32,
    pub request_type: ItemRequestType,
    pub requested_by: i32,
    #[schema(value_type = ItemRequestDetails)]
    pub details: Json<ItemRequestDetails>,
    pub status: ItemRequestStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub created_item_id: Option<i32>,
    pub requested_at: NaiveDateTime,
    pub reviewed_at: Option<NaiveDateTime>,
}

/// Admin listing row with requester and reviewer usernames joined in.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ItemRequestDetailRow {
    pub id: i32,
    pub request_type: ItemRequestType,
    pub requested_by: i32,
    pub requester_username: String,
    #[schema(value_type = ItemRequestDetails)]
    pub details: Json<ItemRequestDetails>,
    pub status: ItemRequestStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewer_username: Option<String>,
    pub created_item_id: Option<i32>,
    pub requested_at: NaiveDateTime,
    pub reviewed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAddItem {
    pub item_name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<i32>,
    pub condition: String,
    pub available_from: Option<String>,
    pub available_until: Option<String>,
}

impl SubmitAddItem {
    pub fn into_details(self) -> Result<AddItemDetails, String> {
        if self.item_name.trim().is_empty() {
            return Err("item_name is required".to_string());
        }
        let condition: ItemCondition = self.condition.parse()?;
        let available_from = self
            .available_from
            .as_deref()
            .map(|raw| parse_wire_date("available_from", raw))
            .transpose()?;
        let available_until = self
            .available_until
            .as_deref()
            .map(|raw| parse_wire_date("available_until", raw))
            .transpose()?;
        Ok(AddItemDetails {
            item_name: self.item_name,
            description: self.description,
            image: self.image,
            category_id: self.category_id,
            condition,
            available_from,
            available_until,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequestItem {
    pub item_name: String,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub urgency: Option<String>,
    pub needed_by: Option<String>,
}

impl SubmitRequestItem {
    pub fn into_details(self) -> Result<RequestItemDetails, String> {
        if self.item_name.trim().is_empty() {
            return Err("item_name is required".to_string());
        }
        let urgency = match self.urgency.as_deref() {
            Some(raw) => raw.parse()?,
            None => Urgency::Medium,
        };
        let needed_by = self
            .needed_by
            .as_deref()
            .map(|raw| parse_wire_date("needed_by", raw))
            .transpose()?;
        Ok(RequestItemDetails {
            item_name: self.item_name,
            description: self.description,
            category_id: self.category_id,
            urgency,
            needed_by,
        })
    }
}

/// Body of `PATCH /requests/{request_id}/review`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItemRequest {
    pub status: String,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequestFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub request_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_accepts_only_approved_or_rejected() {
        assert_eq!(
            ItemRequestStatus::parse_decision("Approved"),
            Ok(ItemRequestStatus::Approved)
        );
        assert_eq!(
            ItemRequestStatus::parse_decision("Rejected"),
            Ok(ItemRequestStatus::Rejected)
        );
        assert!(ItemRequestStatus::parse_decision("Pending").is_err());
        assert!(ItemRequestStatus::parse_decision("Cancelled").is_err());
        assert!(ItemRequestStatus::parse_decision("approved").is_err());
        assert!(ItemRequestStatus::parse_decision("").is_err());
    }

    #[test]
    fn details_tag_round_trips() {
        let details = ItemRequestDetails::AddItem(AddItemDetails {
            item_name: "Chess Set".to_string(),
            description: None,
            image: None,
            category_id: Some(3),
            condition: ItemCondition::Good,
            available_from: None,
            available_until: None,
        });
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["request_type"], "ADD_ITEM");
        assert_eq!(value["item_name"], "Chess Set");

        let parsed: ItemRequestDetails = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.request_type(), ItemRequestType::AddItem);
        assert_eq!(parsed.item_name(), "Chess Set");
    }

    #[test]
    fn details_reject_unknown_tag() {
        let result: Result<ItemRequestDetails, _> = serde_json::from_value(serde_json::json!({
            "request_type": "BORROW_ITEM",
            "item_name": "Atlas"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn add_item_submission_validates_condition_and_dates() {
        let good = SubmitAddItem {
            item_name: "Globe".to_string(),
            description: None,
            image: None,
            category_id: None,
            condition: "Fair".to_string(),
            available_from: Some("2025-06-01".to_string()),
            available_until: None,
        };
        let details = good.into_details().unwrap();
        assert_eq!(details.condition, ItemCondition::Fair);
        assert!(details.available_from.is_some());

        let bad_condition = SubmitAddItem {
            item_name: "Globe".to_string(),
            description: None,
            image: None,
            category_id: None,
            condition: "Mint".to_string(),
            available_from: None,
            available_until: None,
        };
        assert!(bad_condition.into_details().is_err());

        let bad_date = SubmitAddItem {
            item_name: "Globe".to_string(),
            description: None,
            image: None,
            category_id: None,
            condition: "Good".to_string(),
            available_from: Some("June 1st".to_string()),
            available_until: None,
        };
        assert!(bad_date.into_details().is_err());
    }

    #[test]
    fn request_item_submission_defaults_urgency() {
        let submit = SubmitRequestItem {
            item_name: "Field Guide".to_string(),
            description: None,
            category_id: None,
            urgency: None,
            needed_by: None,
        };
        assert_eq!(submit.into_details().unwrap().urgency, Urgency::Medium);

        let explicit = SubmitRequestItem {
            item_name: "Field Guide".to_string(),
            description: None,
            category_id: None,
            urgency: Some("High".to_string()),
            needed_by: None,
        };
        assert_eq!(explicit.into_details().unwrap().urgency, Urgency::High);

        let invalid = SubmitRequestItem {
            item_name: "Field Guide".to_string(),
            description: None,
            category_id: None,
            urgency: Some("urgent".to_string()),
            needed_by: None,
        };
        assert!(invalid.into_details().is_err());
    }

    #[test]
    fn review_body_keeps_camel_case_admin_notes() {
        let body: ReviewItemRequest = serde_json::from_value(serde_json::json!({
            "status": "Rejected",
            "adminNotes": "Out of print"
        }))
        .unwrap();
        assert_eq!(body.admin_notes.as_deref(), Some("Out of print"));
    }

    #[test]
    fn submission_bodies_use_camel_case_keys() {
        let add: SubmitAddItem = serde_json::from_value(serde_json::json!({
            "itemName": "Globe",
            "categoryId": 3,
            "condition": "Good",
            "availableFrom": "2025-06-01"
        }))
        .unwrap();
        assert_eq!(add.item_name, "Globe");
        assert_eq!(add.category_id, Some(3));
        assert_eq!(add.available_from.as_deref(), Some("2025-06-01"));

        let request: SubmitRequestItem = serde_json::from_value(serde_json::json!({
            "itemName": "Field Guide",
            "neededBy": "2025-07-01"
        }))
        .unwrap();
        assert_eq!(request.item_name, "Field Guide");
        assert_eq!(request.needed_by.as_deref(), Some("2025-07-01"));
    }

    #[test]
    fn filter_params_use_camel_case_request_type() {
        let params: ItemRequestFilterParams = serde_json::from_value(serde_json::json!({
            "requestType": "ADD_ITEM",
            "status": "Pending"
        }))
        .unwrap();
        assert_eq!(params.request_type.as_deref(), Some("ADD_ITEM"));
    }

    #[test]
    fn blank_item_name_is_rejected() {
        let submit = SubmitRequestItem {
            item_name: "   ".to_string(),
            description: None,
            category_id: None,
            urgency: None,
            needed_by: None,
        };
        assert!(submit.into_details().is_err());
    }
}
