use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::models::donation::DonationStatus;
use crate::db::models::item_request::{ItemRequestDetails, ItemRequestStatus};
use crate::db::models::notification::NotificationTargetInput;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in notification operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid target provided: {0}")]
    InvalidTarget(String),

    #[error("Failed to serialize notification data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Notification builder for creating system notifications
pub struct NotificationBuilder {
    title: String,
    body: Option<String>,
    notification_type: String,
    targets: Vec<NotificationTargetInput>,
    action_type: Option<String>,
    action_data: Option<Value>,
    dismissible: bool,
    expires_in_days: Option<i64>,
}

impl NotificationBuilder {
    /// Create a new notification builder with required fields
    pub fn new(title: impl Into<String>, notification_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            notification_type: notification_type.into(),
            targets: Vec::new(),
            action_type: None,
            action_data: None,
            dismissible: true,
            expires_in_days: Some(14),
        }
    }

    /// Set notification body
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a target user to the notification
    pub fn target_user(mut self, user_id: i32) -> Self {
        self.targets.push(NotificationTargetInput::user(user_id));
        self
    }

    /// Add multiple target users to the notification
    pub fn target_users(mut self, user_ids: Vec<i32>) -> Self {
        for user_id in user_ids {
            self.targets.push(NotificationTargetInput::user(user_id));
        }
        self
    }

    /// Target every staff account (admins and librarians)
    pub fn target_staff(mut self) -> Self {
        self.targets.push(NotificationTargetInput::staff());
        self
    }

    /// Set the action type and data for when notification is clicked
    pub fn action(mut self, action_type: impl Into<String>, action_data: Value) -> Self {
        self.action_type = Some(action_type.into());
        self.action_data = Some(action_data);
        self
    }

    /// Set whether the notification can be dismissed
    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.dismissible = dismissible;
        self
    }

    /// Set expiration time in days (None means no expiration)
    pub fn expires_in_days(mut self, days: Option<i64>) -> Self {
        self.expires_in_days = days;
        self
    }

    /// Build and send the notification
    pub async fn send(self, pool: &PgPool) -> NotificationResult<i32> {
        if self.targets.is_empty() {
            return Err(NotificationError::InvalidTarget(
                "At least one target is required".to_string(),
            ));
        }

        let expires_at = self
            .expires_in_days
            .map(|days| (Utc::now() + chrono::Duration::days(days)).naive_utc());

        let mut tx = pool.begin().await?;

        let notification_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (
                title, body, type, action_type, action_data,
                global, dismissible, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&self.title)
        .bind(&self.body)
        .bind(&self.notification_type)
        .bind(&self.action_type)
        .bind(&self.action_data)
        .bind(false)
        .bind(self.dismissible)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for target in &self.targets {
            sqlx::query(
                "INSERT INTO notification_targets (notification_id, scope, target_id) VALUES ($1, $2, $3)",
            )
            .bind(notification_id)
            .bind(target.scope.as_str())
            .bind(target.target_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(notification_id)
    }
}

/// Common notification types for system usage
pub mod notification_types {
    pub const DONATION_SUBMITTED: &str = "donation_submitted";
    pub const DONATION_STATUS_CHANGE: &str = "donation_status_change";
    pub const REQUEST_SUBMITTED: &str = "request_submitted";
    pub const REQUEST_REVIEWED: &str = "request_reviewed";
    pub const WAITLIST_ALLOCATION: &str = "waitlist_allocation";
    pub const ITEM_AVAILABLE: &str = "item_available";
    pub const SYSTEM_ANNOUNCEMENT: &str = "system_announcement";
}

/// Title and body shown to a donor when a reviewer moves their donation to
/// `status`. Review notes are appended to rejections when supplied.
pub fn donation_status_message(
    item_name: &str,
    status: DonationStatus,
    notes: Option<&str>,
) -> (String, String) {
    let (title, mut body) = match status {
        DonationStatus::Pending => (
            "Donation Pending".to_string(),
            format!("Your donation \"{item_name}\" is awaiting review."),
        ),
        DonationStatus::Accepted => (
            "Donation Accepted".to_string(),
            format!(
                "Your donation \"{item_name}\" has been accepted. Please drop it off at the library."
            ),
        ),
        DonationStatus::Rejected => (
            "Donation Rejected".to_string(),
            format!("Your donation \"{item_name}\" has been rejected."),
        ),
        DonationStatus::Received => (
            "Donation Received".to_string(),
            format!("Your donation \"{item_name}\" has been received by the library."),
        ),
        DonationStatus::Processed => (
            "Donation Processed".to_string(),
            format!(
                "Your donation \"{item_name}\" has been processed and added to the inventory."
            ),
        ),
    };
    if status == DonationStatus::Rejected {
        if let Some(reason) = notes.filter(|value| !value.trim().is_empty()) {
            body.push_str(&format!(" Reason: {reason}"));
        }
    }
    (title, body)
}

/// Title and body shown to a requester after their item request is reviewed.
/// Wording differs between the two request types and the two outcomes; a
/// rejection includes the reviewer's stated reason when supplied.
pub fn review_outcome_message(
    details: &ItemRequestDetails,
    status: ItemRequestStatus,
    admin_notes: Option<&str>,
) -> (String, String) {
    let item_name = details.item_name();
    let approved = status == ItemRequestStatus::Approved;
    let (title, mut body) = match details {
        ItemRequestDetails::AddItem(_) => {
            if approved {
                (
                    "Item Donation Approved".to_string(),
                    format!(
                        "Your item donation \"{item_name}\" has been approved and added to the inventory."
                    ),
                )
            } else {
                (
                    "Item Donation Rejected".to_string(),
                    format!("Your item donation \"{item_name}\" has been rejected."),
                )
            }
        }
        ItemRequestDetails::RequestItem(_) => {
            if approved {
                (
                    "Item Request Approved".to_string(),
                    format!(
                        "Your request for \"{item_name}\" has been approved. The library will try to obtain it."
                    ),
                )
            } else {
                (
                    "Item Request Rejected".to_string(),
                    format!("Your request for \"{item_name}\" has been rejected."),
                )
            }
        }
    };
    if !approved {
        if let Some(reason) = admin_notes.filter(|value| !value.trim().is_empty()) {
            body.push_str(&format!(" Reason: {reason}"));
        }
    }
    (title, body)
}

/// Tell staff a new donation is waiting for review.
pub async fn notify_staff_of_donation(
    pool: &PgPool,
    donation_id: i32,
    item_name: &str,
    donor_username: &str,
) -> NotificationResult<i32> {
    NotificationBuilder::new(
        format!("New Donation: {item_name}"),
        notification_types::DONATION_SUBMITTED,
    )
    .body(format!(
        "{donor_username} has offered to donate \"{item_name}\"."
    ))
    .target_staff()
    .action("view_donation", json!({ "donation_id": donation_id }))
    .send(pool)
    .await
}

/// Tell the donor their donation moved to a new status.
pub async fn notify_donation_status_change(
    pool: &PgPool,
    donation_id: i32,
    user_id: i32,
    item_name: &str,
    status: DonationStatus,
    notes: Option<&str>,
) -> NotificationResult<i32> {
    let (title, body) = donation_status_message(item_name, status, notes);
    NotificationBuilder::new(title, notification_types::DONATION_STATUS_CHANGE)
        .body(body)
        .target_user(user_id)
        .action("view_donation", json!({ "donation_id": donation_id }))
        .send(pool)
        .await
}

/// Tell staff a new item request is waiting for review.
pub async fn notify_staff_of_request(
    pool: &PgPool,
    request_id: i32,
    details: &ItemRequestDetails,
    requester_username: &str,
) -> NotificationResult<i32> {
    let item_name = details.item_name();
    let body = match details {
        ItemRequestDetails::AddItem(_) => {
            format!("{requester_username} wants to share \"{item_name}\" with the library.")
        }
        ItemRequestDetails::RequestItem(_) => {
            format!("{requester_username} has requested \"{item_name}\".")
        }
    };
    NotificationBuilder::new(
        format!("New Item Request: {item_name}"),
        notification_types::REQUEST_SUBMITTED,
    )
    .body(body)
    .target_staff()
    .action("view_request", json!({ "request_id": request_id }))
    .send(pool)
    .await
}

/// Tell the requester how their item request was decided.
pub async fn notify_request_reviewed(
    pool: &PgPool,
    request_id: i32,
    user_id: i32,
    details: &ItemRequestDetails,
    status: ItemRequestStatus,
    admin_notes: Option<&str>,
) -> NotificationResult<i32> {
    let (title, body) = review_outcome_message(details, status, admin_notes);
    NotificationBuilder::new(title, notification_types::REQUEST_REVIEWED)
        .body(body)
        .target_user(user_id)
        .action("view_request", json!({ "request_id": request_id }))
        .send(pool)
        .await
}

/// Tell a waiting user an item has been allocated to them.
pub async fn notify_waitlist_allocation(
    pool: &PgPool,
    user_id: i32,
    item_id: i32,
    item_title: &str,
) -> NotificationResult<i32> {
    NotificationBuilder::new(
        format!("Item Allocated: {item_title}"),
        notification_types::WAITLIST_ALLOCATION,
    )
    .body(format!(
        "\"{item_title}\" has been allocated to you. Please collect it from the library."
    ))
    .target_user(user_id)
    .action("view_item", json!({ "item_id": item_id }))
    .dismissible(false)
    .expires_in_days(Some(7))
    .send(pool)
    .await
}

/// Tell the head of an item's queue the item has become available.
pub async fn notify_item_available(
    pool: &PgPool,
    user_id: i32,
    item_id: i32,
    item_title: &str,
) -> NotificationResult<i32> {
    NotificationBuilder::new(
        format!("Item Available: {item_title}"),
        notification_types::ITEM_AVAILABLE,
    )
    .body(format!(
        "\"{item_title}\" is now available and you are first in its queue."
    ))
    .target_user(user_id)
    .action("view_item", json!({ "item_id": item_id }))
    .send(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::item::ItemCondition;
    use crate::db::models::item_request::{AddItemDetails, RequestItemDetails, Urgency};

    fn add_item_details(name: &str) -> ItemRequestDetails {
        ItemRequestDetails::AddItem(AddItemDetails {
            item_name: name.to_string(),
            description: None,
            image: None,
            category_id: None,
            condition: ItemCondition::Good,
            available_from: None,
            available_until: None,
        })
    }

    fn request_item_details(name: &str) -> ItemRequestDetails {
        ItemRequestDetails::RequestItem(RequestItemDetails {
            item_name: name.to_string(),
            description: None,
            category_id: None,
            urgency: Urgency::Medium,
            needed_by: None,
        })
    }

    #[test]
    fn add_item_wording_reads_like_a_donation() {
        let (title, body) = review_outcome_message(
            &add_item_details("Chess Set"),
            ItemRequestStatus::Approved,
            None,
        );
        assert_eq!(title, "Item Donation Approved");
        assert!(body.contains("Chess Set"));
        assert!(body.contains("donation"));
    }

    #[test]
    fn request_item_wording_differs_from_add_item() {
        let (add_title, _) = review_outcome_message(
            &add_item_details("Atlas"),
            ItemRequestStatus::Approved,
            None,
        );
        let (request_title, request_body) = review_outcome_message(
            &request_item_details("Atlas"),
            ItemRequestStatus::Approved,
            None,
        );
        assert_ne!(add_title, request_title);
        assert!(request_body.contains("request"));
        assert!(!request_body.contains("donation"));
    }

    #[test]
    fn rejection_includes_reason_only_when_supplied() {
        let (_, with_reason) = review_outcome_message(
            &request_item_details("Atlas"),
            ItemRequestStatus::Rejected,
            Some("Out of print"),
        );
        assert!(with_reason.contains("Reason: Out of print"));

        let (_, without_reason) = review_outcome_message(
            &request_item_details("Atlas"),
            ItemRequestStatus::Rejected,
            None,
        );
        assert!(!without_reason.contains("Reason"));

        let (_, blank_reason) = review_outcome_message(
            &request_item_details("Atlas"),
            ItemRequestStatus::Rejected,
            Some("   "),
        );
        assert!(!blank_reason.contains("Reason"));
    }

    #[test]
    fn approval_never_carries_a_reason() {
        let (_, body) = review_outcome_message(
            &add_item_details("Atlas"),
            ItemRequestStatus::Approved,
            Some("Great condition"),
        );
        assert!(!body.contains("Reason"));
    }

    #[test]
    fn donation_status_wording_per_status() {
        let (accepted_title, accepted_body) =
            donation_status_message("Lamp", DonationStatus::Accepted, None);
        assert_eq!(accepted_title, "Donation Accepted");
        assert!(accepted_body.contains("accepted"));

        let (_, rejected_body) =
            donation_status_message("Lamp", DonationStatus::Rejected, Some("Damaged"));
        assert!(rejected_body.contains("Reason: Damaged"));

        let (_, received_body) = donation_status_message("Lamp", DonationStatus::Received, None);
        assert!(received_body.contains("received"));

        let (_, processed_body) = donation_status_message("Lamp", DonationStatus::Processed, None);
        assert!(processed_body.contains("added to the inventory"));
    }

    #[test]
    fn non_rejection_statuses_ignore_notes() {
        let (_, body) = donation_status_message("Lamp", DonationStatus::Accepted, Some("note"));
        assert!(!body.contains("Reason"));
    }
}
