use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct Notification {
    pub id: i32,
    pub title: String,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub type_field: String,
    pub action_type: Option<String>,
    pub action_data: Option<Value>,
    pub global: bool,
    pub dismissible: bool,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum NotificationScope {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "staff")]
    Staff,
}

impl NotificationScope {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationScope::User => "user",
            NotificationScope::Staff => "staff",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct NotificationTarget {
    pub id: i32,
    pub notification_id: i32,
    pub scope: String,
    pub target_id: Option<i32>,
}

/// Target of a notification being created: a single user, or every staff
/// account. Staff targets carry no user id.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTargetInput {
    pub scope: NotificationScope,
    pub target_id: Option<i32>,
}

impl NotificationTargetInput {
    pub fn user(user_id: i32) -> Self {
        NotificationTargetInput {
            scope: NotificationScope::User,
            target_id: Some(user_id),
        }
    }

    pub fn staff() -> Self {
        NotificationTargetInput {
            scope: NotificationScope::Staff,
            target_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    pub action_type: Option<String>,
    pub action_data: Option<Value>,
    pub global: Option<bool>,
    pub dismissible: Option<bool>,
    pub expires_at: Option<NaiveDateTime>,
    pub targets: Vec<NotificationTargetInput>,
}

#[derive(Debug, Serialize, Deserialize, Default, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub include_dismissed: Option<bool>,
    pub include_expired: Option<bool>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NotificationWithState {
    pub notification: Notification,
    pub dismissed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationCountResponse {
    pub total: i64,
    pub unread: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_camel_case_keys() {
        let filter: NotificationFilter = serde_json::from_value(serde_json::json!({
            "includeDismissed": true,
            "includeExpired": false,
            "type": "donation_status_change"
        }))
        .unwrap();
        assert_eq!(filter.include_dismissed, Some(true));
        assert_eq!(filter.include_expired, Some(false));
        assert_eq!(filter.type_field.as_deref(), Some("donation_status_change"));
    }

    #[test]
    fn creation_body_uses_camel_case_keys() {
        let body: NewNotification = serde_json::from_value(serde_json::json!({
            "title": "Closed Friday",
            "global": true,
            "actionType": "none",
            "targets": [{ "scope": "user", "targetId": 4 }]
        }))
        .unwrap();
        assert_eq!(body.action_type.as_deref(), Some("none"));
        assert_eq!(body.targets[0].target_id, Some(4));
        assert_eq!(body.targets[0].scope, NotificationScope::User);
    }
}
