use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_LIBRARIAN: &str = "librarian";
pub const ROLE_MEMBER: &str = "member";

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub account_locked: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// User row without the password hash, safe to return to clients.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserInfo {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub account_locked: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRole {
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserLock {
    pub account_locked: bool,
}

pub fn is_valid_role(role: &str) -> bool {
    matches!(role, ROLE_ADMIN | ROLE_LIBRARIAN | ROLE_MEMBER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_validation() {
        assert!(is_valid_role("admin"));
        assert!(is_valid_role("librarian"));
        assert!(is_valid_role("member"));
        assert!(!is_valid_role("Admin"));
        assert!(!is_valid_role("staff"));
    }
}
