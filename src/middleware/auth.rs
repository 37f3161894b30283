use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::db::models::user::{ROLE_ADMIN, ROLE_LIBRARIAN};
use crate::utils::api_response::ApiResponse;

/// Role cache keyed by user id, so the role lookup does not hit the
/// database on every request.
pub type PermissionCache = Arc<Cache<i32, UserPermissions>>;

pub fn create_permission_cache() -> PermissionCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(600)) // 10 minutes
            .build(),
    )
}

/// JWT middleware. Decodes the bearer token and attaches the claims to the
/// request extensions.
pub async fn jwt_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing Authorization header", None)
            .into_response()
    })?;

    let token_str = auth_header.to_str().map_err(|_| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid Authorization header format",
            None,
        )
        .into_response()
    })?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid token format (missing 'Bearer ' prefix)",
            None,
        )
        .into_response()
    })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(Config::get().jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        error!("JWT decoding failed: {e}");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Invalid token", None).into_response()
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// The caller's current role, loaded from the database rather than trusted
/// from the token, so a role change or account lock takes effect within the
/// cache TTL even for tokens issued earlier.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserPermissions {
    pub user_id: i32,
    pub role: String,
    pub account_locked: bool,
}

impl UserPermissions {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Staff covers admins and librarians; they review donations and
    /// requests and manage the inventory.
    pub fn is_staff(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_LIBRARIAN
    }
}

/// RBAC middleware. Resolves the caller's role through the moka cache and
/// attaches a [`UserPermissions`] extension for handlers to consult.
pub async fn rbac_middleware(
    State(pool): State<PgPool>,
    Extension(permission_cache): Extension<PermissionCache>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Missing JWT claims in request");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing JWT claims in request", None)
            .into_response()
    })?;

    let user_id: i32 = claims.sub.parse().map_err(|_| {
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid user ID format in JWT claims",
            None,
        )
        .into_response()
    })?;

    let permissions = if let Some(cached) = permission_cache.get(&user_id) {
        cached
    } else {
        let loaded = fetch_permissions_from_db(user_id, &pool).await.map_err(|e| {
            error!("Failed to load user permissions: {e}");
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user permissions",
                None,
            )
            .into_response()
        })?;

        let loaded = loaded.ok_or_else(|| {
            ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Unknown user", None)
                .into_response()
        })?;

        permission_cache.insert(user_id, loaded.clone());
        loaded
    };

    if permissions.account_locked {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Account is locked. Contact your administrator.",
            None,
        )
        .into_response());
    }

    req.extensions_mut().insert(permissions);
    Ok(next.run(req).await)
}

async fn fetch_permissions_from_db(
    user_id: i32,
    pool: &PgPool,
) -> Result<Option<UserPermissions>, sqlx::Error> {
    let row: Option<(String, bool)> =
        sqlx::query_as("SELECT role, account_locked FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(role, account_locked)| UserPermissions {
        user_id,
        role,
        account_locked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(role: &str) -> UserPermissions {
        UserPermissions {
            user_id: 1,
            role: role.to_string(),
            account_locked: false,
        }
    }

    #[test]
    fn staff_covers_admin_and_librarian() {
        assert!(perms("admin").is_staff());
        assert!(perms("librarian").is_staff());
        assert!(!perms("member").is_staff());
    }

    #[test]
    fn only_admin_is_admin() {
        assert!(perms("admin").is_admin());
        assert!(!perms("librarian").is_admin());
        assert!(!perms("member").is_admin());
    }
}
