use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use tracing::info;
use utoipa::OpenApi;

use crate::api::auth::Claims;
use crate::db::models::user::{is_valid_role, UpdateUserLock, UpdateUserRole, UserInfo};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{require_admin, require_staff, WorkflowError};

const USER_COLUMNS: &str = "id, username, role, account_locked, created_at";

async fn fetch_user(pool: &PgPool, user_id: i32) -> Result<UserInfo, WorkflowError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, UserInfo>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("User not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Users retrieved successfully", body = [UserInfo]),
        (status = 403, description = "Staff access required")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn get_all_users(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
) -> Result<ApiResponse<Vec<UserInfo>>, WorkflowError> {
    require_staff(&permissions)?;

    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
    let users: Vec<UserInfo> = sqlx::query_as(&sql).fetch_all(&pool).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Users retrieved successfully",
        users,
    ))
}

/// Staff can look at anyone; a member can look at themselves.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User retrieved successfully", body = UserInfo),
        (status = 403, description = "Not the caller and not staff"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(user_id): Path<i32>,
) -> Result<ApiResponse<UserInfo>, WorkflowError> {
    if !permissions.is_staff() && permissions.user_id != user_id {
        return Err(WorkflowError::Forbidden(
            "You don't have permission to view this user".to_string(),
        ));
    }

    let user = fetch_user(&pool, user_id).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "User retrieved successfully",
        user,
    ))
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "User retrieved successfully", body = UserInfo)
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<UserInfo>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let user = fetch_user(&pool, user_id).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "User retrieved successfully",
        user,
    ))
}

/// Admin role change. Takes effect for in-flight tokens once the permission
/// cache entry expires.
#[utoipa::path(
    patch,
    path = "/users/{id}/role",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRole,
    responses(
        (status = 200, description = "Role updated", body = UserInfo),
        (status = 400, description = "Invalid role"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn update_user_role(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateUserRole>,
) -> Result<ApiResponse<UserInfo>, WorkflowError> {
    require_admin(&permissions)?;

    if !is_valid_role(&payload.role) {
        return Err(WorkflowError::Validation(format!(
            "Invalid role '{}', expected one of admin, librarian, member",
            payload.role
        )));
    }

    let sql = format!(
        "UPDATE users SET role = $1, updated_at = NOW() WHERE id = $2 RETURNING {USER_COLUMNS}"
    );
    let updated: Option<UserInfo> = sqlx::query_as(&sql)
        .bind(&payload.role)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

    let Some(updated) = updated else {
        return Err(WorkflowError::NotFound("User not found".to_string()));
    };

    info!("User {} role changed to {}", user_id, payload.role);
    Ok(ApiResponse::success(StatusCode::OK, "Role updated", updated))
}

/// Admin lock/unlock. A locked user cannot log in, and in-flight tokens are
/// refused once the permission cache entry expires.
#[utoipa::path(
    patch,
    path = "/users/{id}/lock",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserLock,
    responses(
        (status = 200, description = "Lock state updated", body = UserInfo),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn update_user_lock(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateUserLock>,
) -> Result<ApiResponse<UserInfo>, WorkflowError> {
    require_admin(&permissions)?;

    if user_id == permissions.user_id && payload.account_locked {
        return Err(WorkflowError::Validation(
            "You cannot lock your own account".to_string(),
        ));
    }

    let sql = format!(
        "UPDATE users SET account_locked = $1, updated_at = NOW() WHERE id = $2 \
         RETURNING {USER_COLUMNS}"
    );
    let updated: Option<UserInfo> = sqlx::query_as(&sql)
        .bind(payload.account_locked)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

    let Some(updated) = updated else {
        return Err(WorkflowError::NotFound("User not found".to_string()));
    };

    info!(
        "User {} {}",
        user_id,
        if payload.account_locked { "locked" } else { "unlocked" }
    );
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Lock state updated",
        updated,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_all_users, get_user, get_me, update_user_role, update_user_lock),
    components(schemas(UserInfo, UpdateUserRole, UpdateUserLock)),
    tags(
        (name = "Users", description = "User administration endpoints")
    )
)]
pub struct UserDoc;
