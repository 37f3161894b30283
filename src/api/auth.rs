use axum::{
    extract::State, http::StatusCode, routing::post, Extension, Json, Router,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::config::Config;
use crate::db::models::user::{User, ROLE_MEMBER};
use crate::utils::api_response::ApiResponse;
use crate::utils::error::WorkflowError;

/// Request to register a new user. Everyone registers as a member; roles
/// are elevated afterwards by an admin.
#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
}

/// JWT claims used for authentication.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - user ID as string
    pub sub: String,
    pub username: String,
    pub role: String,
    /// Expiration timestamp (unix time)
    pub exp: usize,
}

impl Claims {
    /// Converts `sub` (user ID) to `i32`, or returns a descriptive error.
    pub fn user_id(&self) -> Result<i32, ApiResponse<()>> {
        self.sub.parse::<i32>().map_err(|_| {
            ApiResponse::error(
                StatusCode::BAD_REQUEST,
                "Invalid user ID format in token",
                None,
            )
        })
    }

    /// Same conversion for workflow handlers, which speak `WorkflowError`.
    pub fn subject_id(&self) -> Result<i32, WorkflowError> {
        self.sub
            .parse::<i32>()
            .map_err(|_| WorkflowError::Validation("Invalid user ID in token".to_string()))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub role: String,
}

/// Handles user login.
///
/// Locked accounts are refused before password verification so a lock
/// cannot be probed by password guessing.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Successful login", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account is locked"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login(
    State(pool): State<PgPool>,
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiResponse<()>> {
    let config = Config::get();

    let user: Option<User> = sqlx::query_as(
        "SELECT id, username, password_hash, role, account_locked, created_at, updated_at \
         FROM users WHERE username = $1",
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        error!("Login query failed: {e}");
        ApiResponse::<()>::error(StatusCode::INTERNAL_SERVER_ERROR, "Database error", None)
    })?;

    let Some(user) = user else {
        warn!("Login attempt for non-existent user: {}", payload.username);
        return Err(ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password.",
            None,
        ));
    };

    if user.account_locked {
        warn!("Login attempt for locked account: {}", payload.username);
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Account is locked. Contact your administrator.",
            None,
        ));
    }

    match verify(&payload.password, &user.password_hash) {
        Ok(true) => {
            let claims = Claims {
                sub: user.id.to_string(),
                username: user.username.clone(),
                role: user.role.clone(),
                exp: chrono::Utc::now().timestamp() as usize + 36_000, // 10 hour expiration
            };
            let token = encode(
                &Header::default(),
                &claims,
                &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            )
            .map_err(|e| {
                error!("Token generation failed: {e}");
                ApiResponse::<()>::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Token generation failed",
                    None,
                )
            })?;

            info!("Login successful for user: {}", payload.username);
            Ok(ApiResponse::success(
                StatusCode::OK,
                "Login successful",
                LoginResponse {
                    token,
                    role: user.role,
                },
            ))
        }
        Ok(false) => {
            warn!("Invalid password attempt for user: {}", payload.username);
            Err(ApiResponse::<()>::error(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password.",
                None,
            ))
        }
        Err(e) => {
            error!("Password verification error: {e}");
            Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password verification error",
                None,
            ))
        }
    }
}

/// Handles user registration. New accounts always get the member role.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "Authentication",
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 409, description = "Username already taken"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<ApiResponse<RegisterResponse>, ApiResponse<()>> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
            None,
        ));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        error!("Password hashing failed: {e}");
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Password hashing failed",
            None,
        )
    })?;

    let result = sqlx::query("INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3)")
        .bind(&payload.username)
        .bind(&password_hash)
        .bind(ROLE_MEMBER)
        .execute(&pool)
        .await;

    match result {
        Ok(_) => Ok(ApiResponse::success(
            StatusCode::CREATED,
            "User registered",
            RegisterResponse {
                message: "User registered".into(),
            },
        )),
        Err(e) => {
            if let Some(db_err) = e.as_database_error() {
                if db_err.code().map(|code| code == "23505").unwrap_or(false) {
                    return Err(ApiResponse::<()>::error(
                        StatusCode::CONFLICT,
                        "Username already taken",
                        None,
                    ));
                }
            }
            error!("Registration insert failed: {e}");
            Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error",
                None,
            ))
        }
    }
}

/// Request to change one's own password.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Handles a user password change request. The caller may only change their
/// own password and must supply the current one.
#[utoipa::path(
    post,
    path = "/auth/change_password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated successfully"),
        (status = 401, description = "Old password incorrect"),
        (status = 404, description = "User does not exist"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let stored_hash: Option<String> =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| {
                error!("Password lookup failed: {e}");
                ApiResponse::<()>::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database query failed",
                    None,
                )
            })?;

    let Some(stored_hash) = stored_hash else {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "User not found",
            None,
        ));
    };

    let is_valid = verify(&payload.old_password, &stored_hash).unwrap_or(false);
    if !is_valid {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Incorrect old password",
            None,
        ));
    }

    let new_password_hash = hash(&payload.new_password, DEFAULT_COST).map_err(|e| {
        error!("Password hashing failed: {e}");
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Password hashing failed",
            None,
        )
    })?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&new_password_hash)
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            error!("Password update failed: {e}");
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update password",
                None,
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Password updated successfully",
        (),
    ))
}

/// Admin-initiated password reset, no old password needed.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub user_id: i32,
    pub new_password: String,
}

/// Handles admin-initiated password resets for users.
#[utoipa::path(
    post,
    path = "/auth/reset_password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successfully"),
        (status = 403, description = "Non-admin user attempted to reset a password"),
        (status = 404, description = "User does not exist"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reset_password(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<Claims>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    if current_user.role != "admin" {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Unauthorized: Only admins can reset passwords",
            None,
        ));
    }

    let new_password_hash = hash(&payload.new_password, DEFAULT_COST).map_err(|e| {
        error!("Password hashing failed: {e}");
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Password hashing failed",
            None,
        )
    })?;

    let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&new_password_hash)
        .bind(payload.user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            error!("Password reset failed: {e}");
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to reset password",
                None,
            )
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiResponse::<()>::error(
            StatusCode::NOT_FOUND,
            "User not found",
            None,
        ));
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Password reset successfully",
        (),
    ))
}

/// Public authentication routes; no token required.
pub fn auth_routes() -> Router<PgPool> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Authentication routes that require a valid token.
pub fn secure_auth_routes() -> Router<PgPool> {
    Router::new()
        .route("/auth/change_password", post(change_password))
        .route("/auth/reset_password", post(reset_password))
}

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::Modify;
use utoipa::OpenApi;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.clone().unwrap_or(Components::default());
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        openapi.components = Some(components);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            username: "reader".to_string(),
            role: "member".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn subject_id_parses_numeric_sub() {
        assert_eq!(claims("42").subject_id().unwrap(), 42);
    }

    #[test]
    fn subject_id_rejects_non_numeric_sub() {
        assert!(claims("forty-two").subject_id().is_err());
        assert!(claims("").subject_id().is_err());
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(login, register, change_password, reset_password),
    components(schemas(
        LoginRequest,
        LoginResponse,
        RegisterRequest,
        RegisterResponse,
        ChangePasswordRequest,
        ResetPasswordRequest
    )),
    tags(
        (name = "Authentication", description = "User auth endpoints")
    ),
    modifiers(&SecurityAddon)
)]
pub struct AuthDoc;
