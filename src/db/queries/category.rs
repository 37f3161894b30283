use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use utoipa::OpenApi;

use crate::db::models::category::{Category, NewCategory};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{require_staff, WorkflowError};

/// Fails with NotFound when the referenced category does not exist. Used by
/// the submission and processing paths before they write anything.
pub async fn ensure_category_exists(pool: &PgPool, category_id: i32) -> Result<(), WorkflowError> {
    let exists: Option<(i32,)> = sqlx::query_as("SELECT id FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(WorkflowError::NotFound("Category not found".to_string()));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "Categories retrieved successfully", body = [Category])
    ),
    tag = "Categories",
    security(("bearerAuth" = []))
)]
pub async fn get_categories(
    State(pool): State<PgPool>,
) -> Result<ApiResponse<Vec<Category>>, WorkflowError> {
    let categories: Vec<Category> = sqlx::query_as(
        "SELECT id, name, description, created_at FROM categories ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Categories retrieved successfully",
        categories,
    ))
}

#[utoipa::path(
    post,
    path = "/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created successfully", body = Category),
        (status = 400, description = "Duplicate or invalid category name"),
        (status = 403, description = "Staff access required")
    ),
    tag = "Categories",
    security(("bearerAuth" = []))
)]
pub async fn create_category(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Json(payload): Json<NewCategory>,
) -> Result<ApiResponse<Category>, WorkflowError> {
    require_staff(&permissions)?;

    if payload.name.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "Category name is required".to_string(),
        ));
    }

    let created: Category = sqlx::query_as(
        "INSERT INTO categories (name, description) VALUES ($1, $2) \
         RETURNING id, name, description, created_at",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().map(|code| code == "23505").unwrap_or(false) {
                return WorkflowError::Conflict(format!(
                    "Category '{}' already exists",
                    payload.name.trim()
                ));
            }
        }
        WorkflowError::from(e)
    })?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Category created successfully",
        created,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_categories, create_category),
    components(schemas(Category, NewCategory)),
    tags(
        (name = "Categories", description = "Item category endpoints")
    )
)]
pub struct CategoryDoc;
