use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::warn;
use utoipa::OpenApi;

use crate::db::models::item::{
    Item, ItemCondition, ItemFilterParams, ItemStatus, NewItem, UpdateItem,
};
use crate::db::queries::category::ensure_category_exists;
use crate::db::queries::waitlist::notify_queue_head_of_availability;
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::barcode::generate_barcode;
use crate::utils::error::{require_staff, WorkflowError};

const BARCODE_INSERT_ATTEMPTS: u32 = 5;

const ITEM_COLUMNS: &str = "id, title, author, isbn, description, publisher, publication_year, \
     price, category_id, subcategory, condition, quantity, available_copies, status, item_type, \
     barcode, default_lending_period, owner_id, created_by, created_at, updated_at";

/// Inserts one inventory item inside the caller's transaction, generating
/// the barcode here. Early attempts use `ON CONFLICT DO NOTHING` so a
/// barcode collision does not abort the surrounding transaction; the final
/// attempt inserts plainly and lets the unique constraint surface a real
/// failure.
pub async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    item: &NewItem,
    barcode_prefix: &str,
) -> Result<Item, sqlx::Error> {
    for attempt in 0..BARCODE_INSERT_ATTEMPTS {
        let barcode = generate_barcode(barcode_prefix, attempt);
        let last_attempt = attempt + 1 == BARCODE_INSERT_ATTEMPTS;

        let sql = format!(
            "INSERT INTO items (title, author, isbn, description, publisher, publication_year, \
             price, category_id, subcategory, condition, quantity, available_copies, status, \
             item_type, barcode, default_lending_period, owner_id, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             {} RETURNING {ITEM_COLUMNS}",
            if last_attempt {
                ""
            } else {
                "ON CONFLICT (barcode) DO NOTHING"
            }
        );

        let inserted: Option<Item> = sqlx::query_as(&sql)
            .bind(&item.title)
            .bind(&item.author)
            .bind(&item.isbn)
            .bind(&item.description)
            .bind(&item.publisher)
            .bind(item.publication_year)
            .bind(&item.price)
            .bind(item.category_id)
            .bind(&item.subcategory)
            .bind(item.condition)
            .bind(item.quantity)
            .bind(item.available_copies)
            .bind(item.status)
            .bind(item.item_type)
            .bind(&barcode)
            .bind(item.default_lending_period)
            .bind(item.owner_id)
            .bind(item.created_by)
            .fetch_optional(&mut **tx)
            .await?;

        match inserted {
            Some(item) => return Ok(item),
            None => {
                warn!("Barcode {barcode} already taken, regenerating (attempt {attempt})");
            }
        }
    }

    // Unreachable: the last attempt either returns a row or errors.
    Err(sqlx::Error::RowNotFound)
}

pub async fn fetch_item(pool: &PgPool, item_id: i32) -> Result<Item, WorkflowError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
    sqlx::query_as::<_, Item>(&sql)
        .bind(item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Item not found".to_string()))
}

/// Paginated inventory listing with status/type/condition/category/search
/// filters.
#[utoipa::path(
    get,
    path = "/items",
    params(ItemFilterParams),
    responses(
        (status = 200, description = "Items retrieved successfully"),
        (status = 400, description = "Invalid filter value"),
        (status = 500, description = "Failed to retrieve items")
    ),
    tag = "Items",
    security(("bearerAuth" = []))
)]
pub async fn get_items(
    State(pool): State<PgPool>,
    Query(params): Query<ItemFilterParams>,
) -> Result<ApiResponse<serde_json::Value>, WorkflowError> {
    let status = params
        .status
        .as_deref()
        .map(|raw| raw.parse::<ItemStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;
    let condition = params
        .condition
        .as_deref()
        .map(|raw| raw.parse::<ItemCondition>())
        .transpose()
        .map_err(WorkflowError::Validation)?;
    let item_type = match params.item_type.as_deref() {
        None => None,
        Some("Library") => Some("Library"),
        Some("Shared") => Some("Shared"),
        Some(other) => {
            return Err(WorkflowError::Validation(format!(
                "Invalid item type '{other}', expected Library or Shared"
            )))
        }
    };

    let mut query_builder =
        QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM items WHERE 1=1"));
    let mut count_builder = QueryBuilder::new("SELECT COUNT(id) FROM items WHERE 1=1");

    if let Some(status) = status {
        query_builder.push(" AND status = ").push_bind(status);
        count_builder.push(" AND status = ").push_bind(status);
    }
    if let Some(condition) = condition {
        query_builder.push(" AND condition = ").push_bind(condition);
        count_builder.push(" AND condition = ").push_bind(condition);
    }
    if let Some(item_type) = item_type {
        query_builder
            .push(" AND item_type = ")
            .push_bind(item_type)
            .push("::item_type");
        count_builder
            .push(" AND item_type = ")
            .push_bind(item_type)
            .push("::item_type");
    }
    if let Some(category_id) = params.category_id {
        query_builder
            .push(" AND category_id = ")
            .push_bind(category_id);
        count_builder
            .push(" AND category_id = ")
            .push_bind(category_id);
    }
    if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        query_builder
            .push(" AND title ILIKE ")
            .push_bind(pattern.clone());
        count_builder.push(" AND title ILIKE ").push_bind(pattern);
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    query_builder
        .push(" ORDER BY title LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let total: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;
    let items: Vec<Item> = query_builder.build_query_as().fetch_all(&pool).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Items retrieved successfully",
        serde_json::json!({
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": (total as f64 / limit as f64).ceil() as u32,
            "items": items,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/items/{item_id}",
    params(("item_id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item retrieved successfully", body = Item),
        (status = 404, description = "Item not found")
    ),
    tag = "Items",
    security(("bearerAuth" = []))
)]
pub async fn get_item(
    State(pool): State<PgPool>,
    Path(item_id): Path<i32>,
) -> Result<ApiResponse<Item>, WorkflowError> {
    let item = fetch_item(&pool, item_id).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Item retrieved successfully",
        item,
    ))
}

/// Staff item update. This is also the activation step for processed
/// donations (Donation Pending -> Available); when an update leaves the
/// item available with copies on hand, the head of its queue is told.
#[utoipa::path(
    patch,
    path = "/items/{item_id}",
    params(("item_id" = i32, Path, description = "Item ID")),
    request_body = UpdateItem,
    responses(
        (status = 200, description = "Item updated successfully", body = Item),
        (status = 400, description = "Invalid update"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Item not found")
    ),
    tag = "Items",
    security(("bearerAuth" = []))
)]
pub async fn update_item(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(item_id): Path<i32>,
    Json(payload): Json<UpdateItem>,
) -> Result<ApiResponse<Item>, WorkflowError> {
    require_staff(&permissions)?;

    if payload.is_empty() {
        return Err(WorkflowError::Validation(
            "No fields supplied to update".to_string(),
        ));
    }

    let status = payload
        .status
        .as_deref()
        .map(|raw| raw.parse::<ItemStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;
    let condition = payload
        .condition
        .as_deref()
        .map(|raw| raw.parse::<ItemCondition>())
        .transpose()
        .map_err(WorkflowError::Validation)?;

    if let Some(copies) = payload.available_copies {
        if copies < 0 {
            return Err(WorkflowError::Validation(
                "available_copies cannot be negative".to_string(),
            ));
        }
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(&pool, category_id).await?;
    }

    let before = fetch_item(&pool, item_id).await?;

    let mut query_builder = QueryBuilder::new("UPDATE items SET updated_at = NOW()");

    macro_rules! set_if_some {
        ($field:ident) => {
            if let Some(value) = &payload.$field {
                query_builder
                    .push(concat!(", ", stringify!($field), " = "))
                    .push_bind(value);
            }
        };
    }

    set_if_some!(title);
    set_if_some!(author);
    set_if_some!(isbn);
    set_if_some!(description);
    set_if_some!(publisher);
    set_if_some!(publication_year);
    set_if_some!(price);
    set_if_some!(category_id);
    set_if_some!(subcategory);
    set_if_some!(quantity);
    set_if_some!(available_copies);
    set_if_some!(default_lending_period);

    if let Some(status) = status {
        query_builder.push(", status = ").push_bind(status);
    }
    if let Some(condition) = condition {
        query_builder.push(", condition = ").push_bind(condition);
    }

    query_builder
        .push(" WHERE id = ")
        .push_bind(item_id)
        .push(format!(" RETURNING {ITEM_COLUMNS}"));

    let updated: Item = query_builder.build_query_as().fetch_one(&pool).await?;

    let became_available = updated.status == ItemStatus::Available
        && updated.available_copies > 0
        && (before.status != ItemStatus::Available || before.available_copies == 0);
    if became_available {
        notify_queue_head_of_availability(&pool, &updated).await;
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Item updated successfully",
        updated,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_items, get_item, update_item),
    components(schemas(Item, UpdateItem, ItemFilterParams)),
    tags(
        (name = "Items", description = "Inventory read and activation endpoints")
    )
)]
pub struct ItemDoc;
