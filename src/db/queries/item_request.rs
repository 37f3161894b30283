use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use sqlx::types::Json as SqlJson;
use sqlx::{PgPool, QueryBuilder};
use tracing::warn;
use utoipa::OpenApi;

use crate::api::auth::Claims;
use crate::db::models::item::{Item, ItemStatus, ItemType, NewItem, DEFAULT_LENDING_PERIOD};
use crate::db::models::item_request::{
    AddItemDetails, ItemRequest, ItemRequestDetailRow, ItemRequestDetails, ItemRequestFilterParams,
    ItemRequestStatus, ItemRequestType, RequestItemDetails, ReviewItemRequest, SubmitAddItem,
    SubmitRequestItem,
};
use crate::db::queries::category::ensure_category_exists;
use crate::db::queries::item::insert_item;
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::barcode::SHARED_BARCODE_PREFIX;
use crate::utils::error::{require_staff, WorkflowError};
use crate::utils::notification::{notify_request_reviewed, notify_staff_of_request};

const REQUEST_COLUMNS: &str = "id, request_type, requested_by, details, status, admin_notes, \
     reviewed_by, created_item_id, requested_at, reviewed_at";

pub async fn fetch_item_request(
    pool: &PgPool,
    request_id: i32,
) -> Result<ItemRequest, WorkflowError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM item_requests WHERE id = $1");
    sqlx::query_as::<_, ItemRequest>(&sql)
        .bind(request_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Item request not found".to_string()))
}

async fn insert_request(
    pool: &PgPool,
    requester_id: i32,
    details: ItemRequestDetails,
) -> Result<ItemRequest, WorkflowError> {
    if let Some(category_id) = details.category_id() {
        ensure_category_exists(pool, category_id).await?;
    }

    let sql = format!(
        "INSERT INTO item_requests (request_type, requested_by, details) \
         VALUES ($1, $2, $3) RETURNING {REQUEST_COLUMNS}"
    );
    let request: ItemRequest = sqlx::query_as(&sql)
        .bind(details.request_type())
        .bind(requester_id)
        .bind(SqlJson(details))
        .fetch_one(pool)
        .await?;

    Ok(request)
}

/// Member submission of an "add my item to the library" request.
#[utoipa::path(
    post,
    path = "/item-requests/add-item",
    request_body = SubmitAddItem,
    responses(
        (status = 201, description = "Request submitted", body = ItemRequest),
        (status = 400, description = "Invalid condition or date"),
        (status = 404, description = "Category not found")
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn submit_add_item_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitAddItem>,
) -> Result<ApiResponse<ItemRequest>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let details = ItemRequestDetails::AddItem(
        payload.into_details().map_err(WorkflowError::Validation)?,
    );
    let request = insert_request(&pool, user_id, details).await?;

    if let Err(e) =
        notify_staff_of_request(&pool, request.id, &request.details, &claims.username).await
    {
        warn!("Failed to notify staff of request {}: {e}", request.id);
    }

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Request submitted",
        request,
    ))
}

/// Member submission of a "please obtain this item" request.
#[utoipa::path(
    post,
    path = "/item-requests/request-item",
    request_body = SubmitRequestItem,
    responses(
        (status = 201, description = "Request submitted", body = ItemRequest),
        (status = 400, description = "Invalid urgency or date"),
        (status = 404, description = "Category not found")
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn submit_request_item_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitRequestItem>,
) -> Result<ApiResponse<ItemRequest>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let details = ItemRequestDetails::RequestItem(
        payload.into_details().map_err(WorkflowError::Validation)?,
    );
    let request = insert_request(&pool, user_id, details).await?;

    if let Err(e) =
        notify_staff_of_request(&pool, request.id, &request.details, &claims.username).await
    {
        warn!("Failed to notify staff of request {}: {e}", request.id);
    }

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Request submitted",
        request,
    ))
}

/// Staff listing of item requests with status/type filters.
#[utoipa::path(
    get,
    path = "/all-requests",
    params(ItemRequestFilterParams),
    responses(
        (status = 200, description = "Requests retrieved successfully"),
        (status = 400, description = "Invalid filter value"),
        (status = 403, description = "Staff access required")
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_all_requests(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Query(params): Query<ItemRequestFilterParams>,
) -> Result<ApiResponse<serde_json::Value>, WorkflowError> {
    require_staff(&permissions)?;

    let status = params
        .status
        .as_deref()
        .map(|raw| raw.parse::<ItemRequestStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;
    let request_type = params
        .request_type
        .as_deref()
        .map(|raw| raw.parse::<ItemRequestType>())
        .transpose()
        .map_err(WorkflowError::Validation)?;

    let mut query_builder = QueryBuilder::new(
        "SELECT r.id, r.request_type, r.requested_by, u.username AS requester_username, \
                r.details, r.status, r.admin_notes, r.reviewed_by, \
                rv.username AS reviewer_username, r.created_item_id, r.requested_at, r.reviewed_at \
         FROM item_requests r \
         JOIN users u ON u.id = r.requested_by \
         LEFT JOIN users rv ON rv.id = r.reviewed_by \
         WHERE 1=1",
    );
    let mut count_builder = QueryBuilder::new("SELECT COUNT(id) FROM item_requests WHERE 1=1");

    if let Some(status) = status {
        query_builder.push(" AND r.status = ").push_bind(status);
        count_builder.push(" AND status = ").push_bind(status);
    }
    if let Some(request_type) = request_type {
        query_builder
            .push(" AND r.request_type = ")
            .push_bind(request_type);
        count_builder
            .push(" AND request_type = ")
            .push_bind(request_type);
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    query_builder
        .push(" ORDER BY r.requested_at DESC LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let total: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;
    let requests: Vec<ItemRequestDetailRow> =
        query_builder.build_query_as().fetch_all(&pool).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Requests retrieved successfully",
        serde_json::json!({
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": (total as f64 / limit as f64).ceil() as u32,
            "requests": requests,
        }),
    ))
}

/// The caller's own item requests, newest first.
#[utoipa::path(
    get,
    path = "/my-requests",
    responses(
        (status = 200, description = "Requests retrieved successfully", body = [ItemRequest])
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_my_requests(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<Vec<ItemRequest>>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM item_requests \
         WHERE requested_by = $1 ORDER BY requested_at DESC"
    );
    let requests: Vec<ItemRequest> = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_all(&pool)
        .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Requests retrieved successfully",
        requests,
    ))
}

/// Reviewer decision on a pending request.
///
/// The target status must be exactly Approved or Rejected; that is checked
/// before the request is even looked up. The stamp is a conditional update
/// on `status = 'Pending'`, so a second reviewer racing on the same request
/// loses cleanly with a Conflict. Approving an ADD_ITEM request also creates
/// the shared inventory item in the same transaction; approving a
/// REQUEST_ITEM request creates nothing. The requester is notified after
/// commit, best-effort.
#[utoipa::path(
    patch,
    path = "/requests/{request_id}/review",
    params(("request_id" = i32, Path, description = "Item request ID")),
    request_body = ReviewItemRequest,
    responses(
        (status = 200, description = "Request reviewed", body = ItemRequest),
        (status = 400, description = "Invalid review status or request already reviewed"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Request not found")
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn review_item_request(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ReviewItemRequest>,
) -> Result<ApiResponse<ItemRequest>, WorkflowError> {
    require_staff(&permissions)?;
    let reviewer_id = permissions.user_id;

    // Decision validation happens before the lookup.
    let decision = ItemRequestStatus::parse_decision(&payload.status)
        .map_err(WorkflowError::Validation)?;

    let request = fetch_item_request(&pool, request_id).await?;
    if request.status != ItemRequestStatus::Pending {
        return Err(WorkflowError::Conflict(
            "This request has already been reviewed".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let stamp_sql = format!(
        "UPDATE item_requests \
         SET status = $1, admin_notes = $2, reviewed_by = $3, reviewed_at = NOW() \
         WHERE id = $4 AND status = 'Pending' \
         RETURNING {REQUEST_COLUMNS}"
    );
    let stamped: Option<ItemRequest> = sqlx::query_as(&stamp_sql)
        .bind(decision)
        .bind(&payload.admin_notes)
        .bind(reviewer_id)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(mut reviewed) = stamped else {
        tx.rollback().await?;
        return Err(WorkflowError::Conflict(
            "This request has already been reviewed".to_string(),
        ));
    };

    if decision == ItemRequestStatus::Approved {
        if let ItemRequestDetails::AddItem(details) = &reviewed.details.0 {
            let new_item = NewItem {
                title: details.item_name.clone(),
                author: None,
                isbn: None,
                description: details.description.clone(),
                publisher: None,
                publication_year: None,
                price: None,
                category_id: details.category_id,
                subcategory: None,
                condition: details.condition,
                quantity: 1,
                available_copies: 1,
                status: ItemStatus::Available,
                item_type: ItemType::Shared,
                default_lending_period: DEFAULT_LENDING_PERIOD,
                owner_id: Some(reviewed.requested_by),
                created_by: reviewer_id,
            };
            let item: Item = insert_item(&mut tx, &new_item, SHARED_BARCODE_PREFIX).await?;

            sqlx::query("UPDATE item_requests SET created_item_id = $1 WHERE id = $2")
                .bind(item.id)
                .bind(request_id)
                .execute(&mut *tx)
                .await?;
            reviewed.created_item_id = Some(item.id);
        }
        // REQUEST_ITEM approval only records that the library will look for
        // the item; there is nothing to create.
    }

    tx.commit().await?;

    if let Err(e) = notify_request_reviewed(
        &pool,
        reviewed.id,
        reviewed.requested_by,
        &reviewed.details,
        decision,
        payload.admin_notes.as_deref(),
    )
    .await
    {
        warn!("Failed to notify requester for request {}: {e}", reviewed.id);
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request reviewed",
        reviewed,
    ))
}

/// Requester-initiated cancellation of their own pending request.
#[utoipa::path(
    delete,
    path = "/my-requests/{request_id}",
    params(("request_id" = i32, Path, description = "Item request ID")),
    responses(
        (status = 200, description = "Request cancelled", body = ItemRequest),
        (status = 400, description = "Request already reviewed"),
        (status = 404, description = "Request not found")
    ),
    tag = "Item Requests",
    security(("bearerAuth" = []))
)]
pub async fn cancel_my_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i32>,
) -> Result<ApiResponse<ItemRequest>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let request = fetch_item_request(&pool, request_id).await?;
    // A foreign request reads as not found rather than leaking its existence.
    if request.requested_by != user_id {
        return Err(WorkflowError::NotFound(
            "Item request not found".to_string(),
        ));
    }
    if request.status != ItemRequestStatus::Pending {
        return Err(WorkflowError::Conflict(
            "This request has already been reviewed".to_string(),
        ));
    }

    let sql = format!(
        "UPDATE item_requests SET status = 'Cancelled' \
         WHERE id = $1 AND requested_by = $2 AND status = 'Pending' \
         RETURNING {REQUEST_COLUMNS}"
    );
    let cancelled: Option<ItemRequest> = sqlx::query_as(&sql)
        .bind(request_id)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

    let Some(cancelled) = cancelled else {
        return Err(WorkflowError::Conflict(
            "This request has already been reviewed".to_string(),
        ));
    };

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request cancelled",
        cancelled,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_add_item_request,
        submit_request_item_request,
        get_all_requests,
        get_my_requests,
        review_item_request,
        cancel_my_request
    ),
    components(schemas(
        ItemRequest,
        ItemRequestDetailRow,
        ItemRequestDetails,
        AddItemDetails,
        RequestItemDetails,
        SubmitAddItem,
        SubmitRequestItem,
        ReviewItemRequest,
        ItemRequestFilterParams
    )),
    tags(
        (name = "Item Requests", description = "Item request submission and review workflow")
    )
)]
pub struct ItemRequestDoc;
