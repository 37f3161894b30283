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
use crate::db::models::donation::{
    exclusive_date_end, Donation, DonationDetail, DonationFilterParams, DonationPhoto,
    DonationReview, DonationStatus, DonationStatusCounts, NewDonation, ProcessDonation,
};
use crate::db::models::item::{
    parse_wire_date, Item, ItemCondition, ItemStatus, ItemType, NewItem, DEFAULT_LENDING_PERIOD,
};
use crate::db::queries::category::ensure_category_exists;
use crate::db::queries::item::insert_item;
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::barcode::DONATION_BARCODE_PREFIX;
use crate::utils::error::{require_staff, WorkflowError};
use crate::utils::notification::{notify_donation_status_change, notify_staff_of_donation};

const DONATION_COLUMNS: &str = "id, user_id, item_name, description, condition, available_date, \
     status, notes, reviewed_by, review_date, received_date, processed_item_id, photos, \
     created_at, updated_at";

pub async fn fetch_donation(pool: &PgPool, donation_id: i32) -> Result<Donation, WorkflowError> {
    let sql = format!("SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1");
    sqlx::query_as::<_, Donation>(&sql)
        .bind(donation_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Donation not found".to_string()))
}

/// Staff listing with status and submission-date filters, plus a per-status
/// count aggregate. The aggregate is computed over the date-filtered set
/// while ignoring the status filter, so the dashboard always shows the full
/// distribution.
#[utoipa::path(
    get,
    path = "/donations",
    params(DonationFilterParams),
    responses(
        (status = 200, description = "Donations retrieved successfully"),
        (status = 400, description = "Invalid filter value"),
        (status = 403, description = "Staff access required"),
        (status = 500, description = "Failed to retrieve donations")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn get_donations(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Query(params): Query<DonationFilterParams>,
) -> Result<ApiResponse<serde_json::Value>, WorkflowError> {
    require_staff(&permissions)?;

    let status = params
        .status
        .as_deref()
        .map(|raw| raw.parse::<DonationStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;

    let mut query_builder =
        QueryBuilder::new(format!("SELECT {DONATION_COLUMNS} FROM donations WHERE 1=1"));
    let mut count_builder = QueryBuilder::new("SELECT COUNT(id) FROM donations WHERE 1=1");
    let mut aggregate_builder =
        QueryBuilder::new("SELECT status, COUNT(*) FROM donations WHERE 1=1");

    if let Some(status) = status {
        query_builder.push(" AND status = ").push_bind(status);
        count_builder.push(" AND status = ").push_bind(status);
        // Deliberately not applied to the aggregate.
    }
    if let Some(from_date) = params.from_date {
        query_builder
            .push(" AND created_at >= ")
            .push_bind(from_date);
        count_builder
            .push(" AND created_at >= ")
            .push_bind(from_date);
        aggregate_builder
            .push(" AND created_at >= ")
            .push_bind(from_date);
    }
    if let Some(to_date) = params.to_date {
        let end = exclusive_date_end(to_date);
        query_builder.push(" AND created_at < ").push_bind(end);
        count_builder.push(" AND created_at < ").push_bind(end);
        aggregate_builder.push(" AND created_at < ").push_bind(end);
    }

    aggregate_builder.push(" GROUP BY status");

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    query_builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let total: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;
    let donations: Vec<Donation> = query_builder.build_query_as().fetch_all(&pool).await?;

    let aggregate_rows: Vec<(DonationStatus, i64)> = aggregate_builder
        .build_query_as()
        .fetch_all(&pool)
        .await?;
    let mut status_counts = DonationStatusCounts::default();
    for (status, count) in aggregate_rows {
        status_counts.record(status, count);
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Donations retrieved successfully",
        serde_json::json!({
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": (total as f64 / limit as f64).ceil() as u32,
            "status_counts": status_counts,
            "donations": donations,
        }),
    ))
}

/// One donation with its donor, reviewer, and processed-item references
/// expanded. Staff see any donation; a member sees only their own.
#[utoipa::path(
    get,
    path = "/donations/{donation_id}",
    params(("donation_id" = i32, Path, description = "Donation ID")),
    responses(
        (status = 200, description = "Donation retrieved successfully", body = DonationDetail),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "Donation not found")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn get_donation(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<UserPermissions>,
    Path(donation_id): Path<i32>,
) -> Result<ApiResponse<DonationDetail>, WorkflowError> {
    let detail: Option<DonationDetail> = sqlx::query_as(
        "SELECT d.id, d.user_id, u.username AS donor_username, d.item_name, d.description, \
                d.condition, d.available_date, d.status, d.notes, d.reviewed_by, \
                r.username AS reviewer_username, d.review_date, d.received_date, \
                d.processed_item_id, i.title AS processed_item_title, \
                i.barcode AS processed_item_barcode, d.photos, d.created_at, d.updated_at \
         FROM donations d \
         JOIN users u ON u.id = d.user_id \
         LEFT JOIN users r ON r.id = d.reviewed_by \
         LEFT JOIN items i ON i.id = d.processed_item_id \
         WHERE d.id = $1",
    )
    .bind(donation_id)
    .fetch_optional(&pool)
    .await?;

    let Some(detail) = detail else {
        return Err(WorkflowError::NotFound("Donation not found".to_string()));
    };

    let caller_id = claims.subject_id()?;
    if !permissions.is_staff() && detail.user_id != caller_id {
        return Err(WorkflowError::Forbidden(
            "You don't have permission to view this donation".to_string(),
        ));
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Donation retrieved successfully",
        detail,
    ))
}

/// Member submission: a new donation enters the workflow as Pending. Staff
/// are told best-effort; a notification failure never fails the submission.
#[utoipa::path(
    post,
    path = "/donations",
    request_body = NewDonation,
    responses(
        (status = 201, description = "Donation submitted successfully", body = Donation),
        (status = 400, description = "Invalid condition or date")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn create_donation(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewDonation>,
) -> Result<ApiResponse<Donation>, WorkflowError> {
    let user_id = claims.subject_id()?;

    if payload.item_name.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "item_name is required".to_string(),
        ));
    }
    let condition: ItemCondition = payload
        .condition
        .parse()
        .map_err(WorkflowError::Validation)?;
    let available_date = payload
        .available_date
        .as_deref()
        .map(|raw| parse_wire_date("available_date", raw))
        .transpose()
        .map_err(WorkflowError::Validation)?;
    let photos = payload.photos.unwrap_or_default();

    let sql = format!(
        "INSERT INTO donations (user_id, item_name, description, condition, available_date, photos) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DONATION_COLUMNS}"
    );
    let donation: Donation = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(payload.item_name.trim())
        .bind(&payload.description)
        .bind(condition)
        .bind(available_date)
        .bind(SqlJson(photos))
        .fetch_one(&pool)
        .await?;

    if let Err(e) =
        notify_staff_of_donation(&pool, donation.id, &donation.item_name, &claims.username).await
    {
        warn!("Failed to notify staff of donation {}: {e}", donation.id);
    }

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Donation submitted successfully",
        donation,
    ))
}

/// The caller's own donations, newest first, with the same status and
/// submission-date filters as the staff listing (no aggregate).
#[utoipa::path(
    get,
    path = "/donations/mine",
    params(DonationFilterParams),
    responses(
        (status = 200, description = "Donations retrieved successfully"),
        (status = 400, description = "Invalid filter value")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn get_my_donations(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DonationFilterParams>,
) -> Result<ApiResponse<serde_json::Value>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let status = params
        .status
        .as_deref()
        .map(|raw| raw.parse::<DonationStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;

    let mut query_builder =
        QueryBuilder::new(format!("SELECT {DONATION_COLUMNS} FROM donations WHERE user_id = "));
    query_builder.push_bind(user_id);
    let mut count_builder = QueryBuilder::new("SELECT COUNT(id) FROM donations WHERE user_id = ");
    count_builder.push_bind(user_id);

    if let Some(status) = status {
        query_builder.push(" AND status = ").push_bind(status);
        count_builder.push(" AND status = ").push_bind(status);
    }
    if let Some(from_date) = params.from_date {
        query_builder
            .push(" AND created_at >= ")
            .push_bind(from_date);
        count_builder
            .push(" AND created_at >= ")
            .push_bind(from_date);
    }
    if let Some(to_date) = params.to_date {
        let end = exclusive_date_end(to_date);
        query_builder.push(" AND created_at < ").push_bind(end);
        count_builder.push(" AND created_at < ").push_bind(end);
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    query_builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let total: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;
    let donations: Vec<Donation> = query_builder.build_query_as().fetch_all(&pool).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Donations retrieved successfully",
        serde_json::json!({
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": (total as f64 / limit as f64).ceil() as u32,
            "donations": donations,
        }),
    ))
}

/// Reviewer status change. The requested value must parse into the status
/// enum before the transition table is consulted; an illegal transition
/// leaves the record untouched. A transition to the current status is a
/// permitted no-op that re-stamps reviewer and review date.
///
/// The write is a compare-and-swap on the observed status: a concurrent
/// reviewer who got there first turns this call into a Conflict instead of
/// a silent double review.
#[utoipa::path(
    patch,
    path = "/donations/{donation_id}",
    params(("donation_id" = i32, Path, description = "Donation ID")),
    request_body = DonationReview,
    responses(
        (status = 200, description = "Donation status updated", body = Donation),
        (status = 400, description = "Invalid status value or illegal transition"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Donation not found")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn review_donation(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(donation_id): Path<i32>,
    Json(payload): Json<DonationReview>,
) -> Result<ApiResponse<Donation>, WorkflowError> {
    require_staff(&permissions)?;
    let reviewer_id = permissions.user_id;

    // Enum membership is checked before the transition table.
    let next: DonationStatus = payload
        .status
        .parse()
        .map_err(WorkflowError::Validation)?;

    let donation = fetch_donation(&pool, donation_id).await?;
    let current = donation.status;

    if !current.can_transition_to(next) {
        return Err(WorkflowError::Validation(format!(
            "Cannot change status from {current} to {next}"
        )));
    }

    let sql = format!(
        "UPDATE donations \
         SET status = $1, reviewed_by = $2, review_date = NOW(), \
             notes = COALESCE($3, notes), \
             received_date = CASE \
                 WHEN $1 = 'Received'::donation_status AND received_date IS NULL THEN NOW() \
                 ELSE received_date END, \
             updated_at = NOW() \
         WHERE id = $4 AND status = $5 \
         RETURNING {DONATION_COLUMNS}"
    );
    let updated: Option<Donation> = sqlx::query_as(&sql)
        .bind(next)
        .bind(reviewer_id)
        .bind(&payload.notes)
        .bind(donation_id)
        .bind(current)
        .fetch_optional(&pool)
        .await?;

    let Some(updated) = updated else {
        return Err(WorkflowError::Conflict(
            "Donation was updated by another reviewer, please reload and retry".to_string(),
        ));
    };

    // Idempotent re-stamps stay quiet; only a real transition tells the donor.
    if next != current {
        if let Err(e) = notify_donation_status_change(
            &pool,
            updated.id,
            updated.user_id,
            &updated.item_name,
            next,
            payload.notes.as_deref(),
        )
        .await
        {
            warn!("Failed to notify donor for donation {}: {e}", updated.id);
        }
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Donation status updated",
        updated,
    ))
}

/// Processing turns a received donation into an inventory item. The item
/// insert and the donation update run in one transaction; if either fails,
/// neither sticks.
#[utoipa::path(
    post,
    path = "/donations/{donation_id}/process",
    params(("donation_id" = i32, Path, description = "Donation ID")),
    request_body = ProcessDonation,
    responses(
        (status = 200, description = "Donation processed into an inventory item"),
        (status = 400, description = "Donation is not in Received status"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Donation or category not found")
    ),
    tag = "Donations",
    security(("bearerAuth" = []))
)]
pub async fn process_donation(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Path(donation_id): Path<i32>,
    Json(overrides): Json<ProcessDonation>,
) -> Result<ApiResponse<serde_json::Value>, WorkflowError> {
    require_staff(&permissions)?;
    let reviewer_id = permissions.user_id;

    let donation = fetch_donation(&pool, donation_id).await?;
    if donation.status != DonationStatus::Received {
        return Err(WorkflowError::Precondition(
            "Donation must be in Received status to process".to_string(),
        ));
    }

    if let Some(category_id) = overrides.category_id {
        ensure_category_exists(&pool, category_id).await?;
    }

    let new_item = NewItem {
        title: overrides
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| donation.item_name.clone()),
        author: overrides.author,
        isbn: overrides.isbn,
        description: overrides.description.or_else(|| donation.description.clone()),
        publisher: overrides.publisher,
        publication_year: overrides.publication_year,
        price: overrides.price,
        category_id: overrides.category_id,
        subcategory: overrides.subcategory,
        condition: donation.condition,
        quantity: 1,
        available_copies: 1,
        status: ItemStatus::DonationPending,
        item_type: ItemType::Library,
        default_lending_period: DEFAULT_LENDING_PERIOD,
        owner_id: None,
        created_by: reviewer_id,
    };

    let mut tx = pool.begin().await?;

    let item: Item = insert_item(&mut tx, &new_item, DONATION_BARCODE_PREFIX).await?;

    let sql = format!(
        "UPDATE donations \
         SET status = 'Processed', processed_item_id = $1, reviewed_by = $2, \
             review_date = NOW(), updated_at = NOW() \
         WHERE id = $3 AND status = 'Received' \
         RETURNING {DONATION_COLUMNS}"
    );
    let updated: Option<Donation> = sqlx::query_as(&sql)
        .bind(item.id)
        .bind(reviewer_id)
        .bind(donation_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(updated) = updated else {
        // Lost a race with another reviewer; the item insert rolls back too.
        tx.rollback().await?;
        return Err(WorkflowError::Conflict(
            "Donation was updated by another reviewer, please reload and retry".to_string(),
        ));
    };

    tx.commit().await?;

    if let Err(e) = notify_donation_status_change(
        &pool,
        updated.id,
        updated.user_id,
        &updated.item_name,
        DonationStatus::Processed,
        None,
    )
    .await
    {
        warn!("Failed to notify donor for donation {}: {e}", updated.id);
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Donation processed into an inventory item",
        serde_json::json!({
            "donation": updated,
            "item": item,
        }),
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_donations,
        get_donation,
        create_donation,
        get_my_donations,
        review_donation,
        process_donation
    ),
    components(schemas(
        Donation,
        DonationDetail,
        DonationPhoto,
        NewDonation,
        DonationReview,
        ProcessDonation,
        DonationStatusCounts,
        DonationFilterParams
    )),
    tags(
        (name = "Donations", description = "Donation intake and review workflow")
    )
)]
pub struct DonationDoc;
