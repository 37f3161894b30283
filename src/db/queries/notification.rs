use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};
use utoipa::OpenApi;

use crate::api::auth::Claims;
use crate::db::models::notification::{
    NewNotification, Notification, NotificationCountResponse, NotificationFilter,
    NotificationWithState,
};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{require_staff, WorkflowError};

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i32,
    title: String,
    body: Option<String>,
    type_field: String,
    action_type: Option<String>,
    action_data: Option<Value>,
    global: bool,
    dismissible: bool,
    created_at: NaiveDateTime,
    expires_at: Option<NaiveDateTime>,
    dismissed: bool,
}

impl From<NotificationRow> for NotificationWithState {
    fn from(row: NotificationRow) -> Self {
        NotificationWithState {
            notification: Notification {
                id: row.id,
                title: row.title,
                body: row.body,
                type_field: row.type_field,
                action_type: row.action_type,
                action_data: row.action_data,
                global: row.global,
                dismissible: row.dismissible,
                created_at: row.created_at,
                expires_at: row.expires_at,
            },
            dismissed: row.dismissed,
        }
    }
}

/// Appends the visibility condition for `user_id`: global notifications,
/// ones targeted at the user, and staff-scoped ones when the caller is
/// staff.
fn push_visibility(builder: &mut QueryBuilder<'_, sqlx::Postgres>, user_id: i32, is_staff: bool) {
    builder
        .push(" (n.global = TRUE OR EXISTS (")
        .push("SELECT 1 FROM notification_targets t WHERE t.notification_id = n.id ")
        .push("AND t.scope = 'user' AND t.target_id = ")
        .push_bind(user_id)
        .push(")");
    if is_staff {
        builder
            .push(" OR EXISTS (SELECT 1 FROM notification_targets t ")
            .push("WHERE t.notification_id = n.id AND t.scope = 'staff')");
    }
    builder.push(")");
}

/// Staff announcement endpoint. System events (donation submitted, request
/// reviewed, allocations) create their notifications through
/// `utils::notification` instead of this route.
#[utoipa::path(
    post,
    path = "/notifications",
    request_body = NewNotification,
    responses(
        (status = 201, description = "Notification created", body = i32),
        (status = 400, description = "No targets and not global"),
        (status = 403, description = "Staff access required")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn create_notification(
    State(pool): State<PgPool>,
    Extension(permissions): Extension<UserPermissions>,
    Json(payload): Json<NewNotification>,
) -> Result<ApiResponse<i32>, WorkflowError> {
    require_staff(&permissions)?;

    let global = payload.global.unwrap_or(false);
    if !global && payload.targets.is_empty() {
        return Err(WorkflowError::Validation(
            "A notification needs at least one target unless it is global".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let notification_id: i32 = sqlx::query_scalar(
        "INSERT INTO notifications (title, body, type, action_type, action_data, global, \
         dismissible, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
    )
    .bind(&payload.title)
    .bind(&payload.body)
    .bind(payload.type_field.as_deref().unwrap_or("info"))
    .bind(&payload.action_type)
    .bind(&payload.action_data)
    .bind(global)
    .bind(payload.dismissible.unwrap_or(true))
    .bind(payload.expires_at)
    .fetch_one(&mut *tx)
    .await?;

    for target in &payload.targets {
        sqlx::query(
            "INSERT INTO notification_targets (notification_id, scope, target_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(notification_id)
        .bind(target.scope.as_str())
        .bind(target.target_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Notification created",
        notification_id,
    ))
}

/// The caller's notifications, newest first. Dismissed and expired ones are
/// hidden unless asked for.
#[utoipa::path(
    get,
    path = "/notifications",
    params(NotificationFilter),
    responses(
        (status = 200, description = "Notifications retrieved", body = [NotificationWithState])
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn get_notifications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<UserPermissions>,
    Query(filter): Query<NotificationFilter>,
) -> Result<ApiResponse<Vec<NotificationWithState>>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let mut builder = QueryBuilder::new(
        "SELECT n.id, n.title, n.body, n.type AS type_field, n.action_type, n.action_data, \
         n.global, n.dismissible, n.created_at, n.expires_at, (d.id IS NOT NULL) AS dismissed \
         FROM notifications n \
         LEFT JOIN notification_dismissals d \
           ON d.notification_id = n.id AND d.user_id = ",
    );
    builder.push_bind(user_id);
    builder.push(" WHERE");
    push_visibility(&mut builder, user_id, permissions.is_staff());

    if !filter.include_dismissed.unwrap_or(false) {
        builder.push(" AND d.id IS NULL");
    }
    if !filter.include_expired.unwrap_or(false) {
        builder.push(" AND (n.expires_at IS NULL OR n.expires_at > NOW())");
    }
    if let Some(type_field) = &filter.type_field {
        builder.push(" AND n.type = ").push_bind(type_field);
    }

    let limit = filter.limit.unwrap_or(50).clamp(1, 200);
    let offset = filter.offset.unwrap_or(0);
    builder
        .push(" ORDER BY n.created_at DESC LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows: Vec<NotificationRow> = builder.build_query_as().fetch_all(&pool).await?;
    let notifications = rows.into_iter().map(NotificationWithState::from).collect();

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notifications retrieved",
        notifications,
    ))
}

#[utoipa::path(
    get,
    path = "/notifications/count",
    responses(
        (status = 200, description = "Counts retrieved", body = NotificationCountResponse)
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn get_notification_count(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<UserPermissions>,
) -> Result<ApiResponse<NotificationCountResponse>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let mut builder = QueryBuilder::new(
        "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE d.id IS NULL) AS unread \
         FROM notifications n \
         LEFT JOIN notification_dismissals d \
           ON d.notification_id = n.id AND d.user_id = ",
    );
    builder.push_bind(user_id);
    builder.push(" WHERE (n.expires_at IS NULL OR n.expires_at > NOW()) AND");
    push_visibility(&mut builder, user_id, permissions.is_staff());

    let (total, unread): (i64, i64) = builder.build_query_as().fetch_one(&pool).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Counts retrieved",
        NotificationCountResponse { total, unread },
    ))
}

#[utoipa::path(
    post,
    path = "/notifications/{notification_id}/dismiss",
    params(("notification_id" = i32, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification dismissed"),
        (status = 400, description = "Notification is not dismissible"),
        (status = 404, description = "Notification not found")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn dismiss_notification(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<i32>,
) -> Result<ApiResponse<()>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let dismissible: Option<(bool,)> =
        sqlx::query_as("SELECT dismissible FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(&pool)
            .await?;
    let Some((dismissible,)) = dismissible else {
        return Err(WorkflowError::NotFound(
            "Notification not found".to_string(),
        ));
    };
    if !dismissible {
        return Err(WorkflowError::Validation(
            "This notification cannot be dismissed".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO notification_dismissals (notification_id, user_id) VALUES ($1, $2) \
         ON CONFLICT (notification_id, user_id) DO NOTHING",
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(&pool)
    .await?;

    Ok(ApiResponse::message(StatusCode::OK, "Notification dismissed"))
}

#[utoipa::path(
    post,
    path = "/notifications/dismiss-all",
    responses(
        (status = 200, description = "All notifications dismissed")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn dismiss_all_notifications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permissions): Extension<UserPermissions>,
) -> Result<ApiResponse<()>, WorkflowError> {
    let user_id = claims.subject_id()?;

    let mut builder = QueryBuilder::new(
        "INSERT INTO notification_dismissals (notification_id, user_id) SELECT n.id, ",
    );
    builder.push_bind(user_id);
    builder.push(" FROM notifications n WHERE n.dismissible = TRUE AND");
    push_visibility(&mut builder, user_id, permissions.is_staff());
    builder.push(" ON CONFLICT (notification_id, user_id) DO NOTHING");

    builder.build().execute(&pool).await?;

    Ok(ApiResponse::message(
        StatusCode::OK,
        "All notifications dismissed",
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_notification,
        get_notifications,
        get_notification_count,
        dismiss_notification,
        dismiss_all_notifications
    ),
    components(schemas(
        Notification,
        NotificationWithState,
        NewNotification,
        NotificationCountResponse,
        NotificationFilter
    )),
    tags(
        (name = "Notifications", description = "Store-and-poll notification center")
    )
)]
pub struct NotificationDoc;
