use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::utils::api_response::ApiResponse;

/// Failure taxonomy shared by the donation and item-request workflows.
///
/// Each variant maps to a fixed HTTP status. Anything that is not a
/// recognized workflow failure collapses into `Unexpected`, which is logged
/// server-side and answered with a generic message so internals never leak
/// to the client.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("database failure: {0}")]
    Unexpected(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn status(&self) -> StatusCode {
        match self {
            WorkflowError::Validation(_)
            | WorkflowError::Conflict(_)
            | WorkflowError::Precondition(_) => StatusCode::BAD_REQUEST,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Guard for staff-only handlers.
pub fn require_staff(
    permissions: &crate::middleware::auth::UserPermissions,
) -> Result<(), WorkflowError> {
    if permissions.is_staff() {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(
            "You don't have permission to perform this action".to_string(),
        ))
    }
}

/// Guard for admin-only handlers.
pub fn require_admin(
    permissions: &crate::middleware::auth::UserPermissions,
) -> Result<(), WorkflowError> {
    if permissions.is_admin() {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(
            "You don't have permission to perform this action".to_string(),
        ))
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            WorkflowError::Unexpected(err) => {
                error!("unexpected workflow failure: {err}");
                "Something went wrong. Please try again later.".to_string()
            }
            other => other.to_string(),
        };
        ApiResponse::<()>::error(status, message, None).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            WorkflowError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WorkflowError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WorkflowError::Conflict("raced".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WorkflowError::Precondition("not yet".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WorkflowError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WorkflowError::Unexpected(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
