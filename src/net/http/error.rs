use crate::db::error::DbError;
use crate::error::DomainError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

impl DomainError {
    pub fn status(&self) -> StatusCode {
        match self {
            DomainError::InvalidInput(_)
            | DomainError::Validation { .. }
            | DomainError::InvalidReference(_)
            | DomainError::InvalidDelta
            | DomainError::ItemNotFound(_)
            | DomainError::InsufficientQuantity { .. }
            | DomainError::RequiresDecision { .. }
            | DomainError::RequiresConfirmation { .. } => StatusCode::BAD_REQUEST,

            DomainError::ChestNotFound(_)
            | DomainError::MigrationTargetNotFound(_)
            | DomainError::NotFound(_)
            | DomainError::Db(DbError::NotFound) => StatusCode::NOT_FOUND,

            DomainError::Conflict(_) | DomainError::Db(DbError::UniqueViolation) => StatusCode::CONFLICT,

            DomainError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            DomainError::PermissionDenied(_) => StatusCode::FORBIDDEN,

            DomainError::Db(_) | DomainError::Infra(_) | DomainError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status();

        // storage details stay in the log
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            return (status, Json(json!({ "error": "internal server error" }))).into_response();
        }

        let body = match &self {
            DomainError::RequiresDecision { item_count, candidates } => json!({
                "error": self.to_string(),
                "requiresMigration": true,
                "itemCount": item_count,
                "availableChests": candidates,
            }),
            DomainError::RequiresConfirmation { item_count, migrate_to } => json!({
                "error": self.to_string(),
                "requiresConfirmation": true,
                "itemCount": item_count,
                "migrateTo": migrate_to,
            }),
            DomainError::InsufficientQuantity { have, need } => json!({
                "error": self.to_string(),
                "have": have,
                "need": need,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
