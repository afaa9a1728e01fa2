use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(true);

/// Controls whether error envelopes carry the underlying error string.
/// Set once at startup from the environment tag.
pub fn expose_error_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forbidden {
    #[error("only the host can do this")]
    NotHost,
    #[error("only the payer can settle this transaction")]
    InvalidPayer,
    #[error("user is not in this room")]
    NotInRoom,
    #[error("host cannot leave the room")]
    HostCannotLeave,
    #[error("room is private")]
    NotInvited,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    #[error("room bills are already consolidated")]
    AlreadyConsolidated,
    #[error("transaction is already settled")]
    AlreadySettled,
    #[error("user is already in the room")]
    AlreadyInRoom,
    #[error("user already has a pending invite")]
    AlreadyInvited,
    #[error("room has unconsolidated bills")]
    UnconsolidatedBills,
    #[error("room is closed")]
    RoomClosed,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(Forbidden),

    #[error("Conflict: {0}")]
    Conflict(Conflict),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::Forbidden(reason) => reason.to_string(),
            AppError::Conflict(reason) => reason.to_string(),
            AppError::Database(_) | AppError::Bus(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<Forbidden> for AppError {
    fn from(reason: Forbidden) -> Self {
        AppError::Forbidden(reason)
    }
}

impl From<Conflict> for AppError {
    fn from(reason: Conflict) -> Self {
        AppError::Conflict(reason)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("record".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> HttpResponse {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> HttpResponse {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> HttpResponse {
        HttpResponse::build(status).json(ApiResponse {
            status: status.as_u16(),
            message: message.into(),
            data: Some(data),
        })
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(Forbidden::InvalidPayer) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Bus(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let data = EXPOSE_DETAILS
            .load(Ordering::Relaxed)
            .then(|| self.to_string());

        HttpResponse::build(status).json(ApiResponse {
            status: status.as_u16(),
            message: self.public_message(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::invalid("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("room").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(Forbidden::NotHost).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(Forbidden::InvalidPayer).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(Conflict::AlreadySettled).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn test_envelope_hides_internal_message() {
        let resp = AppError::Database("connection refused".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], 500);
        assert_eq!(json["message"], "Internal server error");
    }
}
