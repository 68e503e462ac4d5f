use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    admin::AdminError, alerts::AlertError, control::ControlError, db::StoreError, realtime::RealtimeError,
    sensors::GatewayError,
};

/// Error returned by every handler: a status code and a human-readable
/// message, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "sign-in required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::AlertNotFound { .. } | StoreError::UserNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::UserExists(_) => StatusCode::CONFLICT,
        StoreError::Database(_) | StoreError::Unavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        Self::new(store_status(&e), e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<RealtimeError> for AppError {
    fn from(e: RealtimeError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

impl From<AlertError> for AppError {
    fn from(e: AlertError) -> Self {
        let status = match &e {
            AlertError::UnknownRoom(_) => StatusCode::BAD_REQUEST,
            AlertError::Store(inner) => store_status(inner),
            AlertError::Mirror(_) | AlertError::PartiallyRecorded { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ControlError> for AppError {
    fn from(e: ControlError) -> Self {
        let status = match &e {
            ControlError::UnknownRoom(_) => StatusCode::BAD_REQUEST,
            ControlError::Store(inner) => store_status(inner),
            ControlError::Realtime(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        let status = match &e {
            GatewayError::UnknownRoom(_) => StatusCode::BAD_REQUEST,
            GatewayError::Realtime(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<AdminError> for AppError {
    fn from(e: AdminError) -> Self {
        let status = match &e {
            AdminError::InvalidUser(_) | AdminError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
            AdminError::CorruptSettings(_) => StatusCode::BAD_GATEWAY,
            AdminError::Store(inner) => store_status(inner),
        };
        Self::new(status, e.to_string())
    }
}
