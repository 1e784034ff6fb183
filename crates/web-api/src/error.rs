use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let code = error.code();
        let status = match &error {
            ApplicationError::Domain(DomainError::ValidationError { .. }) => StatusCode::BAD_REQUEST,
            ApplicationError::Domain(DomainError::ResourceAlreadyExists { .. }) => {
                StatusCode::CONFLICT
            }
            ApplicationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            ApplicationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            ApplicationError::Store(_)
            | ApplicationError::Repository(_)
            | ApplicationError::Password(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApplicationError::NotConnected(_) => StatusCode::CONFLICT,
            ApplicationError::Authentication => StatusCode::UNAUTHORIZED,
            ApplicationError::Authorization { .. } => StatusCode::FORBIDDEN,
            ApplicationError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        };

        // 内部错误只记日志，不把存储细节暴露给客户端
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, code, "request failed");
            return ApiError::new(status, code, "internal error");
        }
        ApiError::new(status, code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RoomId;

    #[test]
    fn application_errors_map_to_http_status() {
        let cases = [
            (
                ApplicationError::Domain(DomainError::validation_error("text", "empty")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::Domain(DomainError::resource_already_exists("user", "alice")),
                StatusCode::CONFLICT,
            ),
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::authorization(RoomId::generate()),
                StatusCode::FORBIDDEN,
            ),
            (
                ApplicationError::RoomNotFound(RoomId::generate()),
                StatusCode::NOT_FOUND,
            ),
            (
                ApplicationError::Repository(RepositoryError::Conflict),
                StatusCode::CONFLICT,
            ),
            (
                ApplicationError::Store(RepositoryError::storage("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let api_error = ApiError::from(error);
            assert_eq!(api_error.status(), expected);
        }
    }

    #[test]
    fn store_errors_hide_details() {
        let api_error = ApiError::from(ApplicationError::Store(RepositoryError::storage(
            "connection refused at 10.0.0.3",
        )));
        assert_eq!(api_error.code(), "STORE_ERROR");
        assert_eq!(api_error.body.message, "internal error");
    }
}
