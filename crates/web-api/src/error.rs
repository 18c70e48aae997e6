use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
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

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
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
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::EmptyContent => ApiError::new(
                StatusCode::BAD_REQUEST,
                "EMPTY_CONTENT",
                "message content cannot be empty",
            ),
            AppErr::Repository(RepositoryError::NotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "requested resource not found",
            ),
            // 存储细节只写日志，不回给客户端
            AppErr::Repository(RepositoryError::Storage { .. }) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "STORAGE_ERROR",
                "message storage is unavailable",
            ),
            AppErr::HubUnavailable => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "HUB_UNAVAILABLE",
                "chat is shutting down",
            ),
            AppErr::Encode(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENCODE_ERROR",
                format!("encode error: {}", err),
            ),
            AppErr::Infrastructure(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
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
    use domain::{DomainError, RepositoryError};

    #[test]
    fn maps_application_errors_to_status_codes() {
        let cases = [
            (ApplicationError::EmptyContent, StatusCode::BAD_REQUEST),
            (
                ApplicationError::Domain(DomainError::invalid_argument("user_id", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::Repository(RepositoryError::storage("down")),
                StatusCode::BAD_GATEWAY,
            ),
            (ApplicationError::HubUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                ApplicationError::infrastructure("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let error = ApiError::from(ApplicationError::Repository(RepositoryError::storage(
            "password=hunter2",
        )));
        assert_eq!(error.code(), "STORAGE_ERROR");
        assert!(!error.body.message.contains("hunter2"));
    }

    #[test]
    fn storage_message_fits_reads_and_writes() {
        let error = ApiError::from(ApplicationError::Repository(RepositoryError::storage(
            "select failed",
        )));
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
        assert!(!error.body.message.contains("save"));
    }
}
