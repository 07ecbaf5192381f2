//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use callcheck_core::report::ExportError;
use callcheck_core::session::OrchestratorError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Orchestrator(OrchestratorError::UnknownTest(_)) => StatusCode::NOT_FOUND,
            ApiError::Orchestrator(OrchestratorError::ResultMismatch { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Orchestrator(_) => StatusCode::CONFLICT,
            ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "api_request_failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "api_request_rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callcheck_core::session::{ProbeStatus, TestId};

    #[test]
    fn test_status_mapping() {
        let err: ApiError = OrchestratorError::UnknownTest("webcam".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = OrchestratorError::AlreadyRunning {
            active: TestId::Speed,
            requested: TestId::Ping,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = OrchestratorError::NotRunning {
            id: TestId::Ping,
            status: ProbeStatus::NotStarted,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError =
            ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
