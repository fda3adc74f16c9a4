//! Axum `IntoResponse` wrapper around `orc_protocol::OrcError` (§7, §10.3),
//! mirroring `orc_core::error::ApiError` — duplicated rather than shared
//! since `orc-artifacts` deliberately doesn't depend on `orc-core` (the
//! daemon is the only crate that needs both).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use orc_protocol::{Kind, OrcError};

pub struct ApiError(pub OrcError);

impl From<OrcError> for ApiError {
    fn from(err: OrcError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;

        if err.kind.is_internal() {
            let correlation_id = uuid::Uuid::new_v4();
            tracing::error!(
                correlation_id = %correlation_id,
                kind = ?err.kind,
                message = %err.message,
                "internal error"
            );
            let body = json!({
                "error": "internal error",
                "correlation_id": correlation_id.to_string(),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        }

        let status = match err.kind {
            Kind::ExternalDeviceNotFound | Kind::ExternalFileNotFound => StatusCode::NOT_FOUND,
            Kind::ExternalInvalidMethodDuringState => StatusCode::CONFLICT,
            Kind::ExternalFirmwareSameVersion
            | Kind::ExternalFirmwareUpdateFailed
            | Kind::ExternalDeploymentInvalidAppFile
            | Kind::ExternalDeploymentTimeout
            | Kind::ExternalDeploymentFailed => StatusCode::BAD_REQUEST,
            Kind::InternalInvariantViolation => unreachable!("handled above"),
        };

        let body = json!({
            "code": format!("{:?}", err.kind),
            "message": err.message,
        });
        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_not_found_maps_to_404() {
        let err: ApiError = OrcError::file_not_found("Images/0001.jpg").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
