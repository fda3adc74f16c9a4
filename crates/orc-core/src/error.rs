//! Axum `IntoResponse` wrapper around `orc_protocol::OrcError` (§7, §10.3):
//! external errors become 4xx with `{code, message}`; internal errors
//! become 5xx with a logged correlation id, never leaking the invariant
//! violation's detail to the caller.

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
    fn device_not_found_maps_to_404() {
        let err: ApiError = OrcError::device_not_found(1883).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_state_maps_to_409() {
        let err: ApiError =
            OrcError::invalid_method_during_state("start_streaming", "error").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn same_version_maps_to_400() {
        let err: ApiError = OrcError::firmware_same_version().into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_error_maps_to_500_without_leaking_message() {
        let err: ApiError =
            OrcError::new(Kind::InternalInvariantViolation, "secret detail").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
