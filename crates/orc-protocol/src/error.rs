//! Error taxonomy (§7). Errors are tagged by a 6-digit-style `Kind` code
//! grouping, not by language type; `OrcError` is the one carrier type used
//! throughout `orc-mqtt` and `orc-core`.

use serde::{Deserialize, Serialize};

/// The `Kind` code groups named in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    InternalInvariantViolation,
    ExternalFirmwareSameVersion,
    ExternalFirmwareUpdateFailed,
    ExternalDeploymentInvalidAppFile,
    ExternalDeploymentTimeout,
    ExternalDeploymentFailed,
    ExternalDeviceNotFound,
    ExternalInvalidMethodDuringState,
    ExternalFileNotFound,
}

impl Kind {
    /// `true` for internal errors, which panic/abort rather than surface to
    /// API callers (§7's Internal/External axis).
    pub fn is_internal(self) -> bool {
        matches!(self, Kind::InternalInvariantViolation)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("[{kind:?}] {message}")]
pub struct OrcError {
    pub kind: Kind,
    pub message: String,
}

impl OrcError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        OrcError {
            kind,
            message: message.into(),
        }
    }

    pub fn firmware_same_version() -> Self {
        OrcError::new(
            Kind::ExternalFirmwareSameVersion,
            "already same firmware version is available",
        )
    }

    pub fn invalid_app_file() -> Self {
        OrcError::new(
            Kind::ExternalDeploymentInvalidAppFile,
            "module file does not begin with a recognized AoT header",
        )
    }

    pub fn device_not_found(device_id: impl std::fmt::Display) -> Self {
        OrcError::new(
            Kind::ExternalDeviceNotFound,
            format!("device {device_id} not found"),
        )
    }

    pub fn invalid_method_during_state(method: &str, state: &str) -> Self {
        OrcError::new(
            Kind::ExternalInvalidMethodDuringState,
            format!("method {method} is not allowed while device is in state {state}"),
        )
    }

    pub fn file_not_found(path: impl std::fmt::Display) -> Self {
        OrcError::new(Kind::ExternalFileNotFound, format!("file not found: {path}"))
    }

    pub fn deployment_timeout(reason: impl Into<String>) -> Self {
        OrcError::new(Kind::ExternalDeploymentTimeout, reason.into())
    }

    pub fn firmware_update_failed(reason: impl Into<String>) -> Self {
        OrcError::new(Kind::ExternalFirmwareUpdateFailed, reason.into())
    }

    pub fn deployment_failed(reason: impl Into<String>) -> Self {
        OrcError::new(Kind::ExternalDeploymentFailed, reason.into())
    }
}

pub type OrcResult<T> = Result<T, OrcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_same_version_uses_the_right_kind() {
        let err = OrcError::firmware_same_version();
        assert_eq!(err.kind, Kind::ExternalFirmwareSameVersion);
    }

    #[test]
    fn only_invariant_violation_is_internal() {
        assert!(Kind::InternalInvariantViolation.is_internal());
        assert!(!Kind::ExternalDeviceNotFound.is_internal());
    }

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Kind::ExternalFirmwareSameVersion).unwrap();
        assert_eq!(json, "\"EXTERNAL_FIRMWARE_SAME_VERSION\"");
    }
}
