use deploy_core::error::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Rejected before any mutating call was issued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The control plane rejected a call or reported a failed update.
    #[error("{operation} failed: {reason}")]
    ControlPlane {
        operation: &'static str,
        reason: String,
    },

    /// A poll ran out of attempts before reaching a terminal state.
    #[error("timed out waiting for {resource} after {attempts} attempts")]
    Timeout { resource: String, attempts: u32 },
}

impl DeployError {
    pub fn control_plane(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::ControlPlane {
            operation,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(ValidationError::Manifest(_)) => 400,
            Self::Validation(ValidationError::PolicyDenied(_)) => 403,
            Self::ControlPlane { .. } => 502,
            Self::Timeout { .. } => 504,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::Manifest(_)) => "validation_error",
            Self::Validation(ValidationError::PolicyDenied(_)) => "policy_denied",
            Self::ControlPlane { .. } => "control_plane_error",
            Self::Timeout { .. } => "timeout",
        }
    }
}
