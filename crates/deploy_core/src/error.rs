use thiserror::Error;

/// Rejection raised before any control-plane mutation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The manifest is malformed or missing a required field.
    #[error("{0}")]
    Manifest(String),

    /// The requested permission policy breaks the least-privilege rules.
    /// Carries every violation, in statement order.
    #[error("Requested policies were not permitted: {}", .0.join(" "))]
    PolicyDenied(Vec<String>),
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    pub fn violations(&self) -> &[String] {
        match self {
            Self::Manifest(_) => &[],
            Self::PolicyDenied(violations) => violations,
        }
    }
}
