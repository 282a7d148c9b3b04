use thiserror::Error;
use tracing::{error, warn};

use crate::domain::error::DomainError;
use crate::infra::remote::RemoteError;

/// Failure of an API operation, classified so callers can tell "not found"
/// from "backend unreachable" from "bad input".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("not signed in")]
    Unauthorized,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend returned status {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("missing required `{0}`")]
    Precondition(&'static str),
}

impl ApiError {
    /// Classify a backend failure and log it against the operation name.
    pub(crate) fn remote(op: &'static str, entity: &'static str, err: RemoteError) -> Self {
        let classified = match err {
            RemoteError::Transport(message) => Self::Unavailable(message),
            RemoteError::Decode(message) => Self::Malformed(message),
            RemoteError::InvalidRequest(message) => Self::Validation(message),
            RemoteError::Status { status, message, .. } => match status {
                404 => Self::NotFound { entity },
                401 => Self::Unauthorized,
                400 | 409 => Self::Validation(message),
                500.. => Self::Unavailable(message),
                _ => Self::Remote { status, message },
            },
        };

        if matches!(classified, Self::Unavailable(_) | Self::Malformed(_)) {
            error!(op, entity, error = %classified, "backend call failed");
        } else {
            warn!(op, entity, error = %classified, "backend call rejected");
        }
        classified
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Missing { field } => Self::Precondition(field),
            other => Self::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_classified() {
        let not_found = RemoteError::status(404, "document_not_found", "missing");
        assert_eq!(
            ApiError::remote("get_post", "post", not_found),
            ApiError::NotFound { entity: "post" }
        );

        let unreachable = RemoteError::Transport("connection refused".into());
        assert!(matches!(
            ApiError::remote("get_post", "post", unreachable),
            ApiError::Unavailable(_)
        ));

        let conflict = RemoteError::status(409, "user_already_exists", "taken");
        assert_eq!(
            ApiError::remote("create_account", "account", conflict),
            ApiError::Validation("taken".into())
        );

        let throttled = RemoteError::status(429, "general_rate_limit_exceeded", "slow down");
        assert_eq!(
            ApiError::remote("list_posts", "post", throttled),
            ApiError::Remote {
                status: 429,
                message: "slow down".into()
            }
        );
    }

    #[test]
    fn missing_fields_become_preconditions() {
        assert_eq!(
            ApiError::from(DomainError::missing("post_id")),
            ApiError::Precondition("post_id")
        );
        assert!(matches!(
            ApiError::from(DomainError::SelfFollow),
            ApiError::Validation(_)
        ));
    }
}
