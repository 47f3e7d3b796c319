use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by list control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The index pattern referenced by a control could not be resolved.
    #[error("Could not locate index-pattern id: {id}")]
    IndexPatternNotFound { id: String },

    /// The control's field is not part of the resolved index pattern.
    #[error("field \"{field}\" not found in index pattern \"{index_pattern}\"")]
    FieldNotFound { field: String, index_pattern: String },

    /// The search backend rejected or failed to run the aggregation request.
    #[error("search execution failed: {message}")]
    SearchExecution { message: String },

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Invalid input supplied to a control, filter, or search operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl ControlError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_pattern_message_names_the_id() {
        let err = ControlError::IndexPatternNotFound {
            id: "logs-*".to_string(),
        };
        assert_eq!(err.to_string(), "Could not locate index-pattern id: logs-*");
    }
}
