//! Error types shared by the attribute and event repositories

use thiserror::Error;

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors surfaced by the connector core
///
/// Configuration errors are reported when an attribute or event is connected and
/// only ever affect that single attribute or event.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The `gauge` selector names a family the registry does not know
    #[error("unrecognized attribute type '{0}'")]
    UnrecognizedAttributeType(String),

    /// A required descriptor parameter is absent
    #[error("missing configuration parameter '{parameter}' for '{owner}'")]
    MissingParameter { owner: String, parameter: String },

    /// A descriptor parameter could not be parsed
    #[error("invalid value '{value}' for configuration parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// The filter expression could not be compiled
    #[error("invalid filter expression '{expression}': {reason}")]
    InvalidFilter { expression: String, reason: String },

    /// No attribute with the given id is connected
    #[error("attribute '{0}' is not connected")]
    AttributeNotFound(String),

    /// No event category with the given id is connected
    #[error("event category '{0}' is not connected")]
    EventNotFound(String),

    /// Writes to event-driven attributes are always rejected
    #[error("attribute '{0}' cannot be modified")]
    CannotBeModified(String),

    /// The attribute was closed while the operation was pending
    #[error("attribute '{0}' is closed")]
    AttributeClosed(String),

    /// A processing attribute references an attribute it cannot read from
    #[error("attribute '{source_name}' cannot be used as a source for '{attribute}'")]
    InvalidSource {
        attribute: String,
        source_name: String,
    },

    /// A structured value did not have the expected shape
    #[error("value of '{attribute}' cannot be processed: {reason}")]
    InvalidValue { attribute: String, reason: String },

    /// Snapshot (de)serialization failed
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The connector has been closed and no longer accepts work
    #[error("connector for resource '{0}' is closed")]
    Closed(String),

    /// Waiting for a batch operation was interrupted
    #[error("batch operation interrupted: {0}")]
    Interrupted(String),
}

impl ConnectorError {
    pub(crate) fn missing(owner: impl Into<String>, parameter: impl Into<String>) -> Self {
        ConnectorError::MissingParameter {
            owner: owner.into(),
            parameter: parameter.into(),
        }
    }

    pub(crate) fn invalid(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        ConnectorError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is a configuration fault raised while connecting
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConnectorError::UnrecognizedAttributeType(_)
                | ConnectorError::MissingParameter { .. }
                | ConnectorError::InvalidParameter { .. }
                | ConnectorError::InvalidFilter { .. }
        )
    }
}
