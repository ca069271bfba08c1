use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored value `{namespace}/{key}` has an unexpected type")]
    TypeMismatch { namespace: String, key: String },
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("failed to join `{ssid}`: {reason}")]
    JoinFailed { ssid: String, reason: String },
    #[error("access point error: {0}")]
    AccessPoint(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Join(#[from] NetworkError),
    #[error("joined but failed to store credentials: {0}")]
    Persist(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorError {
    #[error("expected 6 hex digits (RRGGBB), got `{0}`")]
    InvalidHex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every variant is a malformed request: answered with 400 and nothing applied.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Missing body")]
    MissingBody,
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Invalid fields: {}", join_fields(.0))]
    InvalidFields(Vec<FieldError>),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_fields_lists_every_field() {
        let err = RequestError::InvalidFields(vec![
            FieldError::new("layout", "expected 0 or 1"),
            FieldError::new("background", "expected 6 hex digits"),
        ]);

        assert_eq!(
            err.to_string(),
            "Invalid fields: layout: expected 0 or 1; background: expected 6 hex digits"
        );
    }
}
