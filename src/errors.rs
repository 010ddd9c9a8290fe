/// Domain-specific error types for ragfuse
///
/// The lexical core never returns these for well-formed input: empty matches and
/// missing terms are ordinary results. Errors are reserved for bad configuration,
/// malformed corpus records and failing external collaborators.

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::Corpus(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::Corpus(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RagError {
    fn from(e: tokio::task::JoinError) -> Self {
        RagError::Internal(e.to_string())
    }
}

impl RagError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use ragfuse::errors::RagError;
    /// let err = RagError::validation("text", "Passage text cannot be empty");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        RagError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// Whether the error came from an external model or service rather than from us.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, RagError::Collaborator(_) | RagError::Timeout(_))
    }
}
