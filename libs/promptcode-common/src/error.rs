use thiserror::Error;

/// Fatal input problems. A submission that fails validation is rejected
/// before it reaches scoring.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("user id must not be empty")]
    MissingUser,

    #[error("unknown question id '{0}'")]
    UnknownQuestion(String),

    #[error("question '{0}' has no test cases")]
    NoTestCases(String),
}

impl ValidationError {
    /// Stable label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::EmptyPrompt => "empty_prompt",
            ValidationError::MissingUser => "missing_user",
            ValidationError::UnknownQuestion(_) => "unknown_question",
            ValidationError::NoTestCases(_) => "no_test_cases",
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("question catalog not found: {0}")]
    NotFound(String),

    #[error("failed to read question catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate question id '{0}'")]
    DuplicateQuestion(String),

    #[error("invalid question '{id}': {reason}")]
    InvalidQuestion { id: String, reason: String },
}
