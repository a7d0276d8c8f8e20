use thiserror::Error;

/// Type alias for Result with SummaryError
pub type Result<T> = std::result::Result<T, SummaryError>;

/// Error types for the summarization pipeline
#[derive(Error, Debug)]
pub enum SummaryError {
    /// `summarize` was called with no items
    #[error("No items provided for summarization")]
    EmptyInput,

    /// One or more items lack an identifier. Batch validation lists the
    /// offending positions; a single item leaves `indices` empty.
    #[error("{}", describe_missing(.indices))]
    MissingIdentifier { indices: Vec<usize> },

    /// Input rejected for any other reason (wrong owner, bad arguments)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The generation call exceeded the configured budget
    #[error("Summary generation timed out after {seconds:.1} seconds")]
    GenerationTimeout { seconds: f64 },

    /// Provider rejected the request because of rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Provider call timed out at the HTTP layer
    #[error("Provider request timed out: {0}")]
    ProviderTimeout(String),

    /// Provider returned a 5xx error
    #[error("Provider server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Provider returned an error that is not otherwise classified
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Connection-level failure talking to the provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Credentials missing or rejected by the provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No summary stored for the given item and owner
    #[error("Summary not found for item {item_id}")]
    SummaryNotFound { item_id: String },

    /// Source email could not be located for the owner
    #[error("Email {item_id} not found for owner {owner_id}")]
    ItemNotFound { item_id: String, owner_id: String },

    /// Underlying persistence layer failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SummaryError {
    /// Check if the error is a transient provider failure worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SummaryError::RateLimitExceeded(_)
                | SummaryError::ProviderTimeout(_)
                | SummaryError::ServerError { .. }
                | SummaryError::ApiError(_)
                | SummaryError::NetworkError(_)
        )
    }

    /// Any failure that originated at the provider boundary
    pub fn is_provider_error(&self) -> bool {
        self.is_transient() || matches!(self, SummaryError::Authentication(_))
    }

    /// Input validation failures, raised before any provider call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SummaryError::EmptyInput
                | SummaryError::MissingIdentifier { .. }
                | SummaryError::InvalidInput(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SummaryError::SummaryNotFound { .. } | SummaryError::ItemNotFound { .. }
        )
    }

    /// Map an HTTP status and response body from a provider into an error
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate_body(body);
        match status {
            429 => SummaryError::RateLimitExceeded(message),
            401 | 403 => SummaryError::Authentication(message),
            408 | 504 => SummaryError::ProviderTimeout(message),
            500..=599 => SummaryError::ServerError { status, message },
            _ => SummaryError::ApiError(format!("HTTP {}: {}", status, message)),
        }
    }
}

fn describe_missing(indices: &[usize]) -> String {
    if indices.is_empty() {
        "Item is missing an identifier".to_string()
    } else {
        format!("Items missing identifier at indices {:?}", indices)
    }
}

/// Keep provider error bodies readable in logs
fn truncate_body(body: &str) -> String {
    const MAX_LEN: usize = 500;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_LEN {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_LEN).collect();
        format!("{}...", head)
    }
}

impl From<reqwest::Error> for SummaryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SummaryError::ProviderTimeout(error.to_string())
        } else if let Some(status) = error.status() {
            SummaryError::from_status(status.as_u16(), &error.to_string())
        } else if error.is_decode() {
            SummaryError::ApiError(format!("Malformed provider response: {}", error))
        } else {
            SummaryError::NetworkError(error.to_string())
        }
    }
}
