use thiserror::Error;

/// Failure reported by the object store or the metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Failure talking to the identity provider
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("identity provider returned {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Transport-level failure calling the inference gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway returned status {0}")]
    Status(u16),
}

/// Terminal outcome of a failed upload. `Display` is the status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Upload error: {0}")]
    Storage(String),

    #[error("You must be logged in to upload files.")]
    NotAuthenticated,

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Parsing failed.")]
    ParseFailed,

    #[error("Error calling backend AI parser.")]
    ParserUnavailable,
}

impl UploadError {
    /// Stable code for logs and API clients
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::Storage(_) => "STORAGE_ERROR",
            UploadError::NotAuthenticated => "NOT_AUTHENTICATED",
            UploadError::Metadata(_) => "METADATA_ERROR",
            UploadError::ParseFailed => "PARSE_FAILED",
            UploadError::ParserUnavailable => "PARSER_UNAVAILABLE",
        }
    }
}
