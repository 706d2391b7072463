use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("A product with slug '{0}' already exists")]
    DuplicateSlug(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidCategory(_)
                | Error::DuplicateSlug(_)
                | Error::NotFound(_)
                | Error::Upload(_)
                | Error::Decode(_)
        )
    }
}

/// A form field carried JSON that could not be decoded into its target type
#[derive(Error, Debug)]
#[error("Invalid JSON in field '{field}': {source}")]
pub struct DecodeError {
    pub field: String,
    #[source]
    pub source: serde_json::Error,
}

pub type Result<T> = std::result::Result<T, Error>;
