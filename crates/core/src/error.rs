use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Failures talking to the document store, before any classification.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("index does not exist: {0}")]
    IndexNotFound(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Http(error) if error.is_connect() || error.is_timeout())
    }
}

/// Error kinds surfaced by the search core.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("document store unavailable: {0}")]
    BackendUnavailable(String),

    #[error("search execution failed: {0}")]
    SearchExecution(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
