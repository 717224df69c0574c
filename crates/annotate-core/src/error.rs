use thiserror::Error;

/// Failures of the key-value persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored annotations are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Failures reported by the PDF document adapter.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Page {page} is out of range (1-{page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Invalid annotation {id}: {reason}")]
    InvalidAnnotation { id: String, reason: String },
}

/// Failures of the export path, the only class shown to the user.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Download failed: {0}")]
    Download(String),
}

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Not ready: {0}")]
    NotReady(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The annotation table holds the note but the store does not.
    #[error("Annotation {id} was not persisted: {source}")]
    Unsaved {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid message: {0}")]
    Message(String),
}
