use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read tags: {0}")]
    ReadFailed(String),

    #[error("Failed to write tags: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MetadataError> for bridge_traits::BridgeError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Io(e) => bridge_traits::BridgeError::Io(e),
            other => bridge_traits::BridgeError::OperationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
