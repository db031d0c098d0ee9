use thiserror::Error;

/// Storage errors shared by the on-disk JSON stores.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse data: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

impl StorageError {
    pub fn directory(msg: impl Into<String>) -> Self {
        StorageError::DirectoryError(msg.into())
    }
}
