use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Dataset with url '{url}' already exists (id {existing_id})")]
    DuplicateUrl { url: String, existing_id: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Unsupported {file} schema_version {found} (expected {expected})")]
    SchemaVersion {
        file: String,
        found: u32,
        expected: u32,
    },

    #[error("{0}")]
    Other(String),
}
