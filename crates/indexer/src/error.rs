use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] datarec_catalog::CatalogError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] datarec_vector_store::VectorStoreError),

    #[error("{0}")]
    Other(String),
}
