use datarec_catalog::{CatalogError, DatasetId};
use datarec_vector_store::{VectorKind, VectorStoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error(
        "Dimension mismatch for dataset {dataset_id}: stored {kind} vector has {actual} dims, query has {expected}"
    )]
    DimensionMismatch {
        dataset_id: DatasetId,
        kind: VectorKind,
        expected: usize,
        actual: usize,
    },
}
