use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "DATAREC_DATA_DIR";
pub const DEFAULT_DATA_DIR_NAME: &str = ".datarec";

pub const CATALOG_FILE_NAME: &str = "catalog.json";
pub const EMBEDDINGS_FILE_NAME: &str = "embeddings.json";
pub const VECTORIZER_FILE_NAME: &str = "tfidf_vectorizer.json";
pub const QUERY_LOG_FILE_NAME: &str = "queries.json";

/// Data directory from `DATAREC_DATA_DIR`, else `./.datarec`.
#[must_use]
pub fn data_dir_from_env() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR_NAME), PathBuf::from)
}

/// File layout of one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(data_dir_from_env())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn catalog(&self) -> PathBuf {
        self.root.join(CATALOG_FILE_NAME)
    }

    #[must_use]
    pub fn embeddings(&self) -> PathBuf {
        self.root.join(EMBEDDINGS_FILE_NAME)
    }

    #[must_use]
    pub fn vectorizer(&self) -> PathBuf {
        self.root.join(VECTORIZER_FILE_NAME)
    }

    #[must_use]
    pub fn query_log(&self) -> PathBuf {
        self.root.join(QUERY_LOG_FILE_NAME)
    }
}
