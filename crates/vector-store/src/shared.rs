//! Process-wide read-only models, loaded once on first use.

use crate::embeddings::EmbeddingModel;
use crate::error::{Result, VectorStoreError};
use crate::lexical::TfidfVectorizer;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static EMBEDDER: OnceCell<Arc<EmbeddingModel>> = OnceCell::new();
static VECTORIZER: OnceCell<(PathBuf, Arc<TfidfVectorizer>)> = OnceCell::new();

/// The embedding model configured by the `DATAREC_*` environment.
pub fn shared_embedder() -> Result<Arc<EmbeddingModel>> {
    EMBEDDER
        .get_or_try_init(|| EmbeddingModel::from_env().map(Arc::new))
        .cloned()
}

/// The fitted vectorizer loaded from `path`.
///
/// A failed load leaves the cell empty, so a later call can retry once the state exists.
pub fn shared_vectorizer(path: &Path) -> Result<Arc<TfidfVectorizer>> {
    let (loaded_from, vectorizer) = VECTORIZER.get_or_try_init(|| {
        TfidfVectorizer::load(path).map(|v| (path.to_path_buf(), Arc::new(v)))
    })?;
    if loaded_from != path {
        return Err(VectorStoreError::Other(format!(
            "vectorizer already loaded from {}, cannot switch to {}",
            loaded_from.display(),
            path.display()
        )));
    }
    Ok(vectorizer.clone())
}
