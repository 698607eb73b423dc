use crate::error::{Result, SearchError};
use crate::fusion::BlendWeights;
use datarec_catalog::DatasetId;
use datarec_vector_store::{
    cosine_similarity, EmbeddingRepository, StoredVectors, TextEmbedder, TextVectorizer,
    VectorKind,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredDataset {
    pub dataset_id: DatasetId,
    /// Blended score used for ranking.
    pub score: f32,
    pub lexical: f32,
    pub dense: f32,
}

/// Scores a query against every stored dataset with both vector kinds.
///
/// Scoring is synchronous and read-only; callers on an async runtime should run it on a
/// blocking thread.
pub struct SimilarityScorer {
    vectorizer: Arc<dyn TextVectorizer>,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn EmbeddingRepository>,
    weights: BlendWeights,
}

impl SimilarityScorer {
    pub fn new(
        vectorizer: Arc<dyn TextVectorizer>,
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn EmbeddingRepository>,
    ) -> Self {
        Self {
            vectorizer,
            embedder,
            store,
            weights: BlendWeights::DEFAULT,
        }
    }

    /// Every stored dataset, best match first, ties by ascending dataset id.
    pub fn score(&self, query: &str) -> Result<Vec<ScoredDataset>> {
        let result = self.score_inner(query);
        match &result {
            Ok(scored) => {
                log::debug!("Scored {} datasets for query '{query}'", scored.len());
            }
            Err(err @ SearchError::DimensionMismatch { dataset_id, .. }) => {
                log::error!("Query '{query}' failed on dataset {dataset_id}: {err}");
            }
            Err(err) => log::error!("Query '{query}' failed: {err}"),
        }
        result
    }

    fn score_inner(&self, query: &str) -> Result<Vec<ScoredDataset>> {
        let query_lexical = self.vectorizer.transform(query)?;
        let query_dense = self.embedder.embed(query)?;

        let stored = self.store.load_all()?;
        validate_dimensions(&stored, query_lexical.len(), query_dense.len())?;

        let mut scored: Vec<ScoredDataset> = stored
            .iter()
            .map(|vectors| {
                let lexical = cosine_similarity(&query_lexical, &vectors.lexical);
                let dense = cosine_similarity(&query_dense, &vectors.dense);
                ScoredDataset {
                    dataset_id: vectors.dataset_id,
                    score: self.weights.blend(lexical, dense),
                    lexical,
                    dense,
                }
            })
            .collect();
        sort_by_score(&mut scored);
        Ok(scored)
    }
}

/// Fails on the first stored vector whose length differs from the query's.
pub fn validate_dimensions(
    stored: &[StoredVectors],
    lexical_dim: usize,
    dense_dim: usize,
) -> Result<()> {
    for vectors in stored {
        for (kind, expected, actual) in [
            (VectorKind::Lexical, lexical_dim, vectors.lexical.len()),
            (VectorKind::Dense, dense_dim, vectors.dense.len()),
        ] {
            if actual != expected {
                return Err(SearchError::DimensionMismatch {
                    dataset_id: vectors.dataset_id,
                    kind,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(())
}

pub fn sort_by_score(scored: &mut [ScoredDataset]) {
    scored.sort_by(compare_ranked);
}

fn compare_ranked(a: &ScoredDataset, b: &ScoredDataset) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.dataset_id.cmp(&b.dataset_id))
}
