use crate::error::Result;
use crate::scorer::{ScoredDataset, SimilarityScorer};
use datarec_catalog::CatalogReader;
use datarec_protocol::DatasetResult;
use std::sync::Arc;

/// Joins scored dataset ids back to catalog metadata.
pub struct Ranker {
    catalog: Arc<dyn CatalogReader>,
}

impl Ranker {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// Preserves input order. Ids that are no longer cataloged are skipped.
    pub fn resolve(&self, scored: &[ScoredDataset]) -> Result<Vec<DatasetResult>> {
        let ids: Vec<_> = scored.iter().map(|s| s.dataset_id).collect();
        let mut found = self.catalog.get_many(&ids)?;

        let mut results = Vec::with_capacity(scored.len());
        for item in scored {
            let Some(record) = found.remove(&item.dataset_id) else {
                log::warn!(
                    "Dataset {} has embeddings but no catalog record; skipping",
                    item.dataset_id
                );
                continue;
            };
            results.push(DatasetResult {
                id: record.id,
                title: record.title,
                description: record.description,
                url: record.url,
                size: record.size,
                format: record.format,
                similarity_score: item.score,
            });
        }
        Ok(results)
    }
}

/// Scorer plus ranker: query text in, ranked catalog entries out.
pub struct Recommender {
    scorer: SimilarityScorer,
    ranker: Ranker,
}

impl Recommender {
    pub fn new(scorer: SimilarityScorer, ranker: Ranker) -> Self {
        Self { scorer, ranker }
    }

    /// Ranked results, truncated to `limit` after resolution when given.
    pub fn recommend(&self, query: &str, limit: Option<usize>) -> Result<Vec<DatasetResult>> {
        let scored = self.scorer.score(query)?;
        let mut results = self.ranker.resolve(&scored).map_err(|err| {
            log::error!("Query '{query}' failed while resolving datasets: {err}");
            err
        })?;
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        log::info!("Query '{query}' returned {} datasets", results.len());
        Ok(results)
    }
}
