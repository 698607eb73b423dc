use crate::error::{IndexerError, Result};
use crate::index_lock::acquire_job_lock;
use crate::stats::{EmbedStats, FitStats};
use datarec_catalog::{unix_now_ms, CatalogStore, DatasetRecord};
use datarec_vector_store::{
    DataLayout, EmbeddingRecord, EmbeddingRepository, TextEmbedder, TextVectorizer,
    TfidfVectorizer,
};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_EMBED_BATCH: usize = 32;

/// `title + " " + description` with whitespace runs collapsed to single spaces.
#[must_use]
pub fn normalized_text(record: &DatasetRecord) -> String {
    record
        .combined_text()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy)]
pub struct EmbedOptions {
    /// Refit the vectorizer even when fitted state exists.
    pub refit: bool,
    pub batch_size: usize,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            refit: false,
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }
}

/// Fits the TF-IDF vectorizer over the whole catalog and saves it.
pub fn fit_vectorizer(catalog: &CatalogStore, layout: &DataLayout) -> Result<FitStats> {
    let _lock = acquire_job_lock(layout.root())?;
    let texts: Vec<String> = catalog.list()?.iter().map(normalized_text).collect();
    let vectorizer = TfidfVectorizer::fitted(&texts)?;
    vectorizer.save(&layout.vectorizer())?;
    Ok(FitStats {
        documents: texts.len(),
        vocabulary: vectorizer.dimension(),
    })
}

/// Recomputes both vectors for every cataloged dataset.
pub struct EmbeddingJob {
    catalog: Arc<CatalogStore>,
    store: Arc<dyn EmbeddingRepository>,
    embedder: Arc<dyn TextEmbedder>,
    layout: DataLayout,
}

impl EmbeddingJob {
    pub fn new(
        catalog: Arc<CatalogStore>,
        store: Arc<dyn EmbeddingRepository>,
        embedder: Arc<dyn TextEmbedder>,
        layout: DataLayout,
    ) -> Self {
        Self {
            catalog,
            store,
            embedder,
            layout,
        }
    }

    pub fn run(&self, options: EmbedOptions) -> Result<EmbedStats> {
        let started = Instant::now();
        let lock = acquire_job_lock(self.layout.root())?;
        let mut stats = EmbedStats {
            lock_wait_ms: lock.waited_ms(),
            ..EmbedStats::default()
        };

        let datasets = self.catalog.list()?;
        if datasets.is_empty() {
            log::warn!("Catalog is empty; nothing to embed");
            return Ok(stats);
        }
        let texts: Vec<String> = datasets.iter().map(normalized_text).collect();

        let vectorizer_path = self.layout.vectorizer();
        let vectorizer = if options.refit || !vectorizer_path.exists() {
            let vectorizer = TfidfVectorizer::fitted(&texts)?;
            vectorizer.save(&vectorizer_path)?;
            stats.refitted = true;
            vectorizer
        } else {
            TfidfVectorizer::load(&vectorizer_path)?
        };

        let lexical = texts
            .iter()
            .map(|text| vectorizer.transform(text))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let batch_size = options.batch_size.max(1);
        let mut dense = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = self.embedder.embed_many(&refs)?;
            if vectors.len() != refs.len() {
                return Err(IndexerError::Other(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    refs.len()
                )));
            }
            dense.extend(vectors);
            stats.batches += 1;
            log::debug!("Embedded {}/{} datasets", dense.len(), texts.len());
        }

        let now_ms = unix_now_ms();
        let records: Vec<EmbeddingRecord> = datasets
            .iter()
            .zip(texts)
            .zip(lexical.into_iter().zip(dense))
            .map(|((dataset, normalized_text), (lexical, dense))| EmbeddingRecord {
                dataset_id: dataset.id,
                lexical,
                dense,
                normalized_text,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            })
            .collect();

        stats.datasets = records.len();
        stats.lexical_dim = vectorizer.dimension();
        stats.dense_dim = self.embedder.dimension();
        let counts = self.store.upsert_many(records)?;
        stats.created = counts.created;
        stats.updated = counts.updated;
        stats.time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::info!(
            "Embedded {} datasets ({} created, {} updated; lexical dim {}, dense dim {})",
            stats.datasets,
            stats.created,
            stats.updated,
            stats.lexical_dim,
            stats.dense_dim
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datarec_catalog::NewDataset;
    use datarec_vector_store::{EmbeddingModel, InMemoryEmbeddingStore, VectorStoreError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn seeded_catalog(layout: &DataLayout, entries: &[(&str, &str)]) -> Arc<CatalogStore> {
        let catalog = CatalogStore::open(layout.catalog()).unwrap();
        for (idx, (title, description)) in entries.iter().enumerate() {
            catalog
                .insert(NewDataset {
                    title: (*title).to_string(),
                    description: (*description).to_string(),
                    url: format!("https://example.org/{idx}/{}", title.replace(' ', "-")),
                    ..NewDataset::default()
                })
                .unwrap();
        }
        Arc::new(catalog)
    }

    #[test]
    fn normalized_text_collapses_whitespace() {
        let record = DatasetRecord {
            id: 1,
            title: "  Retail\tsales ".into(),
            description: "by\n\nstore ".into(),
            source: String::new(),
            url: "u".into(),
            size: String::new(),
            format: String::new(),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        assert_eq!(normalized_text(&record), "Retail sales by store");
    }

    #[test]
    fn first_run_fits_and_second_run_reuses_vectorizer() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        let catalog = seeded_catalog(
            &layout,
            &[
                ("Retail sales", "Monthly revenue by store"),
                ("Weather", "Hourly station readings"),
                ("Flights", "Airline delays"),
            ],
        );
        let store = Arc::new(InMemoryEmbeddingStore::new());
        let job = EmbeddingJob::new(
            catalog,
            store.clone(),
            Arc::new(EmbeddingModel::stub(8)),
            layout.clone(),
        );

        let first = job
            .run(EmbedOptions {
                refit: false,
                batch_size: 2,
            })
            .unwrap();
        assert!(first.refitted);
        assert_eq!(first.datasets, 3);
        assert_eq!(first.created, 3);
        assert_eq!(first.batches, 2);
        assert_eq!(first.dense_dim, 8);
        assert!(layout.vectorizer().exists());

        let stored = store.get(2).unwrap().expect("dataset 2 embedded");
        assert_eq!(stored.normalized_text, "Weather Hourly station readings");
        assert_eq!(stored.lexical.len(), first.lexical_dim);

        let second = job.run(EmbedOptions::default()).unwrap();
        assert!(!second.refitted);
        assert_eq!(second.updated, 3);
        assert_eq!(second.created, 0);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn empty_catalog_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        let job = EmbeddingJob::new(
            seeded_catalog(&layout, &[]),
            Arc::new(InMemoryEmbeddingStore::new()),
            Arc::new(EmbeddingModel::stub(8)),
            layout.clone(),
        );
        let stats = job.run(EmbedOptions::default()).unwrap();
        assert_eq!(stats.datasets, 0);
        assert!(!layout.vectorizer().exists());
    }

    #[test]
    fn fit_vectorizer_rejects_catalog_without_tokens() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        let catalog = seeded_catalog(&layout, &[("a", "b")]);
        let err = fit_vectorizer(&catalog, &layout).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::VectorStoreError(VectorStoreError::InvalidCorpus(_))
        ));

        let catalog = seeded_catalog(&layout, &[("Census tracts", "Population counts")]);
        let stats = fit_vectorizer(&catalog, &layout).unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.vocabulary, 4);
    }
}
