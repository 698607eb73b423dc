use datarec_catalog::{CatalogStore, NewDataset};
use datarec_indexer::{EmbedOptions, EmbeddingJob};
use datarec_vector_store::{
    DataLayout, EmbeddingModel, EmbeddingRepository, JsonEmbeddingStore, TextVectorizer,
    TfidfVectorizer,
};
use std::sync::Arc;
use tempfile::TempDir;

fn dataset(title: &str, description: &str) -> NewDataset {
    NewDataset {
        title: title.to_string(),
        description: description.to_string(),
        source: "Kaggle".to_string(),
        url: format!("https://www.kaggle.com/datasets/owner/{}", title.replace(' ', "-")),
        size: "1 MB".to_string(),
        format: "CSV".to_string(),
    }
}

#[test]
fn embedding_job_persists_vectors_with_shared_dimensions() {
    let temp = TempDir::new().expect("tempdir");
    let layout = DataLayout::new(temp.path());
    let catalog = Arc::new(CatalogStore::open(layout.catalog()).expect("catalog"));
    catalog
        .insert_many(vec![
            dataset("Retail sales", "Monthly revenue by store"),
            dataset("Weather", "Hourly station readings"),
        ])
        .expect("seed catalog");

    let store = Arc::new(JsonEmbeddingStore::open(layout.embeddings()).expect("store"));
    let job = EmbeddingJob::new(
        catalog.clone(),
        store,
        Arc::new(EmbeddingModel::stub(16)),
        layout.clone(),
    );
    let first = job.run(EmbedOptions::default()).expect("first run");
    assert!(first.refitted);

    // A dataset added later is embedded with the existing vocabulary unless refit is requested.
    catalog
        .insert(dataset("Flights", "Airline delays by route"))
        .expect("insert");
    let second = job.run(EmbedOptions::default()).expect("second run");
    assert!(!second.refitted);
    assert_eq!(second.created, 1);
    assert_eq!(second.updated, 2);
    assert_eq!(second.lexical_dim, first.lexical_dim);

    let reopened = JsonEmbeddingStore::open(layout.embeddings()).expect("reopen");
    let all = reopened.load_all().expect("load all");
    assert_eq!(
        all.iter().map(|v| v.dataset_id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(all
        .iter()
        .all(|v| v.lexical.len() == first.lexical_dim && v.dense.len() == 16));

    let refit = job
        .run(EmbedOptions {
            refit: true,
            ..EmbedOptions::default()
        })
        .expect("refit run");
    assert!(refit.refitted);
    let vectorizer = TfidfVectorizer::load(&layout.vectorizer()).expect("load vectorizer");
    assert_eq!(vectorizer.dimension(), refit.lexical_dim);
    assert!(refit.lexical_dim > first.lexical_dim);
}
