use crate::error::Result;
use crate::types::{EmbeddingRecord, StoredVectors, UpsertCounts, UpsertOutcome};
use datarec_catalog::{unix_now_ms, DatasetId, JsonStateFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Per-dataset vector storage as seen by the scorer and the embedding job.
pub trait EmbeddingRepository: Send + Sync {
    /// Creates or replaces the record for `record.dataset_id`.
    fn upsert(&self, record: EmbeddingRecord) -> Result<UpsertOutcome>;

    /// Applies every upsert in one write.
    fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> Result<UpsertCounts>;

    /// Every stored vector pair in ascending `dataset_id` order.
    fn load_all(&self) -> Result<Vec<StoredVectors>>;

    fn get(&self, dataset_id: DatasetId) -> Result<Option<EmbeddingRecord>>;

    fn list(&self) -> Result<Vec<EmbeddingRecord>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EmbeddingTable {
    #[serde(default)]
    records: BTreeMap<DatasetId, EmbeddingRecord>,
}

impl EmbeddingTable {
    fn upsert(&mut self, mut record: EmbeddingRecord, now_ms: u64) -> UpsertOutcome {
        record.updated_at_ms = now_ms;
        match self.records.get(&record.dataset_id) {
            Some(existing) => {
                record.created_at_ms = existing.created_at_ms;
                self.records.insert(record.dataset_id, record);
                UpsertOutcome::Updated
            }
            None => {
                record.created_at_ms = now_ms;
                self.records.insert(record.dataset_id, record);
                UpsertOutcome::Created
            }
        }
    }

    fn upsert_many(&mut self, records: Vec<EmbeddingRecord>, now_ms: u64) -> UpsertCounts {
        let mut counts = UpsertCounts::default();
        for record in records {
            counts.add(self.upsert(record, now_ms));
        }
        counts
    }

    fn stored_vectors(&self) -> Vec<StoredVectors> {
        self.records.values().map(StoredVectors::from).collect()
    }
}

/// Process-local store for tests and doubles.
#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    table: RwLock<EmbeddingTable>,
}

impl InMemoryEmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<EmbeddingRecord>) -> Self {
        let store = Self::new();
        store
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_many(records, unix_now_ms());
        store
    }
}

impl EmbeddingRepository for InMemoryEmbeddingStore {
    fn upsert(&self, record: EmbeddingRecord) -> Result<UpsertOutcome> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        Ok(table.upsert(record, unix_now_ms()))
    }

    fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> Result<UpsertCounts> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        Ok(table.upsert_many(records, unix_now_ms()))
    }

    fn load_all(&self) -> Result<Vec<StoredVectors>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.stored_vectors())
    }

    fn get(&self, dataset_id: DatasetId) -> Result<Option<EmbeddingRecord>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.records.get(&dataset_id).cloned())
    }

    fn list(&self) -> Result<Vec<EmbeddingRecord>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.records.values().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.records.len())
    }
}

/// `embeddings.json` in the data directory.
pub struct JsonEmbeddingStore {
    file: JsonStateFile<EmbeddingTable>,
}

impl JsonEmbeddingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonStateFile::open(path, "embeddings")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl EmbeddingRepository for JsonEmbeddingStore {
    fn upsert(&self, record: EmbeddingRecord) -> Result<UpsertOutcome> {
        self.file
            .update(|table| Ok(table.upsert(record, unix_now_ms())))
    }

    fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> Result<UpsertCounts> {
        let counts = self
            .file
            .update(|table| Ok::<_, crate::error::VectorStoreError>(table.upsert_many(records, unix_now_ms())))?;
        log::debug!(
            "Upserted embeddings into {}: {} created, {} updated",
            self.path().display(),
            counts.created,
            counts.updated
        );
        Ok(counts)
    }

    fn load_all(&self) -> Result<Vec<StoredVectors>> {
        Ok(self.file.snapshot()?.stored_vectors())
    }

    fn get(&self, dataset_id: DatasetId) -> Result<Option<EmbeddingRecord>> {
        Ok(self.file.snapshot()?.records.get(&dataset_id).cloned())
    }

    fn list(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self.file.snapshot()?.records.values().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.file.snapshot()?.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(dataset_id: DatasetId, lexical: Vec<f32>, dense: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            dataset_id,
            lexical,
            dense,
            normalized_text: format!("dataset {dataset_id}"),
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    fn exercise_upsert_twice(store: &dyn EmbeddingRepository) {
        let first = store.upsert(record(5, vec![1.0, 0.0], vec![0.5])).unwrap();
        let second = store.upsert(record(5, vec![0.0, 1.0], vec![0.25])).unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.len().unwrap(), 1);

        let stored = store.get(5).unwrap().expect("record 5");
        assert_eq!(stored.lexical, vec![0.0, 1.0]);
        assert_eq!(stored.dense, vec![0.25]);
        assert!(stored.updated_at_ms >= stored.created_at_ms);
    }

    #[test]
    fn in_memory_upsert_replaces_existing_record() {
        exercise_upsert_twice(&InMemoryEmbeddingStore::new());
    }

    #[test]
    fn json_upsert_replaces_existing_record() {
        let tmp = TempDir::new().unwrap();
        let store = JsonEmbeddingStore::open(tmp.path().join("embeddings.json")).unwrap();
        exercise_upsert_twice(&store);
    }

    #[test]
    fn load_all_is_ordered_by_dataset_id() {
        let store = InMemoryEmbeddingStore::new();
        let counts = store
            .upsert_many(vec![
                record(9, vec![0.9], vec![0.9]),
                record(2, vec![0.2], vec![0.2]),
                record(4, vec![0.4], vec![0.4]),
                record(2, vec![0.3], vec![0.3]),
            ])
            .unwrap();
        assert_eq!(counts, UpsertCounts { created: 3, updated: 1 });

        let all = store.load_all().unwrap();
        let ids: Vec<_> = all.iter().map(|v| v.dataset_id).collect();
        assert_eq!(ids, vec![2, 4, 9]);
        assert_eq!(all[0].lexical, vec![0.3]);
        assert_eq!(all[2].dense, vec![0.9]);
    }

    #[test]
    fn json_store_is_visible_to_a_second_handle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("embeddings.json");
        let writer = JsonEmbeddingStore::open(&path).unwrap();
        let reader = JsonEmbeddingStore::open(&path).unwrap();
        assert!(reader.is_empty().unwrap());

        writer
            .upsert_many(vec![record(1, vec![1.0], vec![1.0])])
            .unwrap();
        assert_eq!(reader.len().unwrap(), 1);
        assert_eq!(reader.load_all().unwrap()[0].dataset_id, 1);
    }
}
