use crate::error::{CatalogError, Result};
use crate::persist::{unix_now_ms, JsonStateFile};
use crate::record::{DatasetId, DatasetRecord, NewDataset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Read side of the catalog as seen by the ranker.
pub trait CatalogReader: Send + Sync {
    fn get(&self, id: DatasetId) -> Result<Option<DatasetRecord>>;

    /// Resolves many ids at once; ids with no record are absent from the map.
    fn get_many(&self, ids: &[DatasetId]) -> Result<HashMap<DatasetId, DatasetRecord>> {
        let mut found = HashMap::with_capacity(ids.len());
        for &id in ids {
            if let Some(record) = self.get(id)? {
                found.insert(id, record);
            }
        }
        Ok(found)
    }
}

impl CatalogReader for BTreeMap<DatasetId, DatasetRecord> {
    fn get(&self, id: DatasetId) -> Result<Option<DatasetRecord>> {
        Ok(BTreeMap::get(self, &id).cloned())
    }
}

impl CatalogReader for HashMap<DatasetId, DatasetRecord> {
    fn get(&self, id: DatasetId) -> Result<Option<DatasetRecord>> {
        Ok(HashMap::get(self, &id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(DatasetRecord),
    Duplicate { existing_id: DatasetId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub created: Vec<DatasetId>,
    pub duplicates: usize,
    pub invalid: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    #[serde(default)]
    last_id: DatasetId,
    #[serde(default)]
    datasets: BTreeMap<DatasetId, DatasetRecord>,
}

impl CatalogState {
    /// Url to id lookup over every cataloged dataset; built once per write.
    fn url_index(&self) -> HashMap<String, DatasetId> {
        self.datasets
            .values()
            .map(|record| (record.url.clone(), record.id))
            .collect()
    }

    fn insert(
        &mut self,
        new: NewDataset,
        now_ms: u64,
        urls: &mut HashMap<String, DatasetId>,
    ) -> InsertOutcome {
        if let Some(&existing_id) = urls.get(&new.url) {
            return InsertOutcome::Duplicate { existing_id };
        }
        self.last_id += 1;
        let record = new.into_record(self.last_id, now_ms);
        urls.insert(record.url.clone(), record.id);
        self.datasets.insert(record.id, record.clone());
        InsertOutcome::Created(record)
    }
}

/// File-backed dataset catalog (`catalog.json`).
pub struct CatalogStore {
    file: JsonStateFile<CatalogState>,
}

impl CatalogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonStateFile::open(path, "catalog")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Inserts a dataset unless its url is already cataloged.
    pub fn insert(&self, new: NewDataset) -> Result<InsertOutcome> {
        let new = new.normalized()?;
        let outcome = self.file.update(|state| {
            let mut urls = state.url_index();
            Ok::<_, CatalogError>(state.insert(new, unix_now_ms(), &mut urls))
        })?;
        match &outcome {
            InsertOutcome::Created(record) => {
                log::debug!("Cataloged dataset {} ({})", record.id, record.url);
            }
            InsertOutcome::Duplicate { existing_id } => {
                log::debug!("Skipped duplicate of dataset {existing_id}");
            }
        }
        Ok(outcome)
    }

    /// Like [`insert`](Self::insert) but a duplicate url is an error.
    pub fn create(&self, new: NewDataset) -> Result<DatasetRecord> {
        let url = new.url.trim().to_string();
        match self.insert(new)? {
            InsertOutcome::Created(record) => Ok(record),
            InsertOutcome::Duplicate { existing_id } => {
                Err(CatalogError::DuplicateUrl { url, existing_id })
            }
        }
    }

    /// Inserts a batch in a single write. Invalid entries are counted and skipped.
    pub fn insert_many(&self, batch: Vec<NewDataset>) -> Result<IngestSummary> {
        let mut valid = Vec::with_capacity(batch.len());
        let mut summary = IngestSummary::default();
        for new in batch {
            match new.normalized() {
                Ok(new) => valid.push(new),
                Err(err) => {
                    log::warn!("Skipping dataset: {err}");
                    summary.invalid += 1;
                }
            }
        }

        self.file.update(|state| {
            let now_ms = unix_now_ms();
            let mut urls = state.url_index();
            for new in valid {
                match state.insert(new, now_ms, &mut urls) {
                    InsertOutcome::Created(record) => summary.created.push(record.id),
                    InsertOutcome::Duplicate { .. } => summary.duplicates += 1,
                }
            }
            Ok::<_, CatalogError>(())
        })?;

        log::info!(
            "Catalog ingest: {} created, {} duplicates, {} invalid",
            summary.created.len(),
            summary.duplicates,
            summary.invalid
        );
        Ok(summary)
    }

    /// Replaces title and/or description; other fields stay untouched.
    pub fn update_text(
        &self,
        id: DatasetId,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<DatasetRecord> {
        self.file.update(|state| {
            let record = state
                .datasets
                .get_mut(&id)
                .ok_or_else(|| CatalogError::NotFound(format!("dataset {id}")))?;
            if let Some(title) = title {
                record.title = title;
            }
            if let Some(description) = description {
                record.description = description;
            }
            record.updated_at_ms = unix_now_ms();
            Ok(record.clone())
        })
    }

    pub fn list(&self) -> Result<Vec<DatasetRecord>> {
        Ok(self.file.snapshot()?.datasets.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.file.snapshot()?.datasets.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CatalogReader for CatalogStore {
    fn get(&self, id: DatasetId) -> Result<Option<DatasetRecord>> {
        Ok(self.file.snapshot()?.datasets.get(&id).cloned())
    }

    fn get_many(&self, ids: &[DatasetId]) -> Result<HashMap<DatasetId, DatasetRecord>> {
        let state = self.file.snapshot()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.datasets.get(id).map(|r| (*id, r.clone())))
            .collect())
    }
}
