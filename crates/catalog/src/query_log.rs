use crate::error::{CatalogError, Result};
use crate::persist::{unix_now_ms, JsonStateFile};
use crate::record::DatasetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: u64,
    pub query_text: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResultRecord {
    pub id: u64,
    pub query_id: u64,
    pub dataset_id: DatasetId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueryLogState {
    #[serde(default)]
    last_query_id: u64,
    #[serde(default)]
    last_result_id: u64,
    #[serde(default)]
    queries: BTreeMap<u64, QueryRecord>,
    #[serde(default)]
    results: Vec<QueryResultRecord>,
}

impl QueryLogState {
    fn push_query(&mut self, text: &str) -> QueryRecord {
        self.last_query_id += 1;
        let now_ms = unix_now_ms();
        let record = QueryRecord {
            id: self.last_query_id,
            query_text: text.to_string(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        self.queries.insert(record.id, record.clone());
        record
    }

    fn push_result(&mut self, query_id: u64, dataset_id: DatasetId) -> QueryResultRecord {
        self.last_result_id += 1;
        let record = QueryResultRecord {
            id: self.last_result_id,
            query_id,
            dataset_id,
        };
        self.results.push(record.clone());
        record
    }
}

/// Audit trail of submitted queries and the datasets returned for them (`queries.json`).
pub struct QueryLog {
    file: JsonStateFile<QueryLogState>,
}

impl QueryLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonStateFile::open(path, "query log")?,
        })
    }

    /// Stores a query together with every dataset returned for it, in one write.
    pub fn record(&self, query_text: &str, dataset_ids: &[DatasetId]) -> Result<QueryRecord> {
        self.file.update(|state| {
            let query = state.push_query(query_text);
            for &dataset_id in dataset_ids {
                state.push_result(query.id, dataset_id);
            }
            Ok::<_, CatalogError>(query)
        })
    }

    pub fn insert_query(&self, query_text: &str) -> Result<QueryRecord> {
        self.file
            .update(|state| Ok::<_, CatalogError>(state.push_query(query_text)))
    }

    /// Links a dataset to an existing query. Dataset existence is the caller's check.
    pub fn insert_result(&self, query_id: u64, dataset_id: DatasetId) -> Result<QueryResultRecord> {
        self.file.update(|state| {
            if !state.queries.contains_key(&query_id) {
                return Err(CatalogError::NotFound(format!("query {query_id}")));
            }
            Ok(state.push_result(query_id, dataset_id))
        })
    }

    pub fn queries(&self) -> Result<Vec<QueryRecord>> {
        Ok(self.file.snapshot()?.queries.values().cloned().collect())
    }

    pub fn results(&self) -> Result<Vec<QueryResultRecord>> {
        Ok(self.file.snapshot()?.results.clone())
    }

    pub fn results_for(&self, query_id: u64) -> Result<Vec<QueryResultRecord>> {
        Ok(self
            .file
            .snapshot()?
            .results
            .iter()
            .filter(|r| r.query_id == query_id)
            .cloned()
            .collect())
    }
}
