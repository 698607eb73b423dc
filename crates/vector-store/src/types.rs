use datarec_catalog::DatasetId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Both vector representations of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub dataset_id: DatasetId,
    pub lexical: Vec<f32>,
    pub dense: Vec<f32>,
    pub normalized_text: String,
    #[serde(default)]
    pub created_at_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
}

/// The scoring view of an [`EmbeddingRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVectors {
    pub dataset_id: DatasetId,
    pub lexical: Vec<f32>,
    pub dense: Vec<f32>,
}

impl From<&EmbeddingRecord> for StoredVectors {
    fn from(record: &EmbeddingRecord) -> Self {
        Self {
            dataset_id: record.dataset_id,
            lexical: record.lexical.clone(),
            dense: record.dense.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub created: usize,
    pub updated: usize,
}

impl UpsertCounts {
    pub fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Lexical,
    Dense,
}

impl VectorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Dense => "dense",
        }
    }
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
