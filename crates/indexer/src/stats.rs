use datarec_catalog::DatasetId;
use serde::Serialize;

/// Outcome of one embedding job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbedStats {
    pub datasets: usize,
    pub created: usize,
    pub updated: usize,
    /// Whether the vectorizer was (re)fitted during this run.
    pub refitted: bool,
    pub lexical_dim: usize,
    pub dense_dim: usize,
    pub batches: usize,
    pub time_ms: u64,
    pub lock_wait_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FitStats {
    pub documents: usize,
    pub vocabulary: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Title,
    Description,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillChange {
    pub dataset_id: DatasetId,
    pub field: MetadataField,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub scanned: usize,
    pub incomplete: usize,
    pub updated: usize,
    pub unresolved: usize,
    pub dry_run: bool,
    pub changes: Vec<BackfillChange>,
}
