//! Dataset catalog and query audit log.
//!
//! Both stores are JSON files under the data directory, shared with the embedding store
//! through the [`persist`] helpers.

pub mod error;
pub mod persist;
pub mod query_log;
pub mod record;
pub mod store;

pub use error::{CatalogError, Result};
pub use persist::{
    read_json_versioned, unix_now_ms, write_json_atomic, FileLock, JsonStateFile,
    STATE_SCHEMA_VERSION,
};
pub use query_log::{QueryLog, QueryRecord, QueryResultRecord};
pub use record::{DatasetId, DatasetRecord, NewDataset};
pub use store::{CatalogReader, CatalogStore, IngestSummary, InsertOutcome};
