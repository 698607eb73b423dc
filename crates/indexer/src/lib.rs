//! # Dataset Recommender Indexer
//!
//! Offline batch jobs over one data directory.
//!
//! ```text
//! catalog.json
//!     │
//!     ├──> normalized text (title + " " + description)
//!     │
//!     ├──> TfidfVectorizer (fit once or --refit) ──> tfidf_vectorizer.json
//!     │
//!     ├──> TextEmbedder (batched)
//!     │
//!     └──> EmbeddingRepository::upsert_many ──> embeddings.json
//! ```
//!
//! Jobs over the same data directory are serialized with an exclusive `jobs.lock`.

mod backfill;
mod error;
mod index_lock;
mod job;
mod stats;

pub use backfill::{run_backfill, BackfillOptions, HeuristicGenerator, MetadataGenerator};
pub use error::{IndexerError, Result};
pub use index_lock::JOB_LOCK_FILE_NAME;
pub use job::{fit_vectorizer, normalized_text, EmbedOptions, EmbeddingJob, DEFAULT_EMBED_BATCH};
pub use stats::{BackfillChange, BackfillStats, EmbedStats, FitStats, MetadataField};
