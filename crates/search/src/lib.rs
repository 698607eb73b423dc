//! # Dataset Recommender Search
//!
//! Blended similarity scoring over the stored vectors and resolution of the ranked ids to
//! catalog metadata.
//!
//! ```text
//! query ──> TextVectorizer::transform ─┐
//!       └─> TextEmbedder::embed ───────┼─> cosine vs every stored record
//!                                      │     blended = 0.3 * lexical + 0.7 * dense
//!                                      └─> sort ──> Ranker::resolve ──> DatasetResult[]
//! ```

pub mod error;
pub mod fusion;
pub mod ranker;
pub mod scorer;

#[cfg(test)]
mod test_log;

pub use error::{Result, SearchError};
pub use fusion::BlendWeights;
pub use ranker::{Ranker, Recommender};
pub use scorer::{sort_by_score, validate_dimensions, ScoredDataset, SimilarityScorer};
