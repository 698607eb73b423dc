//! # Dataset Recommender Vector Store
//!
//! Both text representations used for dataset recommendations, and where they are kept.
//!
//! ```text
//! title + " " + description
//!     │
//!     ├──> TfidfVectorizer (lexical, vocabulary-sized)
//!     │
//!     ├──> EmbeddingModel (dense, ONNX sentence model or stub)
//!     │
//!     └──> EmbeddingRepository
//!            └─> JsonEmbeddingStore / InMemoryEmbeddingStore
//! ```

mod embeddings;
mod error;
mod lexical;
mod paths;
mod shared;
mod similarity;
mod store;
mod types;

pub use embeddings::{
    EmbeddingMode, EmbeddingModel, TextEmbedder, DEFAULT_MODEL_ID, EMBEDDING_DIM,
    EMBEDDING_MODEL_ENV, EMBEDDING_MODE_ENV, MAX_EMBED_TOKENS, MODEL_DIR_ENV,
};
pub use error::{Result, VectorStoreError};
pub use lexical::{TextVectorizer, TfidfVectorizer};
pub use paths::{
    data_dir_from_env, DataLayout, CATALOG_FILE_NAME, DATA_DIR_ENV, DEFAULT_DATA_DIR_NAME,
    EMBEDDINGS_FILE_NAME, QUERY_LOG_FILE_NAME, VECTORIZER_FILE_NAME,
};
pub use shared::{shared_embedder, shared_vectorizer};
pub use similarity::cosine_similarity;
pub use store::{EmbeddingRepository, InMemoryEmbeddingStore, JsonEmbeddingStore};
pub use types::{EmbeddingRecord, StoredVectors, UpsertCounts, UpsertOutcome, VectorKind};
