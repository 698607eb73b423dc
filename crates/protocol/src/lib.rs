use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_SCHEMA_VERSION: u32 = 1;

/// Body of `POST /api/query/`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    /// Truncate the ranked list; all datasets are returned when absent.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryRequest {
    /// Returns the trimmed query text, or `None` when it is missing or blank.
    #[must_use]
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// One ranked recommendation as returned by the query API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct DatasetResult {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub size: String,
    pub format: String,
    pub similarity_score: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    NotFound,
    Conflict,
    NotFitted,
    EmbeddingFailed,
    DimensionMismatch,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::NotFitted => "not_fitted",
            Self::EmbeddingFailed => "embedding_failed",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Top-level error body: `{"error": {...}}`.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorResponse {
    pub error: ErrorEnvelope,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct HealthReport {
    pub status: String,
    pub schema_version: u32,
    pub datasets: usize,
    pub embeddings: usize,
    pub lexical_dim: usize,
    pub dense_dim: usize,
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// JSON Schemas of the query API bodies, served at `GET /api/schema/`.
#[must_use]
pub fn api_schemas() -> serde_json::Value {
    serde_json::json!({
        "schema_version": API_SCHEMA_VERSION,
        "query_request": schemars::schema_for!(QueryRequest),
        "query_response": schemars::schema_for!(Vec<DatasetResult>),
        "error_response": schemars::schema_for!(ErrorResponse),
        "health": schemars::schema_for!(HealthReport),
    })
}
