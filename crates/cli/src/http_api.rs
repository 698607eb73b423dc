//! Recommender HTTP API: the query endpoint, CRUD over the stores, body schemas and `/health`.

use crate::server_security::AuthToken;
use axum::{
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        HeaderMap, Response as HttpResponse, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use datarec_catalog::{CatalogError, CatalogReader, CatalogStore, DatasetId, NewDataset, QueryLog};
use datarec_indexer::normalized_text;
use datarec_protocol::{
    api_schemas, serialize_json, ErrorCode, ErrorEnvelope, ErrorResponse, HealthReport,
    QueryRequest, API_SCHEMA_VERSION,
};
use datarec_search::{Ranker, Recommender, SearchError, SimilarityScorer};
use datarec_vector_store::{
    EmbeddingRecord, EmbeddingRepository, TextEmbedder, TextVectorizer, UpsertOutcome,
    VectorStoreError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub(crate) struct AppState {
    recommender: Arc<Recommender>,
    catalog: Arc<CatalogStore>,
    embeddings: Arc<dyn EmbeddingRepository>,
    query_log: Arc<QueryLog>,
    log_queries: bool,
    auth_token: Option<AuthToken>,
    lexical_dim: usize,
    dense_dim: usize,
}

impl AppState {
    pub(crate) fn new(
        catalog: Arc<CatalogStore>,
        embeddings: Arc<dyn EmbeddingRepository>,
        vectorizer: Arc<dyn TextVectorizer>,
        embedder: Arc<dyn TextEmbedder>,
        query_log: Arc<QueryLog>,
    ) -> Self {
        let lexical_dim = vectorizer.dimension();
        let dense_dim = embedder.dimension();
        let scorer = SimilarityScorer::new(vectorizer, embedder, embeddings.clone());
        let ranker = Ranker::new(catalog.clone());
        Self {
            recommender: Arc::new(Recommender::new(scorer, ranker)),
            catalog,
            embeddings,
            query_log,
            log_queries: false,
            auth_token: None,
            lexical_dim,
            dense_dim,
        }
    }

    #[must_use]
    pub(crate) fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    #[must_use]
    pub(crate) fn with_auth_token(mut self, token: Option<AuthToken>) -> Self {
        self.auth_token = token;
        self
    }

    pub(crate) const fn auth_is_enabled(&self) -> bool {
        self.auth_token.is_some()
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/query/", post(query))
        .route("/api/datasets/", get(list_datasets).post(create_dataset))
        .route(
            "/api/embeddings/",
            get(list_embeddings).post(upsert_embedding),
        )
        .route("/api/queries/", get(list_queries).post(create_query))
        .route(
            "/api/query-results/",
            get(list_query_results).post(create_query_result),
        )
        .route("/api/schema/", get(api_schema))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Error body plus the status it is sent with.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    envelope: ErrorEnvelope,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        let envelope = ErrorEnvelope::new(code.clone(), message);
        let envelope = match default_hint(&code) {
            Some(hint) => envelope.with_hint(hint),
            None => envelope,
        };
        Self { status, envelope }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal,
            message,
        )
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.envelope = self.envelope.with_details(details);
        self
    }
}

fn default_hint(code: &ErrorCode) -> Option<&'static str> {
    match code {
        ErrorCode::Unauthorized => Some(
            "The server was started with an auth token; send Authorization: Bearer <token>.",
        ),
        ErrorCode::InvalidRequest => {
            Some("Verify the request is valid JSON with the documented fields.")
        }
        ErrorCode::DimensionMismatch => Some(
            "Stored vectors were computed with a different vectorizer or model; run `datarec embed --refit`.",
        ),
        ErrorCode::NotFitted => Some("Run `datarec fit-vectorizer` or `datarec embed` first."),
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_response(
            self.status,
            &ErrorResponse {
                error: self.envelope,
            },
        )
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let message = err.to_string();
        match err {
            SearchError::DimensionMismatch {
                dataset_id,
                kind,
                expected,
                actual,
            } => Self::new(StatusCode::CONFLICT, ErrorCode::DimensionMismatch, message)
                .with_details(json!({
                    "dataset_id": dataset_id,
                    "kind": kind,
                    "expected": expected,
                    "actual": actual,
                })),
            SearchError::VectorStoreError(err) => err.into(),
            SearchError::CatalogError(err) => err.into(),
        }
    }
}

impl From<VectorStoreError> for ApiError {
    fn from(err: VectorStoreError) -> Self {
        let message = err.to_string();
        match err {
            VectorStoreError::Catalog(err) => err.into(),
            VectorStoreError::EmbeddingError(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::EmbeddingFailed,
                message,
            ),
            VectorStoreError::NotFitted(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::NotFitted,
                message,
            ),
            _ => Self::internal(message),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let message = err.to_string();
        match err {
            CatalogError::DuplicateUrl { url, existing_id } => {
                Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, message)
                    .with_details(json!({ "url": url, "existing_id": existing_id }))
            }
            CatalogError::NotFound(_) => Self::not_found(message),
            CatalogError::InvalidRecord(_) => Self::bad_request(message),
            _ => Self::internal(message),
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let (status, bytes) = match serialize_json(body) {
        Ok(text) => (status, text.into_bytes()),
        Err(err) => {
            log::error!("Failed to serialize response: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":{"code":"internal","message":"response serialization failed"}}"#
                    .to_vec(),
            )
        }
    };

    let mut builder = HttpResponse::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json");
    if status == StatusCode::UNAUTHORIZED {
        builder = builder.header(WWW_AUTHENTICATE, "Bearer");
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid JSON request: {err}")))
}

/// Runs store and scoring work off the async workers.
async fn blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ApiError::internal(format!("Worker task failed: {err}")))?
}

fn is_authorized(headers: &HeaderMap, token: &AuthToken) -> bool {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    token.matches_http_authorization_header(value)
}

async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = &state.auth_token {
        if !is_authorized(request.headers(), token) {
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Missing or invalid Authorization header",
            )
            .into_response();
        }
    }
    next.run(request).await
}

async fn query(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let request: QueryRequest = parse_body(&body)?;
    let Some(text) = request.query_text().map(str::to_string) else {
        return Err(ApiError::bad_request("Query text is required"));
    };
    let limit = request.limit;

    let results = blocking(move || {
        let results = state.recommender.recommend(&text, limit)?;
        if state.log_queries {
            let ids: Vec<DatasetId> = results.iter().map(|r| r.id).collect();
            if let Err(err) = state.query_log.record(&text, &ids) {
                log::warn!("Failed to record query '{text}': {err}");
            }
        }
        Ok(results)
    })
    .await?;
    Ok(json_response(StatusCode::OK, &results))
}

async fn list_datasets(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = blocking(move || Ok(state.catalog.list()?)).await?;
    Ok(json_response(StatusCode::OK, &records))
}

async fn create_dataset(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let new: NewDataset = parse_body(&body)?;
    let record = blocking(move || Ok(state.catalog.create(new)?)).await?;
    Ok(json_response(StatusCode::CREATED, &record))
}

async fn list_embeddings(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = blocking(move || Ok(state.embeddings.list()?)).await?;
    Ok(json_response(StatusCode::OK, &records))
}

#[derive(Debug, Deserialize)]
struct EmbeddingUpsert {
    dataset_id: DatasetId,
    lexical: Vec<f32>,
    dense: Vec<f32>,
    #[serde(default)]
    normalized_text: Option<String>,
}

async fn upsert_embedding(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let upsert: EmbeddingUpsert = parse_body(&body)?;
    for (kind, expected, actual) in [
        ("lexical", state.lexical_dim, upsert.lexical.len()),
        ("dense", state.dense_dim, upsert.dense.len()),
    ] {
        if expected != actual {
            return Err(ApiError::bad_request(format!(
                "{kind} vector has {actual} dims, expected {expected}"
            ))
            .with_details(json!({ "kind": kind, "expected": expected, "actual": actual })));
        }
    }

    let (outcome, stored) = blocking(move || {
        let Some(dataset) = state.catalog.get(upsert.dataset_id)? else {
            return Err(ApiError::not_found(format!(
                "Dataset {} not found",
                upsert.dataset_id
            )));
        };
        let record = EmbeddingRecord {
            dataset_id: dataset.id,
            lexical: upsert.lexical,
            dense: upsert.dense,
            normalized_text: upsert
                .normalized_text
                .unwrap_or_else(|| normalized_text(&dataset)),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        let outcome = state.embeddings.upsert(record)?;
        let stored = state.embeddings.get(dataset.id)?;
        Ok((outcome, stored))
    })
    .await?;

    let status = match outcome {
        UpsertOutcome::Created => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok(json_response(status, &stored))
}

async fn list_queries(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = blocking(move || Ok(state.query_log.queries()?)).await?;
    Ok(json_response(StatusCode::OK, &records))
}

#[derive(Debug, Deserialize)]
struct NewQuery {
    #[serde(default)]
    query_text: Option<String>,
}

async fn create_query(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let new: NewQuery = parse_body(&body)?;
    let Some(text) = new
        .query_text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
    else {
        return Err(ApiError::bad_request("query_text is required"));
    };
    let record = blocking(move || Ok(state.query_log.insert_query(&text)?)).await?;
    Ok(json_response(StatusCode::CREATED, &record))
}

#[derive(Debug, Default, Deserialize)]
struct QueryResultFilter {
    #[serde(default)]
    query_id: Option<u64>,
}

async fn list_query_results(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<QueryResultFilter>,
) -> Result<Response, ApiError> {
    let records = blocking(move || {
        Ok(match filter.query_id {
            Some(query_id) => state.query_log.results_for(query_id)?,
            None => state.query_log.results()?,
        })
    })
    .await?;
    Ok(json_response(StatusCode::OK, &records))
}

#[derive(Debug, Deserialize)]
struct NewQueryResult {
    query_id: u64,
    dataset_id: DatasetId,
}

async fn create_query_result(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let new: NewQueryResult = parse_body(&body)?;
    let record = blocking(move || {
        if state.catalog.get(new.dataset_id)?.is_none() {
            return Err(ApiError::not_found(format!(
                "Dataset {} not found",
                new.dataset_id
            )));
        }
        Ok(state.query_log.insert_result(new.query_id, new.dataset_id)?)
    })
    .await?;
    Ok(json_response(StatusCode::CREATED, &record))
}

async fn api_schema() -> Response {
    json_response(StatusCode::OK, &api_schemas())
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let counts_state = state.clone();
    let (datasets, embeddings) = blocking(move || {
        Ok((
            counts_state.catalog.len()?,
            counts_state.embeddings.len()?,
        ))
    })
    .await?;
    let report = HealthReport {
        status: "ok".to_string(),
        schema_version: API_SCHEMA_VERSION,
        datasets,
        embeddings,
        lexical_dim: state.lexical_dim,
        dense_dim: state.dense_dim,
    };
    Ok(json_response(StatusCode::OK, &report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use datarec_vector_store::{
        DataLayout, EmbeddingModel, InMemoryEmbeddingStore, TfidfVectorizer,
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const RETAIL_TEXT: &str = "Retail sales Monthly retail sales by store";

    struct Fixture {
        _tmp: TempDir,
        store: Arc<InMemoryEmbeddingStore>,
        state: Arc<AppState>,
    }

    fn dataset(title: &str, description: &str, url: &str) -> NewDataset {
        NewDataset {
            title: title.to_string(),
            description: description.to_string(),
            source: "Kaggle".to_string(),
            url: url.to_string(),
            size: "1 MB".to_string(),
            format: "csv".to_string(),
        }
    }

    fn fixture(auth_token: Option<&str>, log_queries: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        let catalog = Arc::new(CatalogStore::open(layout.catalog()).unwrap());
        catalog
            .insert_many(vec![
                dataset(
                    "Retail sales",
                    "Monthly retail sales by store",
                    "https://example.org/retail",
                ),
                dataset(
                    "Weather",
                    "Hourly station readings",
                    "https://example.org/weather",
                ),
            ])
            .unwrap();

        let datasets = catalog.list().unwrap();
        let texts: Vec<String> = datasets.iter().map(normalized_text).collect();
        let vectorizer = Arc::new(TfidfVectorizer::fitted(&texts).unwrap());
        let embedder = Arc::new(EmbeddingModel::stub(8));
        let store = Arc::new(InMemoryEmbeddingStore::new());
        for (record, text) in datasets.iter().zip(&texts) {
            store
                .upsert(EmbeddingRecord {
                    dataset_id: record.id,
                    lexical: vectorizer.transform(text).unwrap(),
                    dense: embedder.embed(text).unwrap(),
                    normalized_text: text.clone(),
                    created_at_ms: 0,
                    updated_at_ms: 0,
                })
                .unwrap();
        }

        let query_log = Arc::new(QueryLog::open(layout.query_log()).unwrap());
        let token = AuthToken::parse(auth_token).unwrap();
        let state = AppState::new(catalog, store.clone(), vectorizer, embedder, query_log)
            .with_query_logging(log_queries)
            .with_auth_token(token);
        Fixture {
            _tmp: tmp,
            store,
            state: Arc::new(state),
        }
    }

    async fn send(
        fixture: &Fixture,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut request = HttpRequest::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router(fixture.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn query_returns_ranked_results_with_limit() {
        let fixture = fixture(None, false);
        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/query/",
            Some(json!({ "query": RETAIL_TEXT })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["title"], "Retail sales");
        assert_eq!(results[0]["url"], "https://example.org/retail");
        let top = results[0]["similarity_score"].as_f64().unwrap();
        assert!((top - 1.0).abs() < 1e-4);
        assert!(results[1]["similarity_score"].as_f64().unwrap() <= top);

        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/query/",
            Some(json!({ "query": RETAIL_TEXT, "limit": 1 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_or_malformed_query_is_rejected_before_scoring() {
        let fixture = fixture(None, false);
        for body in [json!({ "query": "   " }), json!({})] {
            let (status, _, body) =
                send(&fixture, "POST", "/api/query/", Some(body), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["code"], "invalid_request");
        }

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/query/")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router(fixture.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_conflict_with_details() {
        let fixture = fixture(None, false);
        fixture
            .store
            .upsert(EmbeddingRecord {
                dataset_id: 2,
                lexical: vec![1.0],
                dense: vec![0.0; 8],
                normalized_text: String::new(),
                created_at_ms: 0,
                updated_at_ms: 0,
            })
            .unwrap();

        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/query/",
            Some(json!({ "query": "retail" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "dimension_mismatch");
        assert_eq!(body["error"]["details"]["dataset_id"], 2);
        assert_eq!(body["error"]["details"]["kind"], "lexical");
        assert_eq!(body["error"]["details"]["actual"], 1);
    }

    #[tokio::test]
    async fn auth_token_guards_every_route() {
        let fixture = fixture(Some("secret"), false);
        let (status, headers, body) = send(&fixture, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers.get(WWW_AUTHENTICATE).unwrap(), "Bearer");
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _, _) = send(&fixture, "GET", "/api/datasets/", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = send(&fixture, "GET", "/health", None, Some("secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn health_reports_counts_and_dimensions() {
        let fixture = fixture(None, false);
        let (status, _, body) = send(&fixture, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["datasets"], 2);
        assert_eq!(body["embeddings"], 2);
        assert_eq!(body["dense_dim"], 8);
        assert_eq!(body["schema_version"], API_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn schema_route_serves_query_body_schemas() {
        let fixture = fixture(None, false);
        let (status, _, body) = send(&fixture, "GET", "/api/schema/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schema_version"], API_SCHEMA_VERSION);
        assert!(body["query_request"]["properties"].get("query").is_some());
        assert_eq!(body["query_response"]["type"], "array");
    }

    #[tokio::test]
    async fn dataset_create_rejects_duplicates_and_incomplete_records() {
        let fixture = fixture(None, false);
        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/datasets/",
            Some(json!({ "title": "Flights", "url": "https://example.org/flights" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 3);

        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/datasets/",
            Some(json!({ "title": "Again", "url": "https://example.org/retail" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["details"]["existing_id"], 1);

        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/datasets/",
            Some(json!({ "description": "no url" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, body) = send(&fixture, "GET", "/api/datasets/", None, None).await;
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn embedding_upsert_requires_known_dataset_and_matching_dims() {
        let fixture = fixture(None, false);
        let lexical_dim = fixture.state.lexical_dim;
        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/embeddings/",
            Some(json!({
                "dataset_id": 42,
                "lexical": vec![0.0; lexical_dim],
                "dense": vec![0.0; 8],
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/embeddings/",
            Some(json!({ "dataset_id": 1, "lexical": [1.0], "dense": vec![0.0; 8] })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = send(
            &fixture,
            "POST",
            "/api/embeddings/",
            Some(json!({
                "dataset_id": 1,
                "lexical": vec![0.0; lexical_dim],
                "dense": vec![0.0; 8],
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dataset_id"], 1);
        assert_eq!(body["normalized_text"], RETAIL_TEXT);
    }

    #[tokio::test]
    async fn logged_queries_are_listed_with_their_results() {
        let fixture = fixture(None, true);
        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/query/",
            Some(json!({ "query": "weather" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, queries) = send(&fixture, "GET", "/api/queries/", None, None).await;
        assert_eq!(queries.as_array().unwrap().len(), 1);
        assert_eq!(queries[0]["query_text"], "weather");

        let (_, _, results) =
            send(&fixture, "GET", "/api/query-results/?query_id=1", None, None).await;
        assert_eq!(results.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn query_result_links_require_existing_query_and_dataset() {
        let fixture = fixture(None, false);
        let (status, _, query) = send(
            &fixture,
            "POST",
            "/api/queries/",
            Some(json!({ "query_text": "  rainfall  " })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(query["query_text"], "rainfall");

        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/query-results/",
            Some(json!({ "query_id": 99, "dataset_id": 1 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &fixture,
            "POST",
            "/api/query-results/",
            Some(json!({ "query_id": 1, "dataset_id": 99 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, link) = send(
            &fixture,
            "POST",
            "/api/query-results/",
            Some(json!({ "query_id": 1, "dataset_id": 2 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(link["dataset_id"], 2);
    }
}
