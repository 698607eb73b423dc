use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::{export_layered, path_string, FileConfig, ServerSection, DEFAULT_BIND};
use datarec_catalog::{CatalogStore, IngestSummary, QueryLog};
use datarec_indexer::{
    fit_vectorizer, run_backfill, BackfillOptions, EmbedOptions, EmbeddingJob, HeuristicGenerator,
    DEFAULT_EMBED_BATCH,
};
use datarec_protocol::serialize_json;
use datarec_search::{Ranker, Recommender, SimilarityScorer};
use datarec_vector_store::{
    shared_embedder, shared_vectorizer, DataLayout, EmbeddingRepository, JsonEmbeddingStore,
    TextEmbedder, TextVectorizer, DATA_DIR_ENV, EMBEDDING_MODEL_ENV, EMBEDDING_MODE_ENV,
    MODEL_DIR_ENV,
};
use http_api::AppState;
use kaggle::{KaggleClient, KaggleCredentials, KAGGLE_API_BASE};
use serde::Serialize;
use server_security::AuthToken;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod http_api;
mod ingest;
mod kaggle;
mod server_security;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

/// Prints `value` as JSON, or the human summary.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        print_stdout(&serialize_json(value)?)
    } else {
        print_stdout(&human())
    }
}

#[derive(Parser)]
#[command(name = "datarec")]
#[command(about = "Dataset recommendations from blended lexical and semantic similarity", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides DATAREC_DATA_DIR; default: .datarec)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: ./datarec.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Embedding model id (only all-minilm-l6-v2 is available)
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Directory holding model.onnx and tokenizer.json (overrides DATAREC_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import datasets from a JSON array file (existing URLs are skipped)
    Ingest(IngestArgs),

    /// Harvest dataset metadata from the Kaggle API into the catalog
    #[command(name = "fetch-kaggle")]
    FetchKaggle(FetchKaggleArgs),

    /// Fit the TF-IDF vectorizer over the whole catalog
    #[command(name = "fit-vectorizer")]
    FitVectorizer(OutputArgs),

    /// Compute lexical and dense vectors for every cataloged dataset
    Embed(EmbedArgs),

    /// Fill blank dataset titles and descriptions
    #[command(name = "backfill-metadata")]
    BackfillMetadata(BackfillArgs),

    /// Rank datasets for a query (JSON to stdout)
    Query(QueryArgs),

    /// Serve the recommender HTTP API
    Serve(ServeArgs),
}

#[derive(Args)]
struct OutputArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct IngestArgs {
    /// JSON file with an array of {title, description, source, url, size, format}
    #[arg(long)]
    file: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct FetchKaggleArgs {
    /// Search terms, each paged separately
    #[arg(long = "search", required = true, num_args = 1..)]
    search: Vec<String>,

    /// Stop after this many pages per search term
    #[arg(long)]
    max_pages: Option<usize>,

    /// Kaggle API base URL
    #[arg(long, default_value = KAGGLE_API_BASE, hide = true)]
    api_base: String,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct EmbedArgs {
    /// Refit the vectorizer even when fitted state exists
    #[arg(long)]
    refit: bool,

    /// Texts per embedding batch
    #[arg(long, default_value_t = DEFAULT_EMBED_BATCH)]
    batch_size: usize,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BackfillArgs {
    /// Report the changes without writing them
    #[arg(long)]
    dry_run: bool,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Query text
    query: String,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    limit: Option<usize>,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address (default: 127.0.0.1:8000)
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses (requires --auth-token)
    #[arg(long)]
    public: bool,

    /// Require Authorization: Bearer <token> on all requests (env: DATAREC_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,

    /// Record every successful query and its results
    #[arg(long)]
    log_queries: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EmbedMode {
    Fast,
    Stub,
}

impl EmbedMode {
    const fn as_str(self) -> &'static str {
        match self {
            EmbedMode::Fast => "fast",
            EmbedMode::Stub => "stub",
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ort is noisy below verbose
    if !verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON for these, keep logs quiet
    let json_output = match &cli.command {
        Commands::Ingest(args) => args.json,
        Commands::FetchKaggle(args) => args.json,
        Commands::FitVectorizer(args) => args.json,
        Commands::Embed(args) => args.json,
        Commands::BackfillMetadata(args) => args.json,
        Commands::Query(_) => true,
        Commands::Serve(_) => false,
    };
    init_logging(cli.verbose, cli.quiet || json_output);

    let file_config = FileConfig::load(cli.config.as_deref())?;
    export_layered(
        DATA_DIR_ENV,
        path_string(cli.data_dir.as_ref()),
        path_string(file_config.data_dir.as_ref()),
    );
    export_layered(
        EMBEDDING_MODE_ENV,
        cli.embed_mode.map(|mode| mode.as_str().to_string()),
        file_config.embedding.mode.clone(),
    );
    export_layered(
        EMBEDDING_MODEL_ENV,
        cli.embed_model.clone(),
        file_config.embedding.model.clone(),
    );
    export_layered(
        MODEL_DIR_ENV,
        path_string(cli.model_dir.as_ref()),
        path_string(file_config.embedding.model_dir.as_ref()),
    );

    let layout = DataLayout::from_env();
    log::debug!("Data directory: {}", layout.root().display());

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, &layout)?,
        Commands::FetchKaggle(args) => run_fetch_kaggle(args, &layout).await?,
        Commands::FitVectorizer(args) => run_fit_vectorizer(args, &layout)?,
        Commands::Embed(args) => run_embed(args, &layout)?,
        Commands::BackfillMetadata(args) => run_backfill_metadata(args, &layout)?,
        Commands::Query(args) => run_query(args, &layout)?,
        Commands::Serve(args) => serve_http(args, &file_config.server, &layout).await?,
    }

    Ok(())
}

fn open_catalog(layout: &DataLayout) -> Result<Arc<CatalogStore>> {
    std::fs::create_dir_all(layout.root()).with_context(|| {
        format!("Failed to create data directory {}", layout.root().display())
    })?;
    let catalog = CatalogStore::open(layout.catalog())
        .with_context(|| format!("Failed to open catalog {}", layout.catalog().display()))?;
    Ok(Arc::new(catalog))
}

/// Everything scoring needs, loaded once per process.
struct LoadedModels {
    catalog: Arc<CatalogStore>,
    embeddings: Arc<dyn EmbeddingRepository>,
    vectorizer: Arc<dyn TextVectorizer>,
    embedder: Arc<dyn TextEmbedder>,
}

impl LoadedModels {
    fn load(layout: &DataLayout) -> Result<Self> {
        let catalog = open_catalog(layout)?;
        let vectorizer: Arc<dyn TextVectorizer> = shared_vectorizer(&layout.vectorizer())
            .context(
                "No fitted vectorizer; run `datarec fit-vectorizer` or `datarec embed` first",
            )?;
        let embedder: Arc<dyn TextEmbedder> =
            shared_embedder().context("Failed to load the embedding model")?;
        let embeddings = JsonEmbeddingStore::open(layout.embeddings()).with_context(|| {
            format!(
                "Failed to open embedding store {}",
                layout.embeddings().display()
            )
        })?;
        log::info!(
            "Loaded vectorizer ({} terms) and embedder ({} dims)",
            vectorizer.dimension(),
            embedder.dimension()
        );
        Ok(Self {
            catalog,
            embeddings: Arc::new(embeddings),
            vectorizer,
            embedder,
        })
    }
}

fn run_ingest(args: IngestArgs, layout: &DataLayout) -> Result<()> {
    let datasets = ingest::read_datasets(&args.file)?;
    let catalog = open_catalog(layout)?;
    let summary = catalog
        .insert_many(datasets)
        .context("Failed to update the catalog")?;
    emit(args.json, &summary, || {
        format!(
            "Ingested {} datasets into {} ({} duplicates skipped, {} invalid)",
            summary.created.len(),
            catalog.path().display(),
            summary.duplicates,
            summary.invalid
        )
    })
}

#[derive(Serialize)]
struct FetchReport {
    fetched: usize,
    #[serde(flatten)]
    ingest: IngestSummary,
}

async fn run_fetch_kaggle(args: FetchKaggleArgs, layout: &DataLayout) -> Result<()> {
    let credentials = KaggleCredentials::resolve()?;
    let client = KaggleClient::new(credentials, args.api_base.as_str())?;
    let datasets = client.fetch(&args.search, args.max_pages).await;
    let fetched = datasets.len();

    let catalog = open_catalog(layout)?;
    let ingest = catalog
        .insert_many(datasets)
        .context("Failed to update the catalog")?;
    let report = FetchReport { fetched, ingest };
    emit(args.json, &report, || {
        format!(
            "Fetched {} Kaggle datasets: {} new, {} already cataloged",
            report.fetched,
            report.ingest.created.len(),
            report.ingest.duplicates
        )
    })
}

fn run_fit_vectorizer(args: OutputArgs, layout: &DataLayout) -> Result<()> {
    let catalog = open_catalog(layout)?;
    let stats = fit_vectorizer(&catalog, layout).context("Failed to fit the vectorizer")?;
    emit(args.json, &stats, || {
        format!(
            "Fitted vectorizer on {} datasets ({} terms) -> {}",
            stats.documents,
            stats.vocabulary,
            layout.vectorizer().display()
        )
    })
}

fn run_embed(args: EmbedArgs, layout: &DataLayout) -> Result<()> {
    let catalog = open_catalog(layout)?;
    let store = JsonEmbeddingStore::open(layout.embeddings())?;
    let embedder: Arc<dyn TextEmbedder> =
        shared_embedder().context("Failed to load the embedding model")?;
    let job = EmbeddingJob::new(catalog, Arc::new(store), embedder, layout.clone());
    let stats = job
        .run(EmbedOptions {
            refit: args.refit,
            batch_size: args.batch_size,
        })
        .context("Embedding job failed")?;
    emit(args.json, &stats, || {
        format!(
            "Embedded {} datasets: {} created, {} updated (lexical dim {}, dense dim {}, {} ms)",
            stats.datasets,
            stats.created,
            stats.updated,
            stats.lexical_dim,
            stats.dense_dim,
            stats.time_ms
        )
    })
}

fn run_backfill_metadata(args: BackfillArgs, layout: &DataLayout) -> Result<()> {
    let catalog = open_catalog(layout)?;
    let stats = run_backfill(
        &catalog,
        &HeuristicGenerator::default(),
        layout.root(),
        BackfillOptions {
            dry_run: args.dry_run,
        },
    )
    .context("Metadata backfill failed")?;
    emit(args.json, &stats, || {
        let verb = if stats.dry_run {
            "would update"
        } else {
            "updated"
        };
        format!(
            "Scanned {} datasets: {} incomplete, {verb} {}, {} unresolved",
            stats.scanned, stats.incomplete, stats.updated, stats.unresolved
        )
    })
}

fn run_query(args: QueryArgs, layout: &DataLayout) -> Result<()> {
    let text = args.query.trim();
    if text.is_empty() {
        anyhow::bail!("Query text must not be blank");
    }
    let models = LoadedModels::load(layout)?;
    let recommender = Recommender::new(
        SimilarityScorer::new(models.vectorizer, models.embedder, models.embeddings),
        Ranker::new(models.catalog),
    );
    let results = recommender
        .recommend(text, args.limit)
        .with_context(|| format!("Query '{text}' failed"))?;
    print_stdout(&serialize_json(&results)?)
}

async fn serve_http(
    args: ServeArgs,
    server_config: &ServerSection,
    layout: &DataLayout,
) -> Result<()> {
    let bind = args
        .bind
        .clone()
        .or_else(|| server_config.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let public = args.public || server_config.public.unwrap_or(false);
    let log_queries = args.log_queries || server_config.log_queries.unwrap_or(false);

    let addrs = server_security::resolve_guarded_bind_addrs(&bind, public).await?;
    let auth_token = AuthToken::resolve(args.auth_token.as_deref())?;
    if public && auth_token.is_none() {
        anyhow::bail!(
            "--public requires an auth token: set --auth-token or export DATAREC_AUTH_TOKEN"
        );
    }

    let models = LoadedModels::load(layout)?;
    let query_log = QueryLog::open(layout.query_log())
        .with_context(|| format!("Failed to open query log {}", layout.query_log().display()))?;
    let state = AppState::new(
        models.catalog,
        models.embeddings,
        models.vectorizer,
        models.embedder,
        Arc::new(query_log),
    )
    .with_query_logging(log_queries)
    .with_auth_token(auth_token);
    let auth_enabled = state.auth_is_enabled();
    let app = http_api::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving recommender API: {base_url}/api/query/"))?;
    print_stdout(&format!("Health endpoint: {base_url}/health"))?;
    if auth_enabled {
        print_stdout("Auth enabled: add header 'Authorization: Bearer $DATAREC_AUTH_TOKEN'")?;
    }
    if log_queries {
        print_stdout(&format!(
            "Query logging enabled: {}",
            layout.query_log().display()
        ))?;
    }
    if public {
        let addrs = addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        print_stdout(&format!(
            "Public bind enabled (--public). Resolved addresses: {addrs}"
        ))?;
    }
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/api/query/ -H 'Content-Type: application/json' -d '{{\"query\": \"retail sales\"}}'"
    ))?;

    axum::serve(listener, app).await?;
    Ok(())
}
