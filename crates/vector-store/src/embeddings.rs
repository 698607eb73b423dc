use crate::error::{Result, VectorStoreError};
use ndarray::{Array2, Array3, ArrayView3, Axis, Ix3};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub const EMBEDDING_MODE_ENV: &str = "DATAREC_EMBEDDING_MODE";
pub const EMBEDDING_MODEL_ENV: &str = "DATAREC_EMBEDDING_MODEL";
pub const MODEL_DIR_ENV: &str = "DATAREC_MODEL_DIR";

pub const DEFAULT_MODEL_ID: &str = "all-minilm-l6-v2";
pub const EMBEDDING_DIM: usize = 384;
/// Longer inputs are truncated to this many tokens.
pub const MAX_EMBED_TOKENS: usize = 256;
const MAX_BATCH: usize = 32;

const MODEL_FILE_NAME: &str = "model.onnx";
const TOKENIZER_FILE_NAME: &str = "tokenizer.json";

/// Maps text to a fixed-dimension dense vector.
pub trait TextEmbedder: Send + Sync {
    /// One vector per input, in input order.
    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_many(&[text])?
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    Fast,
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported {EMBEDDING_MODE_ENV} '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        env::var(EMBEDDING_MODE_ENV).map_or(Ok(Self::Fast), |raw| Self::parse(&raw))
    }
}

/// Only the MiniLM sentence-transformer is available; its hub name is accepted as an alias.
fn supported_model_id(raw: &str) -> Result<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | DEFAULT_MODEL_ID | "sentence-transformers/all-minilm-l6-v2" => Ok(DEFAULT_MODEL_ID),
        other => Err(VectorStoreError::EmbeddingError(format!(
            "Unsupported embedding model '{other}'; only {DEFAULT_MODEL_ID} is available"
        ))),
    }
}

/// `DATAREC_MODEL_DIR`, else `$XDG_CACHE_HOME/datarec/all-minilm-l6-v2` (or `~/.cache/...`).
fn model_dir_from_env() -> PathBuf {
    if let Ok(path) = env::var(MODEL_DIR_ENV) {
        return PathBuf::from(path);
    }
    let cache = env::var("XDG_CACHE_HOME").map_or_else(
        |_| {
            env::var("HOME")
                .map_or_else(|_| PathBuf::from("."), PathBuf::from)
                .join(".cache")
        },
        PathBuf::from,
    );
    cache.join("datarec").join(DEFAULT_MODEL_ID)
}

fn embedding_error<E: Display>(context: &'static str) -> impl FnOnce(E) -> VectorStoreError {
    move |err| VectorStoreError::EmbeddingError(format!("{context}: {err}"))
}

/// Token ids, attention mask and segment ids of one batch, padded to the longest row.
struct TokenBatch {
    input_ids: Array2<i64>,
    attention_mask: Array2<i64>,
    token_type_ids: Array2<i64>,
}

impl TokenBatch {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let width = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let shape = (encodings.len(), width);
        let mut batch = Self {
            input_ids: Array2::zeros(shape),
            attention_mask: Array2::zeros(shape),
            token_type_ids: Array2::zeros(shape),
        };
        for (row, encoding) in encodings.iter().enumerate() {
            let columns = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids());
            for (col, ((&id, &mask), &type_id)) in columns.enumerate() {
                batch.input_ids[[row, col]] = i64::from(id);
                batch.attention_mask[[row, col]] = i64::from(mask);
                batch.token_type_ids[[row, col]] = i64::from(type_id);
            }
        }
        batch
    }

    fn input(&self, name: &str) -> Option<&Array2<i64>> {
        match name {
            "input_ids" => Some(&self.input_ids),
            "attention_mask" => Some(&self.attention_mask),
            "token_type_ids" => Some(&self.token_type_ids),
            _ => None,
        }
    }
}

/// MiniLM exported to ONNX: `model.onnx` and `tokenizer.json` in one directory.
struct OnnxEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxEncoder {
    fn open(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE_NAME);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE_NAME);
        if !model_path.is_file() || !tokenizer_path.is_file() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files are missing: expected {} and {}. Set {MODEL_DIR_ENV} or use {EMBEDDING_MODE_ENV}=stub.",
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(embedding_error("Tokenizer load failed"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_EMBED_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(embedding_error("Tokenizer truncation failed"))?;

        let session = Session::builder()
            .map_err(embedding_error("ONNX session builder failed"))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(embedding_error("CPU execution provider failed"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(embedding_error("ONNX optimization level failed"))?
            .with_intra_threads(intra_threads())
            .map_err(embedding_error("ONNX thread setup failed"))?
            .commit_from_file(&model_path)
            .map_err(embedding_error("Failed to load ONNX model"))?;

        log::info!("Loaded {DEFAULT_MODEL_ID} from {}", model_dir.display());
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            let encodings = self
                .tokenizer
                .encode_batch(chunk.to_vec(), true)
                .map_err(embedding_error("Tokenization failed"))?;
            let batch = TokenBatch::from_encodings(&encodings);
            let hidden = self.forward(&batch)?;
            for vector in mean_pool(hidden.view(), &batch.attention_mask) {
                if vector.len() != EMBEDDING_DIM {
                    return Err(VectorStoreError::InvalidDimension {
                        expected: EMBEDDING_DIM,
                        actual: vector.len(),
                    });
                }
                vectors.push(vector);
            }
        }
        Ok(vectors)
    }

    /// Token-level hidden states, `[batch, tokens, dim]`.
    fn forward(&self, batch: &TokenBatch) -> Result<Array3<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| VectorStoreError::EmbeddingError("ONNX session lock poisoned".into()))?;

        let mut feed: HashMap<String, DynTensor> = HashMap::new();
        for input in &session.inputs {
            let values = batch.input(&input.name).ok_or_else(|| {
                VectorStoreError::EmbeddingError(format!("Unexpected ONNX input '{}'", input.name))
            })?;
            let tensor = Tensor::from_array(values.clone().into_dyn())
                .map_err(embedding_error("Input tensor failed"))?;
            feed.insert(input.name.clone(), tensor.upcast());
        }

        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(embedding_error("ONNX forward failed"))?;
        if outputs.len() == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "ONNX returned no outputs".to_string(),
            ));
        }
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .map_err(embedding_error("Failed to decode ONNX output"))?
            .to_owned();
        hidden
            .into_dimensionality::<Ix3>()
            .map_err(embedding_error("Unexpected ONNX output shape"))
    }
}

fn intra_threads() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    match cpus {
        0..=4 => 1,
        5..=12 => 2,
        _ => 4,
    }
}

/// Average of unmasked token states per row, L2 normalized.
fn mean_pool(hidden: ArrayView3<'_, f32>, mask: &Array2<i64>) -> Vec<Vec<f32>> {
    hidden
        .outer_iter()
        .zip(mask.outer_iter())
        .map(|(tokens, row_mask)| {
            let mut sum = vec![0.0f32; tokens.len_of(Axis(1))];
            let mut count = 0.0f32;
            for (token, &keep) in tokens.outer_iter().zip(row_mask.iter()) {
                if keep == 0 {
                    continue;
                }
                count += 1.0;
                for (acc, value) in sum.iter_mut().zip(token.iter()) {
                    *acc += value;
                }
            }
            if count > 0.0 {
                for value in &mut sum {
                    *value /= count;
                }
            }
            normalize(&mut sum);
            sum
        })
        .collect()
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Deterministic hash-derived unit vector; blank text maps to the zero vector.
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    if text.trim().is_empty() {
        return vec![0.0; dimension];
    }
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum EmbeddingBackend {
    Onnx(OnnxEncoder),
    Stub,
}

/// Sentence embedding model backed by ONNX Runtime, or by the hash stub.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
}

impl EmbeddingModel {
    /// Mode, model id and model directory from `DATAREC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let model_id = env::var(EMBEDDING_MODEL_ENV).unwrap_or_default();
        Self::load(EmbeddingMode::from_env()?, &model_id, &model_dir_from_env())
    }

    pub fn load(mode: EmbeddingMode, model_id: &str, model_dir: &Path) -> Result<Self> {
        let model_id = supported_model_id(model_id)?;
        let backend = match mode {
            EmbeddingMode::Stub => {
                log::debug!("Using stub embeddings for {model_id} (dim {EMBEDDING_DIM})");
                EmbeddingBackend::Stub
            }
            EmbeddingMode::Fast => EmbeddingBackend::Onnx(OnnxEncoder::open(model_dir)?),
        };
        Ok(Self {
            backend,
            dimension: EMBEDDING_DIM,
        })
    }

    #[must_use]
    pub fn stub(dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Stub,
            dimension,
        }
    }
}

impl TextEmbedder for EmbeddingModel {
    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        match &self.backend {
            EmbeddingBackend::Stub => Ok(texts
                .iter()
                .map(|text| stub_embed(text, self.dimension))
                .collect()),
            EmbeddingBackend::Onnx(encoder) => encoder.encode(texts),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
