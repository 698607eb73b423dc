//! TF-IDF text vectorizer.
//!
//! Tokens are lowercase runs of two or more word characters. Feature indices follow the
//! alphabetical order of the vocabulary, weights are raw term counts times the smoothed IDF
//! `ln((1 + n) / (1 + df)) + 1`, and every row is L2-normalized.

use crate::error::{Result, VectorStoreError};
use datarec_catalog::{read_json_versioned, write_json_atomic, FileLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

const TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Maps text to a fixed-dimension lexical vector.
pub trait TextVectorizer: Send + Sync {
    fn transform(&self, text: &str) -> Result<Vec<f32>>;

    /// Vocabulary size; zero before fitting.
    fn dimension(&self) -> usize;
}

/// Persisted fitted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TfidfState {
    vocabulary: Vec<String>,
    idf: Vec<f32>,
    n_documents: usize,
}

struct Fitted {
    index: HashMap<String, usize>,
    state: TfidfState,
}

impl Fitted {
    fn from_state(state: TfidfState) -> Result<Self> {
        if state.vocabulary.len() != state.idf.len() {
            return Err(VectorStoreError::InvalidDimension {
                expected: state.vocabulary.len(),
                actual: state.idf.len(),
            });
        }
        let index = state
            .vocabulary
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        Ok(Self { index, state })
    }
}

pub struct TfidfVectorizer {
    token_re: Regex,
    fitted: Option<Fitted>,
}

impl TfidfVectorizer {
    /// An unfitted vectorizer; `transform` fails until [`fit`](Self::fit) succeeds.
    pub fn new() -> Result<Self> {
        let token_re = Regex::new(TOKEN_PATTERN)
            .map_err(|e| VectorStoreError::Other(format!("token pattern: {e}")))?;
        Ok(Self {
            token_re,
            fitted: None,
        })
    }

    pub fn fitted<S: AsRef<str>>(corpus: &[S]) -> Result<Self> {
        let mut vectorizer = Self::new()?;
        vectorizer.fit(corpus)?;
        Ok(vectorizer)
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_re
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Learns vocabulary and document frequencies, replacing any previous fit.
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<()> {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for document in corpus {
            let distinct: BTreeSet<String> = self.tokenize(document.as_ref()).into_iter().collect();
            for term in distinct {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        if document_frequency.is_empty() {
            return Err(VectorStoreError::InvalidCorpus(format!(
                "no tokens found in {} document(s); vocabulary would be empty",
                corpus.len()
            )));
        }

        let n_documents = corpus.len();
        let (vocabulary, idf): (Vec<String>, Vec<f32>) = document_frequency
            .into_iter()
            .map(|(term, df)| (term, smoothed_idf(n_documents, df)))
            .unzip();

        log::info!(
            "Fitted TF-IDF vocabulary of {} terms over {} documents",
            vocabulary.len(),
            n_documents
        );
        self.fitted = Some(Fitted::from_state(TfidfState {
            vocabulary,
            idf,
            n_documents,
        })?);
        Ok(())
    }

    fn fitted_state(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or_else(|| {
            VectorStoreError::NotFitted("call fit or load before transform".to_string())
        })
    }

    #[must_use]
    pub fn vocabulary(&self) -> &[String] {
        self.fitted
            .as_ref()
            .map_or(&[], |fitted| fitted.state.vocabulary.as_slice())
    }

    /// Writes the fitted state as versioned JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let fitted = self.fitted_state()?;
        let _lock = FileLock::acquire(path)?;
        write_json_atomic(path, &fitted.state)?;
        log::debug!("Saved vectorizer state to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let state: TfidfState = read_json_versioned(path, "vectorizer")?.ok_or_else(|| {
            VectorStoreError::NotFitted(format!("no vectorizer state at {}", path.display()))
        })?;
        let mut vectorizer = Self::new()?;
        vectorizer.fitted = Some(Fitted::from_state(state)?);
        log::info!(
            "Loaded TF-IDF vectorizer ({} terms) from {}",
            vectorizer.dimension(),
            path.display()
        );
        Ok(vectorizer)
    }
}

impl TextVectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> Result<Vec<f32>> {
        let fitted = self.fitted_state()?;
        let mut row = vec![0.0f32; fitted.state.vocabulary.len()];
        for token in self.tokenize(text) {
            if let Some(&idx) = fitted.index.get(&token) {
                row[idx] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&fitted.state.idf) {
            *value *= idf;
        }
        l2_normalize(&mut row);
        Ok(row)
    }

    fn dimension(&self) -> usize {
        self.vocabulary().len()
    }
}

#[allow(clippy::cast_precision_loss)]
fn smoothed_idf(n_documents: usize, document_frequency: usize) -> f32 {
    let n = n_documents as f64;
    let df = document_frequency as f64;
    (((1.0 + n) / (1.0 + df)).ln() + 1.0) as f32
}

fn l2_normalize(row: &mut [f32]) {
    let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in row {
        *value /= norm;
    }
}
