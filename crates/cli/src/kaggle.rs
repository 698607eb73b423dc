//! Catalog harvesting from the Kaggle public dataset API.

use anyhow::{Context as AnyhowContext, Result};
use datarec_catalog::NewDataset;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const KAGGLE_API_BASE: &str = "https://www.kaggle.com/api/v1";
pub(crate) const KAGGLE_SOURCE: &str = "Kaggle";
const KAGGLE_DATASET_URL: &str = "https://www.kaggle.com/datasets";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Deserialize, PartialEq, Eq)]
pub(crate) struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl KaggleCredentials {
    /// `KAGGLE_USERNAME` + `KAGGLE_KEY`, else `kaggle.json` in `KAGGLE_CONFIG_DIR` or `~/.kaggle`.
    pub(crate) fn resolve() -> Result<Self> {
        if let (Ok(username), Ok(key)) = (env::var("KAGGLE_USERNAME"), env::var("KAGGLE_KEY")) {
            return Ok(Self { username, key });
        }
        let path = credentials_path().context(
            "Cannot locate kaggle.json; set KAGGLE_USERNAME and KAGGLE_KEY instead",
        )?;
        Self::from_file(&path)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read Kaggle credentials {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid Kaggle credentials {}", path.display()))
    }
}

fn credentials_path() -> Option<PathBuf> {
    env::var_os("KAGGLE_CONFIG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".kaggle")))
        .map(|dir| dir.join("kaggle.json"))
}

#[derive(Debug, Deserialize)]
struct DatasetListing {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(rename = "totalBytes", default)]
    total_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileListing {
    #[serde(rename = "datasetFiles", alias = "files", default)]
    files: Vec<KaggleFile>,
}

#[derive(Debug, Deserialize)]
struct KaggleFile {
    name: String,
}

pub(crate) struct KaggleClient {
    client: reqwest::Client,
    base_url: String,
    credentials: KaggleCredentials,
}

impl KaggleClient {
    pub(crate) fn new(credentials: KaggleCredentials, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("datarec/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Kaggle HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn list_page(&self, search: &str, page: usize) -> Result<Vec<DatasetListing>> {
        let page = page.to_string();
        let listings = self
            .client
            .get(format!("{}/datasets/list", self.base_url))
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .query(&[("search", search), ("page", page.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listings)
    }

    async fn list_files(&self, reference: &str) -> Result<Vec<String>> {
        let listing: FileListing = self
            .client
            .get(format!("{}/datasets/list/{reference}", self.base_url))
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.files.into_iter().map(|file| file.name).collect())
    }

    /// Pages through every search term until an empty page, a failed request, or `max_pages`.
    /// Datasets without a ref or without files are skipped.
    pub(crate) async fn fetch(
        &self,
        search_terms: &[String],
        max_pages: Option<usize>,
    ) -> Vec<NewDataset> {
        let mut datasets = Vec::new();
        for term in search_terms {
            let mut page = 1;
            while max_pages.map_or(true, |max| page <= max) {
                log::info!("Fetching Kaggle datasets for '{term}', page {page}");
                let listings = match self.list_page(term, page).await {
                    Ok(listings) => listings,
                    Err(err) => {
                        log::warn!("Kaggle list for '{term}' page {page} failed: {err:#}");
                        break;
                    }
                };
                if listings.is_empty() {
                    log::info!("No more Kaggle datasets for '{term}' after page {}", page - 1);
                    break;
                }

                for listing in &listings {
                    let Some(reference) = listing
                        .reference
                        .as_deref()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                    else {
                        log::warn!("Skipping Kaggle dataset without a ref");
                        continue;
                    };
                    let files = match self.list_files(reference).await {
                        Ok(files) => files,
                        Err(err) => {
                            log::warn!("Listing files of {reference} failed: {err:#}");
                            continue;
                        }
                    };
                    if files.is_empty() {
                        log::debug!("No files found for dataset {reference}");
                        continue;
                    }
                    datasets.push(to_new_dataset(reference, listing, &files));
                }
                page += 1;
            }
        }
        datasets
    }
}

fn to_new_dataset(reference: &str, listing: &DatasetListing, files: &[String]) -> NewDataset {
    NewDataset {
        title: listing.title.clone().unwrap_or_default(),
        description: listing.subtitle.clone().unwrap_or_default(),
        source: KAGGLE_SOURCE.to_string(),
        url: dataset_url(reference),
        size: listing.total_bytes.map(human_size).unwrap_or_default(),
        format: formats_from_files(files),
    }
}

pub(crate) fn dataset_url(reference: &str) -> String {
    format!("{KAGGLE_DATASET_URL}/{}", reference.trim_matches('/'))
}

/// Distinct lowercase file extensions, sorted and comma separated.
pub(crate) fn formats_from_files(names: &[String]) -> String {
    names
        .iter()
        .filter_map(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in UNITS.iter().skip(1).copied() {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}
