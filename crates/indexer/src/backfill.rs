//! Offline fill of blank dataset titles and descriptions. Only text fields are touched;
//! embeddings pick up the new text on the next embedding run.

use crate::error::Result;
use crate::index_lock::acquire_job_lock;
use crate::stats::{BackfillChange, BackfillStats, MetadataField};
use datarec_catalog::{CatalogStore, DatasetRecord};
use std::path::Path;

pub trait MetadataGenerator: Send + Sync {
    fn generate_title(&self, record: &DatasetRecord) -> Option<String>;

    fn generate_description(&self, record: &DatasetRecord) -> Option<String>;
}

/// Titles from the description's leading words (or the URL slug), descriptions from the title.
#[derive(Debug, Clone)]
pub struct HeuristicGenerator {
    pub max_title_words: usize,
}

impl Default for HeuristicGenerator {
    fn default() -> Self {
        Self { max_title_words: 8 }
    }
}

impl MetadataGenerator for HeuristicGenerator {
    fn generate_title(&self, record: &DatasetRecord) -> Option<String> {
        let from_description = record
            .description
            .split_whitespace()
            .take(self.max_title_words.max(1))
            .collect::<Vec<_>>()
            .join(" ");
        let from_description =
            from_description.trim_end_matches(|c: char| c.is_ascii_punctuation());
        if !from_description.is_empty() {
            return Some(from_description.to_string());
        }
        url_slug(&record.url).map(|slug| humanize_slug(&slug))
    }

    fn generate_description(&self, record: &DatasetRecord) -> Option<String> {
        let title = record.title.trim();
        if title.is_empty() {
            return None;
        }
        let mut description = format!("{title} dataset");
        if !record.source.trim().is_empty() {
            description.push_str(" from ");
            description.push_str(record.source.trim());
        }
        if !record.format.trim().is_empty() {
            description.push_str(&format!(" ({})", record.format.trim()));
        }
        description.push('.');
        Some(description)
    }
}

/// Last non-empty path segment of a URL, without query or fragment.
fn url_slug(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .last()
        .map(ToString::to_string)
}

fn humanize_slug(slug: &str) -> String {
    slug.split(['-', '_', '.', '+'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillOptions {
    /// Report the changes without writing them.
    pub dry_run: bool,
}

pub fn run_backfill(
    catalog: &CatalogStore,
    generator: &dyn MetadataGenerator,
    data_dir: &Path,
    options: BackfillOptions,
) -> Result<BackfillStats> {
    let _lock = acquire_job_lock(data_dir)?;
    let mut stats = BackfillStats {
        dry_run: options.dry_run,
        ..BackfillStats::default()
    };

    for record in catalog.list()? {
        stats.scanned += 1;
        if !record.has_blank_text() {
            continue;
        }
        stats.incomplete += 1;

        let mut working = record.clone();
        let new_title = if record.title.trim().is_empty() {
            generator.generate_title(&record)
        } else {
            None
        };
        if let Some(title) = &new_title {
            working.title.clone_from(title);
        }
        let new_description = if record.description.trim().is_empty() {
            generator.generate_description(&working)
        } else {
            None
        };

        if new_title.is_none() && new_description.is_none() {
            log::warn!(
                "Could not derive missing metadata for dataset {} ({})",
                record.id,
                record.url
            );
            stats.unresolved += 1;
            continue;
        }

        for (field, value) in [
            (MetadataField::Title, &new_title),
            (MetadataField::Description, &new_description),
        ] {
            if let Some(value) = value {
                log::info!("Dataset {}: {field:?} -> {value:?}", record.id);
                stats.changes.push(BackfillChange {
                    dataset_id: record.id,
                    field,
                    value: value.clone(),
                });
            }
        }
        if !options.dry_run {
            catalog.update_text(record.id, new_title, new_description)?;
        }
        stats.updated += 1;
    }

    log::info!(
        "Backfill scanned {} datasets: {} incomplete, {} {}, {} unresolved",
        stats.scanned,
        stats.incomplete,
        stats.updated,
        if options.dry_run { "would be updated" } else { "updated" },
        stats.unresolved
    );
    Ok(stats)
}
