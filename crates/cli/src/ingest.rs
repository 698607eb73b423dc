use anyhow::{Context as AnyhowContext, Result};
use datarec_catalog::NewDataset;
use std::path::Path;

/// Reads a JSON array of dataset objects.
pub(crate) fn read_datasets(path: &Path) -> Result<Vec<NewDataset>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_datasets(&bytes).with_context(|| format!("Invalid dataset file {}", path.display()))
}

pub(crate) fn parse_datasets(bytes: &[u8]) -> Result<Vec<NewDataset>> {
    let datasets: Vec<NewDataset> = serde_json::from_slice(bytes)?;
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_array_with_missing_and_null_fields() {
        let datasets = parse_datasets(
            br#"[
                {"title": "Retail", "description": null, "url": "https://example.org/r"},
                {"title": "Weather", "source": "Kaggle", "url": "https://example.org/w",
                 "size": "2 MB", "format": "csv"}
            ]"#,
        )
        .unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].description, "");
        assert_eq!(datasets[1].format, "csv");
    }

    #[test]
    fn rejects_non_array_documents() {
        assert!(parse_datasets(br#"{"title": "Retail"}"#).is_err());
    }
}
