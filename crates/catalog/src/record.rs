use crate::error::{CatalogError, Result};
use serde::{Deserialize, Deserializer, Serialize};

pub type DatasetId = u64;

/// A cataloged dataset. `url` is unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub title: String,
    pub description: String,
    pub source: String,
    pub url: String,
    pub size: String,
    pub format: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl DatasetRecord {
    /// `title + " " + description`, the text both vector kinds are computed from.
    #[must_use]
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    #[must_use]
    pub fn has_blank_text(&self) -> bool {
        self.title.trim().is_empty() || self.description.trim().is_empty()
    }
}

/// Ingestion payload. Missing or `null` fields read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDataset {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub size: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub format: String,
}

impl NewDataset {
    /// Trims every field and checks the minimum a record needs: a url plus a title or a
    /// description (backfill can derive the other one later).
    pub fn normalized(self) -> Result<Self> {
        let out = Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            source: self.source.trim().to_string(),
            url: self.url.trim().to_string(),
            size: self.size.trim().to_string(),
            format: self.format.trim().to_string(),
        };
        if out.url.is_empty() {
            return Err(CatalogError::InvalidRecord("url is required".to_string()));
        }
        if out.title.is_empty() && out.description.is_empty() {
            return Err(CatalogError::InvalidRecord(format!(
                "dataset {} needs a title or a description",
                out.url
            )));
        }
        Ok(out)
    }

    pub(crate) fn into_record(self, id: DatasetId, now_ms: u64) -> DatasetRecord {
        DatasetRecord {
            id,
            title: self.title,
            description: self.description,
            source: self.source,
            url: self.url,
            size: self.size,
            format: self.format,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn null_and_missing_fields_become_empty() {
        let parsed: NewDataset = serde_json::from_str(
            r#"{"title": "Census", "description": null, "url": "https://example.org/census"}"#,
        )
        .unwrap();
        assert_eq!(parsed.description, "");
        assert_eq!(parsed.format, "");
    }

    #[test]
    fn normalized_requires_url_and_some_text() {
        let missing_url = NewDataset {
            title: "Weather".into(),
            ..NewDataset::default()
        };
        assert!(matches!(
            missing_url.normalized(),
            Err(CatalogError::InvalidRecord(_))
        ));

        let missing_text = NewDataset {
            url: "https://example.org/x".into(),
            ..NewDataset::default()
        };
        assert!(missing_text.normalized().is_err());

        let ok = NewDataset {
            title: "  Weather  ".into(),
            url: " https://example.org/weather ".into(),
            ..NewDataset::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(ok.title, "Weather");
        assert_eq!(ok.url, "https://example.org/weather");
    }

    #[test]
    fn combined_text_joins_title_and_description() {
        let record = NewDataset {
            title: "Retail sales".into(),
            description: "Monthly store revenue".into(),
            url: "u".into(),
            ..NewDataset::default()
        }
        .into_record(1, 10);
        assert_eq!(record.combined_text(), "Retail sales Monthly store revenue");
        assert!(!record.has_blank_text());
    }
}
