use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RemoteError;
use crate::timer::SplitEntry;

/// Load response. `entries` is optional on purpose: a response without it
/// is a malformed list and must surface as a load failure, not as an
/// empty run.
#[derive(Debug, Deserialize)]
struct LoadDocument {
    entries: Option<Vec<SplitEntry>>,
}

/// Persisted run. The wire shape mirrors the load document; the store
/// side ignores fields it does not know, so the completion stamp rides
/// along for archival.
#[derive(Debug, Serialize)]
struct StoreDocument<'a> {
    entries: &'a [SplitEntry],
    recorded_at: DateTime<Local>,
}

/// JSON client for one splits endpoint.
///
/// The endpoint serves the split list on GET and accepts achieved runs on
/// POST, both as `{"entries": [{"label": ..., "time": ...}]}`.
#[derive(Clone, Debug)]
pub struct SplitsClient {
    http: reqwest::Client,
    url: String,
}

impl SplitsClient {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the split definitions.
    pub async fn load(&self) -> Result<Vec<SplitEntry>, RemoteError> {
        debug!("Loading splits from {}", self.url);
        let document: LoadDocument = self
            .http
            .get(&self.url)
            .header("Content-Type", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let entries = document.entries.ok_or(RemoteError::MissingEntries)?;
        info!("Loaded {} splits from {}", entries.len(), self.url);
        Ok(entries)
    }

    /// Store an achieved run.
    pub async fn store(&self, entries: &[SplitEntry]) -> Result<(), RemoteError> {
        debug!("Storing {} splits to {}", entries.len(), self.url);
        let document = StoreDocument {
            entries,
            recorded_at: Local::now(),
        };
        self.http
            .post(&self.url)
            .json(&document)
            .send()
            .await?
            .error_for_status()?;
        info!("Stored run results to {}", self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_document_distinguishes_missing_from_empty() {
        let missing: LoadDocument = serde_json::from_str("{}").unwrap();
        assert!(missing.entries.is_none());

        let empty: LoadDocument = serde_json::from_str(r#"{"entries": []}"#).unwrap();
        assert_eq!(empty.entries.unwrap().len(), 0);
    }

    #[test]
    fn load_document_parses_optional_targets() {
        let doc: LoadDocument = serde_json::from_str(
            r#"{"entries": [{"label": "stage 1", "time": 90000}, {"label": "stage 2"}]}"#,
        )
        .unwrap();
        let entries = doc.entries.unwrap();
        assert_eq!(entries[0].time, Some(90_000));
        assert_eq!(entries[1].time, None);
    }

    #[test]
    fn store_document_keeps_the_wire_shape() {
        let entries = vec![SplitEntry {
            label: "stage 1".to_string(),
            time: Some(88_000),
        }];
        let document = StoreDocument {
            entries: &entries,
            recorded_at: Local::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["entries"][0]["label"], "stage 1");
        assert_eq!(value["entries"][0]["time"], 88_000);
        assert!(value["recorded_at"].is_string());
    }
}
