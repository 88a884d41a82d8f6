use std::path::PathBuf;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::analytics::indicators::IndicatorSnapshot;
use crate::error::{Error, Result};
use crate::types::price::PricePoint;

/// Everything the durability sink keeps between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedHistory {
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub indicators: Vec<IndicatorSnapshot>,
}

#[async_trait]
pub trait DurabilitySink: Send + Sync {
    /// Returns an empty history when nothing was persisted yet.
    async fn load(&self) -> Result<PersistedHistory>;
    async fn persist(&self, history: &PersistedHistory) -> Result<()>;
}

/// Stores the history as one JSON document, replaced atomically on each flush.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSink { path: path.into() }
    }
}

#[async_trait]
impl DurabilitySink for JsonFileSink {
    async fn load(&self) -> Result<PersistedHistory> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedHistory::default());
            }
            Err(e) => {
                return Err(Error::Storage(format!("reading {}: {}", self.path.display(), e)));
            }
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(format!("decoding {}: {}", self.path.display(), e)))
    }

    async fn persist(&self, history: &PersistedHistory) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(history)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::Storage(format!("writing {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Storage(format!("replacing {}: {}", self.path.display(), e)))?;

        tracing::debug!(
            "Persisted {} prices and {} indicator rows to {}",
            history.prices.len(),
            history.indicators.len(),
            self.path.display()
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::price::SourceTier;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("price_history.json"));
        assert_eq!(sink.load().await.unwrap(), PersistedHistory::default());
    }

    #[tokio::test]
    async fn persisted_history_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("price_history.json"));

        let prices = vec![
            PricePoint::now(0.095, SourceTier::Primary, Some(10.0)).unwrap(),
            PricePoint::now(0.096, SourceTier::Fallback, None).unwrap(),
        ];
        let indicators = vec![IndicatorSnapshot::compute(&[0.095, 0.096], prices[1].timestamp())];
        let history = PersistedHistory { prices, indicators };

        sink.persist(&history).await.unwrap();
        assert_eq!(sink.load().await.unwrap(), history);
        assert!(!dir.path().join("price_history.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_history.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileSink::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
