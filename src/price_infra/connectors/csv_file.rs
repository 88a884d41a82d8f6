use std::path::{Path, PathBuf};
use async_trait::async_trait;
use crate::price_infra::connectors::PriceSource;
use crate::error::{Error, Result};
use crate::types::price::{PricePoint, SourceTier};

const SOURCE_ID: &str = "csv";

/// Backup source: the last row of a CSV table with a `price` column.
pub struct CsvFileConnector {
    path: PathBuf,
}

impl CsvFileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvFileConnector { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for CsvFileConnector {
    async fn fetch(&self) -> Result<PricePoint> {
        let path = self.path.clone();
        let (price, volume) = tokio::task::spawn_blocking(move || read_last_row(&path))
            .await
            .map_err(|e| Error::transport(SOURCE_ID, format!("reader task failed: {}", e)))??;

        let point = PricePoint::now(price, SourceTier::Secondary, volume)
            .map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?;

        tracing::info!("Fetched price from CSV {}: {:.6}", self.path.display(), point.value());
        Ok(point)
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Secondary
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

fn read_last_row(path: &Path) -> Result<(f64, Option<f64>)> {
    if !path.exists() {
        return Err(Error::NotFound(format!("CSV file {} not found", path.display())));
    }

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?;

    let headers = reader.headers()
        .map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?
        .clone();
    let price_idx = headers.iter().position(|h| h.trim() == "price")
        .ok_or_else(|| Error::NotFound(format!("{} has no 'price' column", path.display())))?;
    let volume_idx = headers.iter().position(|h| h.trim() == "volume");

    let mut last = None;
    for record in reader.records() {
        last = Some(record.map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?);
    }
    let row = last.ok_or_else(|| Error::NotFound(format!("{} is empty", path.display())))?;

    let price = row.get(price_idx)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::NotFound(format!("{} last row has no price", path.display())))?
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::transport(SOURCE_ID, format!("unparsable price: {}", e)))?;

    let volume = volume_idx
        .and_then(|i| row.get(i))
        .and_then(|v| v.trim().parse::<f64>().ok());

    Ok((price, volume))
}
