pub mod horizon;
pub mod csv_file;
pub mod synthetic;

use async_trait::async_trait;
use crate::error::Result;
use crate::types::price::{PricePoint, SourceTier};

/// One ranked price source. A failed fetch is absorbed by the coordinator.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self) -> Result<PricePoint>;
    fn tier(&self) -> SourceTier;
    fn source_id(&self) -> &str;
}
