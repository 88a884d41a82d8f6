pub mod connectors;
pub mod coordinator;
pub mod alerts;

use std::sync::Arc;
use crate::config::SourcesConfig;
use crate::error::Result;
use crate::price_infra::connectors::PriceSource;
use crate::price_infra::connectors::csv_file::CsvFileConnector;
use crate::price_infra::connectors::horizon::HorizonConnector;
use crate::price_infra::connectors::synthetic::SyntheticSource;
use crate::price_infra::coordinator::FallbackCoordinator;

/// Wires the three configured tiers: Stellar trades, CSV backup, seed prices.
pub fn build_coordinator(config: &SourcesConfig) -> Result<FallbackCoordinator> {
    let horizon = HorizonConnector::new(
        &config.horizon_url,
        &config.asset_code,
        &config.asset_issuer,
        config.request_timeout(),
    )?;
    let csv = CsvFileConnector::new(&config.csv_path);
    let floor = SyntheticSource::new(config.seed_prices.clone())?;

    let sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(horizon), Arc::new(csv)];
    Ok(FallbackCoordinator::new(sources, Arc::new(floor)))
}
