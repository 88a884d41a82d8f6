use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use crate::price_infra::connectors::PriceSource;
use crate::error::{Error, Result};
use crate::types::price::{PricePoint, SourceTier};

const SOURCE_ID: &str = "stellar";

/// Reads the freshest trade for the tracked asset from a Stellar Horizon server.
pub struct HorizonConnector {
    client: reqwest::Client,
    trades_url: String,
    asset_code: String,
    asset_issuer: String,
}

impl HorizonConnector {
    pub fn new(
        horizon_url: &str,
        asset_code: &str,
        asset_issuer: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(SOURCE_ID, format!("client setup failed: {}", e)))?;

        Ok(HorizonConnector {
            client,
            trades_url: format!("{}/trades", horizon_url.trim_end_matches('/')),
            asset_code: asset_code.to_string(),
            asset_issuer: asset_issuer.to_string(),
        })
    }

    fn asset_type(&self) -> &'static str {
        if self.asset_code.len() <= 4 {
            "credit_alphanum4"
        } else {
            "credit_alphanum12"
        }
    }
}

#[async_trait]
impl PriceSource for HorizonConnector {
    async fn fetch(&self) -> Result<PricePoint> {
        let response = self.client
            .get(&self.trades_url)
            .query(&[
                ("base_asset_type", self.asset_type()),
                ("base_asset_code", self.asset_code.as_str()),
                ("base_asset_issuer", self.asset_issuer.as_str()),
                ("order", "desc"),
                ("limit", "10"),
            ])
            .send()
            .await
            .map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(Error::NotFound(format!("{} asset not found on Stellar network", self.asset_code)));
            }
            status if !status.is_success() => {
                return Err(Error::transport(SOURCE_ID, format!("horizon responded {}", status)));
            }
            _ => {}
        }

        let page: TradesPage = response.json()
            .await
            .map_err(|e| Error::transport(SOURCE_ID, format!("malformed trades page: {}", e)))?;

        let latest = page.embedded.records.into_iter().next()
            .ok_or_else(|| Error::NotFound(format!("no trades found for {} on Stellar", self.asset_code)))?;

        let numerator = latest.price.n.as_f64()
            .ok_or_else(|| Error::transport(SOURCE_ID, "unreadable price numerator"))?;
        let denominator = latest.price.d.as_f64()
            .ok_or_else(|| Error::transport(SOURCE_ID, "unreadable price denominator"))?;
        if denominator == 0.0 {
            return Err(Error::transport(SOURCE_ID, "trade price has zero denominator"));
        }

        let volume = latest.base_amount.as_ref().and_then(|v| v.as_f64());
        let point = PricePoint::now(numerator / denominator, SourceTier::Primary, volume)
            .map_err(|e| Error::transport(SOURCE_ID, e.to_string()))?;

        tracing::info!("Fetched {} price from Stellar: {:.6}", self.asset_code, point.value());
        Ok(point)
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Primary
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

#[derive(Deserialize)]
struct TradesPage {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedRecords,
}

#[derive(Deserialize)]
struct EmbeddedRecords {
    records: Vec<TradeRecord>,
}

#[derive(Deserialize)]
struct TradeRecord {
    price: TradePrice,
    #[serde(default)]
    base_amount: Option<Numeric>,
}

#[derive(Deserialize)]
struct TradePrice {
    n: Numeric,
    d: Numeric,
}

// Horizon encodes int64 fields as strings, older servers as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}
