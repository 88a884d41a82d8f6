use std::time::Duration;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::AppConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub update_interval_secs: u64,
    pub max_retained: usize,
    pub indicator_window: usize,
    pub min_indicator_points: usize,
    pub flush_every: u64,
    pub send_timeout_secs: u64,
}

impl MonitorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            update_interval_secs: 10,
            max_retained: 10_000,
            indicator_window: 50,
            min_indicator_points: 10,
            flush_every: 10,  // cycles between history flushes
            send_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub horizon_url: String,
    pub asset_code: String,
    pub asset_issuer: String,
    pub request_timeout_secs: u64,
    pub csv_path: String,
    pub seed_prices: Vec<f64>,
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            horizon_url: "https://horizon-testnet.stellar.org".to_string(),
            asset_code: "KALE".to_string(),
            asset_issuer: "GCHPTWXMT3HYF4RLZHWBNRF4MPXLTJ76ISHMSYIWCCDXWUYOQG5MR2AB".to_string(),
            request_timeout_secs: 10,
            csv_path: "test_prices.csv".to_string(),
            seed_prices: crate::price_infra::connectors::synthetic::DEFAULT_SEED_PRICES.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Unset disables the durability sink.
    pub history_path: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            history_path: Some("price_history.json".to_string()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}
