use crate::config::*;
use crate::error::{Error, Result};
use crate::price_infra::alerts::AlertRule;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub sources: SourcesConfig,
    pub persistence: PersistenceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub alerts: Vec<AlertRule>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("KALE_TRACKER").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        if m.max_retained == 0 {
            return Err(Error::Validation("monitor.max_retained must be positive".into()));
        }
        if m.update_interval_secs == 0 {
            return Err(Error::Validation("monitor.update_interval_secs must be positive".into()));
        }
        if m.indicator_window == 0 || m.min_indicator_points == 0 {
            return Err(Error::Validation("indicator window sizes must be positive".into()));
        }
        if m.flush_every == 0 {
            return Err(Error::Validation("monitor.flush_every must be positive".into()));
        }
        if m.send_timeout_secs == 0 {
            return Err(Error::Validation("monitor.send_timeout_secs must be positive".into()));
        }
        if self.sources.seed_prices.is_empty() {
            return Err(Error::Validation("sources.seed_prices must not be empty".into()));
        }
        for rule in &self.alerts {
            rule.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.update_interval_secs, 10);
        assert_eq!(config.monitor.max_retained, 10_000);
        assert_eq!(config.sources.seed_prices.len(), 8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [monitor]
            max_retained = 500

            [[alerts]]
            type = "above"
            threshold = 0.1
            "#,
        ).unwrap();

        assert_eq!(config.monitor.max_retained, 500);
        assert_eq!(config.monitor.indicator_window, 50);
        assert_eq!(config.alerts, vec![AlertRule::Above { threshold: 0.1 }]);
    }

    #[test]
    fn zero_retention_is_rejected() {
        let err = AppConfig::from_toml_str("[monitor]\nmax_retained = 0\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_seed_list_is_rejected() {
        let mut config = AppConfig::default();
        config.sources.seed_prices.clear();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }
}
