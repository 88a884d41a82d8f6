use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::types::price::PricePoint;

/// Configured alert condition.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AlertRule {
    Above { threshold: f64 },
    Below { threshold: f64 },
    /// Absolute move between consecutive observations, in percent.
    Change { percent: f64 },
}

impl AlertRule {
    pub fn validate(&self) -> Result<()> {
        let v = match self {
            AlertRule::Above { threshold } | AlertRule::Below { threshold } => *threshold,
            AlertRule::Change { percent } => *percent,
        };
        if !v.is_finite() || v <= 0.0 {
            return Err(Error::Validation(format!("alert threshold must be positive: {:?}", self)));
        }
        Ok(())
    }

    fn alert_type(&self) -> &'static str {
        match self {
            AlertRule::Above { .. } => "above",
            AlertRule::Below { .. } => "below",
            AlertRule::Change { .. } => "change",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub alert_type: String,
    pub threshold: f64,
    pub price: f64,
    pub previous_price: Option<f64>,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

/// Evaluates alert rules against consecutive observations.
pub struct AlertMonitor {
    rules: Vec<AlertRule>,
    last_price: Option<f64>,
}

impl AlertMonitor {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        AlertMonitor {
            rules,
            last_price: None,
        }
    }

    /// Seeds the comparison baseline, e.g. after restoring history.
    pub fn prime(&mut self, last: Option<&PricePoint>) {
        self.last_price = last.map(|p| p.value());
    }

    pub fn check(&mut self, point: &PricePoint) -> Vec<PriceAlert> {
        let price = point.value();
        let previous = self.last_price.replace(price);

        // Nothing to compare against on the first observation
        let Some(prev) = previous else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        for rule in &self.rules {
            let fired = match rule {
                AlertRule::Above { threshold } => {
                    (prev <= *threshold && price > *threshold).then(|| (*threshold, format!(
                        "Price rose above {:.6}: now {:.6}", threshold, price
                    )))
                }
                AlertRule::Below { threshold } => {
                    (prev >= *threshold && price < *threshold).then(|| (*threshold, format!(
                        "Price fell below {:.6}: now {:.6}", threshold, price
                    )))
                }
                AlertRule::Change { percent } => {
                    let movement = (price - prev).abs() / prev * 100.0;
                    (movement >= *percent).then(|| (*percent, format!(
                        "Price moved {:.2}% ({:.6} -> {:.6})", movement, prev, price
                    )))
                }
            };

            if let Some((threshold, message)) = fired {
                tracing::warn!("Price alert triggered: {}", message);
                alerts.push(PriceAlert {
                    alert_type: rule.alert_type().to_string(),
                    threshold,
                    price,
                    previous_price: Some(prev),
                    message,
                    triggered_at: point.timestamp(),
                });
            }
        }

        alerts
    }
}
