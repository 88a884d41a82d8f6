//! Rolling technical indicators over an oldest-first price window.
//!
//! Everything here is a pure function of its input slice; nothing carries
//! state between cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RSI_PERIOD: usize = 14;

/// Arithmetic mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the first value of the window.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let (first, rest) = values.split_first()?;
    Some(rest.iter().fold(*first, |ema, price| price * alpha + ema * (1.0 - alpha)))
}

/// Relative strength index over the last `period` deltas.
///
/// Returns 100 when the window has no losses.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len() - period..];

    let avg_gain = recent.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let avg_loss = recent.iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Population standard deviation of the whole window.
pub fn volatility(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub sma_10: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_10: Option<f64>,
    pub rsi_14: Option<f64>,
    pub volatility: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl IndicatorSnapshot {
    pub fn compute(values: &[f64], timestamp: DateTime<Utc>) -> Self {
        IndicatorSnapshot {
            sma_10: sma(values, 10),
            sma_20: sma(values, 20),
            ema_10: ema(values, 10),
            rsi_14: rsi(values, RSI_PERIOD),
            volatility: volatility(values),
            timestamp,
        }
    }
}
