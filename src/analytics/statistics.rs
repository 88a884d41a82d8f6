use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::types::price::PricePoint;

/// Summary of a historical window, computed on demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub current_price: f64,
    pub high: f64,
    pub low: f64,
    pub absolute_change: f64,
    pub percent_change: f64,
    pub average: f64,
    pub sample_count: usize,
    pub computed_at: DateTime<Utc>,
}

impl PriceStatistics {
    /// `window` is ordered oldest to newest. `None` when it is empty.
    pub fn from_window(window: &[PricePoint], computed_at: DateTime<Utc>) -> Option<Self> {
        let values: Vec<f64> = window.iter().map(|p| p.value()).collect();
        Self::from_values(&values, computed_at)
    }

    pub fn from_values(values: &[f64], computed_at: DateTime<Utc>) -> Option<Self> {
        let (&oldest, &newest) = (values.first()?, values.last()?);

        let high = values.iter().copied().fold(f64::MIN, f64::max);
        let low = values.iter().copied().fold(f64::MAX, f64::min);
        let average = values.iter().sum::<f64>() / values.len() as f64;

        let absolute_change = if values.len() > 1 { newest - oldest } else { 0.0 };
        let percent_change = if values.len() > 1 && oldest > 0.0 {
            absolute_change / oldest * 100.0
        } else {
            0.0
        };

        Some(PriceStatistics {
            current_price: newest,
            high,
            low,
            absolute_change,
            percent_change,
            average,
            sample_count: values.len(),
            computed_at,
        })
    }
}
