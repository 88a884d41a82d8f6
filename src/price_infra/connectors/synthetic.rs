use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use crate::price_infra::connectors::PriceSource;
use crate::error::{Error, Result};
use crate::types::price::{PricePoint, SourceTier};

pub const DEFAULT_SEED_PRICES: [f64; 8] = [0.095, 0.096, 0.094, 0.093, 0.092, 0.097, 0.098, 0.091];

/// Last-resort source. Cycles through fixed seed prices and never fails.
pub struct SyntheticSource {
    seeds: Vec<f64>,
    index: AtomicUsize,
}

impl SyntheticSource {
    pub fn new(seeds: Vec<f64>) -> Result<Self> {
        if seeds.is_empty() {
            return Err(Error::Validation("synthetic source needs at least one seed price".into()));
        }
        if let Some(bad) = seeds.iter().find(|p| !p.is_finite() || **p <= 0.0) {
            return Err(Error::Validation(format!("seed price must be positive, got {}", bad)));
        }

        Ok(SyntheticSource {
            seeds,
            index: AtomicUsize::new(0),
        })
    }

    pub fn next_point(&self) -> PricePoint {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let value = self.seeds[i % self.seeds.len()];
        tracing::info!("Using hardcoded test price: {:.6}", value);

        PricePoint::from_checked(value, SourceTier::Fallback)
    }

    /// Position of the next seed that will be emitted.
    pub fn next_index(&self) -> usize {
        self.index.load(Ordering::SeqCst) % self.seeds.len()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        SyntheticSource {
            seeds: DEFAULT_SEED_PRICES.to_vec(),
            index: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PriceSource for SyntheticSource {
    async fn fetch(&self) -> Result<PricePoint> {
        Ok(self.next_point())
    }

    fn tier(&self) -> SourceTier {
        SourceTier::Fallback
    }

    fn source_id(&self) -> &str {
        "hardcoded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_seeds() {
        let source = SyntheticSource::new(vec![0.1, 0.2, 0.3]).unwrap();
        let values: Vec<f64> = (0..5).map(|_| source.next_point().value()).collect();
        assert_eq!(values, vec![0.1, 0.2, 0.3, 0.1, 0.2]);
        assert_eq!(source.next_index(), 2);
    }

    #[test]
    fn default_starts_at_first_seed() {
        let source = SyntheticSource::default();
        let point = source.next_point();
        assert_eq!(point.value(), 0.095);
        assert_eq!(point.source_tier(), SourceTier::Fallback);
    }

    #[test]
    fn rejects_bad_seeds() {
        assert!(SyntheticSource::new(vec![]).is_err());
        assert!(SyntheticSource::new(vec![0.1, 0.0]).is_err());
    }
}
