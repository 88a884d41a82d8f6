use std::sync::Arc;
use crate::observability::metrics::{FETCHES_BY_TIER, SOURCE_FAILURES};
use crate::price_infra::connectors::PriceSource;
use crate::price_infra::connectors::synthetic::SyntheticSource;
use crate::types::price::{PricePoint, SourceTier};

/// Tries fallible sources strictly in tier order, then the synthetic floor.
pub struct FallbackCoordinator {
    sources: Vec<Arc<dyn PriceSource>>,
    floor: Arc<SyntheticSource>,
}

impl FallbackCoordinator {
    pub fn new(mut sources: Vec<Arc<dyn PriceSource>>, floor: Arc<SyntheticSource>) -> Self {
        // Stable: sources sharing a tier keep their configured order
        sources.sort_by_key(|s| s.tier());
        FallbackCoordinator { sources, floor }
    }

    /// Never fails: adapter errors are logged and the next tier is tried.
    pub async fn fetch(&self) -> PricePoint {
        for source in &self.sources {
            match source.fetch().await {
                Ok(point) => {
                    let point = point.retagged(source.tier());
                    FETCHES_BY_TIER.with_label_values(&[point.source_tier().as_str()]).inc();
                    return point;
                }
                Err(e) => {
                    SOURCE_FAILURES.with_label_values(&[source.source_id()]).inc();
                    tracing::warn!("Price source {} ({}) failed: {}", source.source_id(), source.tier(), e);
                }
            }
        }

        FETCHES_BY_TIER.with_label_values(&[SourceTier::Fallback.as_str()]).inc();
        self.floor.next_point()
    }

    /// Source names in the order they are tried, floor last.
    pub fn priority(&self) -> Vec<String> {
        self.sources.iter()
            .map(|s| s.source_id().to_string())
            .chain(std::iter::once(self.floor.source_id().to_string()))
            .collect()
    }

    pub fn floor(&self) -> &SyntheticSource {
        &self.floor
    }
}
