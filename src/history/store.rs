use std::collections::VecDeque;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use crate::error::{Error, Result};
use crate::types::price::PricePoint;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Clone, Debug)]
pub struct HistoryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
    pub order: SortOrder,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        HistoryQuery {
            start: None,
            end: None,
            limit: 100,
            offset: 0,
            order: SortOrder::NewestFirst,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryPage {
    pub points: Vec<PricePoint>,
    pub has_more: bool,
}

/// Bounded, append-only price history in acquisition order.
///
/// Holds at most `max_retained` points; appending past the cap evicts the
/// oldest first. Every append happens under the write lock, so readers see
/// either all of it or none of it.
pub struct TimeSeriesStore {
    points: RwLock<VecDeque<PricePoint>>,
    max_retained: usize,
}

impl TimeSeriesStore {
    pub fn new(max_retained: usize) -> Result<Self> {
        if max_retained == 0 {
            return Err(Error::Validation("max_retained must be positive".into()));
        }

        Ok(TimeSeriesStore {
            points: RwLock::new(VecDeque::with_capacity(max_retained.min(4096))),
            max_retained,
        })
    }

    /// Appends and returns how many old points were evicted.
    pub async fn append(&self, point: PricePoint) -> usize {
        let mut points = self.points.write().await;
        points.push_back(point);

        let mut evicted = 0;
        while points.len() > self.max_retained {
            points.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!("Evicted {} old price records", evicted);
        }
        evicted
    }

    pub async fn latest(&self) -> Option<PricePoint> {
        self.points.read().await.back().cloned()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    /// Time-bounded (inclusive) page. Short or empty pages are not an error.
    pub async fn query(&self, query: &HistoryQuery) -> HistoryPage {
        let points = self.points.read().await;
        let in_range = |p: &&PricePoint| {
            query.start.is_none_or(|s| p.timestamp() >= s)
                && query.end.is_none_or(|e| p.timestamp() <= e)
        };

        let mut page: Vec<PricePoint> = match query.order {
            SortOrder::NewestFirst => points.iter().rev()
                .filter(in_range)
                .skip(query.offset)
                .take(query.limit.saturating_add(1))
                .cloned()
                .collect(),
            SortOrder::OldestFirst => points.iter()
                .filter(in_range)
                .skip(query.offset)
                .take(query.limit.saturating_add(1))
                .cloned()
                .collect(),
        };

        let has_more = page.len() > query.limit;
        page.truncate(query.limit);
        HistoryPage { points: page, has_more }
    }

    /// Points at or after `cutoff`, oldest first.
    pub async fn since(&self, cutoff: DateTime<Utc>) -> Vec<PricePoint> {
        let points = self.points.read().await;
        points.iter()
            .filter(|p| p.timestamp() >= cutoff)
            .cloned()
            .collect()
    }

    /// Values of the newest `n` points, oldest first.
    pub async fn trailing_values(&self, n: usize) -> Vec<f64> {
        let points = self.points.read().await;
        let skip = points.len().saturating_sub(n);
        points.iter().skip(skip).map(|p| p.value()).collect()
    }

    pub async fn snapshot(&self) -> Vec<PricePoint> {
        self.points.read().await.iter().cloned().collect()
    }

    /// Replaces the contents, keeping only the newest `max_retained` points.
    pub async fn restore(&self, restored: Vec<PricePoint>) -> usize {
        let skip = restored.len().saturating_sub(self.max_retained);
        let mut points = self.points.write().await;
        points.clear();
        points.extend(restored.into_iter().skip(skip));
        points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use crate::types::price::SourceTier;

    fn point(value: f64) -> PricePoint {
        PricePoint::now(value, SourceTier::Fallback, None).unwrap()
    }

    fn point_at(value: f64, at: DateTime<Utc>) -> PricePoint {
        PricePoint::new(value, at, SourceTier::Fallback, None).unwrap()
    }

    async fn values(store: &TimeSeriesStore) -> Vec<f64> {
        store.snapshot().await.iter().map(|p| p.value()).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(TimeSeriesStore::new(0), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn evicts_oldest_first() {
        let store = TimeSeriesStore::new(3).unwrap();
        for v in [1.0, 2.0, 3.0] {
            assert_eq!(store.append(point(v)).await, 0);
        }
        assert_eq!(store.append(point(4.0)).await, 1);

        assert_eq!(values(&store).await, vec![2.0, 3.0, 4.0]);
        assert_eq!(store.latest().await.unwrap().value(), 4.0);
    }

    #[tokio::test]
    async fn empty_store_has_no_latest() {
        let store = TimeSeriesStore::new(10).unwrap();
        assert!(store.latest().await.is_none());
        assert_eq!(store.len().await, 0);
        let page = store.query(&HistoryQuery::default()).await;
        assert!(page.points.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn query_paginates_newest_first() {
        let store = TimeSeriesStore::new(100).unwrap();
        for v in 1..=10 {
            store.append(point(v as f64)).await;
        }

        let page = store.query(&HistoryQuery { limit: 3, offset: 2, ..Default::default() }).await;
        let got: Vec<f64> = page.points.iter().map(|p| p.value()).collect();
        assert_eq!(got, vec![8.0, 7.0, 6.0]);
        assert!(page.has_more);

        let tail = store.query(&HistoryQuery { limit: 5, offset: 7, ..Default::default() }).await;
        assert_eq!(tail.points.len(), 3);
        assert!(!tail.has_more);
    }

    #[tokio::test]
    async fn query_applies_inclusive_time_bounds() {
        let store = TimeSeriesStore::new(100).unwrap();
        let base = Utc::now();
        for i in 0..5 {
            store.append(point_at(1.0 + i as f64, base + Duration::minutes(i))).await;
        }

        let page = store.query(&HistoryQuery {
            start: Some(base + Duration::minutes(1)),
            end: Some(base + Duration::minutes(3)),
            order: SortOrder::OldestFirst,
            ..Default::default()
        }).await;
        let got: Vec<f64> = page.points.iter().map(|p| p.value()).collect();
        assert_eq!(got, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn trailing_values_are_oldest_first() {
        let store = TimeSeriesStore::new(100).unwrap();
        for v in 1..=6 {
            store.append(point(v as f64)).await;
        }
        assert_eq!(store.trailing_values(3).await, vec![4.0, 5.0, 6.0]);
        assert_eq!(store.trailing_values(50).await.len(), 6);
    }

    #[tokio::test]
    async fn restore_reapplies_retention() {
        let store = TimeSeriesStore::new(2).unwrap();
        let kept = store.restore(vec![point(1.0), point(2.0), point(3.0)]).await;
        assert_eq!(kept, 2);
        assert_eq!(values(&store).await, vec![2.0, 3.0]);
    }

    proptest! {
        #[test]
        fn holds_the_newest_min_n_k(
            prices in prop::collection::vec(0.001f64..1000.0, 0..64),
            cap in 1usize..16,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let held = rt.block_on(async {
                let store = TimeSeriesStore::new(cap).unwrap();
                for p in &prices {
                    store.append(point(*p)).await;
                }
                values(&store).await
            });

            let expected: Vec<f64> = prices[prices.len().saturating_sub(cap)..].to_vec();
            prop_assert_eq!(held.len(), prices.len().min(cap));
            prop_assert_eq!(held, expected);
        }
    }
}
