use std::collections::VecDeque;
use std::sync::Arc;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::Instrument;
use crate::analytics::indicators::IndicatorSnapshot;
use crate::analytics::statistics::PriceStatistics;
use crate::broadcast::events::StreamEvent;
use crate::broadcast::{BroadcastReport, Broadcaster, SubscriberHandle, SubscriberTransport};
use crate::config::{AppConfig, MonitorConfig};
use crate::error::{Error, Result};
use crate::history::persistence::{DurabilitySink, JsonFileSink, PersistedHistory};
use crate::history::store::{HistoryPage, HistoryQuery, TimeSeriesStore};
use crate::observability::metrics::{CYCLE_LATENCY, LATEST_PRICE, PRICE_CYCLES, PRICE_CYCLE_FAILURES};
use crate::observability::tracing::trace_price_cycle;
use crate::price_infra::alerts::{AlertMonitor, AlertRule, PriceAlert};
use crate::price_infra::build_coordinator;
use crate::price_infra::coordinator::FallbackCoordinator;
use crate::scheduler::SchedulerState;
use crate::types::price::PricePoint;

/// Upper bound on the statistics window, one week.
pub const MAX_STATISTICS_HOURS: u32 = 168;

#[derive(Clone, Debug, Serialize)]
pub struct TrackerInfo {
    pub retained_points: usize,
    pub max_retained: usize,
    pub update_interval_secs: u64,
    pub scheduler_state: SchedulerState,
    pub next_seed_index: usize,
    pub subscribers: usize,
    pub sources: Vec<String>,
}

/// The price tracking service.
///
/// Owns the whole pipeline: the coordinator that acquires prices, the store
/// that retains them, the most recent indicator rows and the subscriber set.
/// Constructed once at startup and shared behind an `Arc` with the scheduler
/// and the API layer.
///
/// Cycles are serialized: a forced update waits for a scheduled cycle that
/// is already running, and vice versa. Reads never wait on a cycle.
pub struct PriceMonitor {
    config: MonitorConfig,
    coordinator: Arc<FallbackCoordinator>,
    store: TimeSeriesStore,
    indicators: RwLock<VecDeque<IndicatorSnapshot>>,
    alerts: Mutex<AlertMonitor>,
    broadcaster: Broadcaster,
    sink: Option<Arc<dyn DurabilitySink>>,
    cycle_lock: Mutex<()>,
}

impl PriceMonitor {
    pub fn new(
        config: MonitorConfig,
        coordinator: FallbackCoordinator,
        sink: Option<Arc<dyn DurabilitySink>>,
        rules: Vec<AlertRule>,
    ) -> Result<Self> {
        let store = TimeSeriesStore::new(config.max_retained)?;
        let broadcaster = Broadcaster::new(config.send_timeout());

        Ok(PriceMonitor {
            config,
            coordinator: Arc::new(coordinator),
            store,
            indicators: RwLock::new(VecDeque::new()),
            alerts: Mutex::new(AlertMonitor::new(rules)),
            broadcaster,
            sink,
            cycle_lock: Mutex::new(()),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let coordinator = build_coordinator(&config.sources)?;
        let sink = config.persistence.history_path.as_ref().map(|path| {
            Arc::new(JsonFileSink::new(path)) as Arc<dyn DurabilitySink>
        });

        tracing::info!(
            "Price monitor configured: interval={}s, max_retained={}, sources={:?}",
            config.monitor.update_interval_secs,
            config.monitor.max_retained,
            coordinator.priority()
        );
        Self::new(config.monitor.clone(), coordinator, sink, config.alerts.clone())
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// One scheduled cycle: fetch, append, derive, broadcast.
    pub async fn run_cycle(&self) -> Result<PricePoint> {
        self.cycle("scheduled").await
    }

    /// Out-of-cycle fetch, append and broadcast.
    pub async fn force_update(&self) -> Result<PricePoint> {
        tracing::info!("Forced price update requested");
        self.cycle("manual").await
    }

    async fn cycle(&self, trigger: &'static str) -> Result<PricePoint> {
        let _guard = self.cycle_lock.lock().await;
        let timer = CYCLE_LATENCY.start_timer();

        let result = self.cycle_inner().instrument(trace_price_cycle(trigger)).await;
        timer.observe_duration();

        match &result {
            Ok(_) => PRICE_CYCLES.inc(),
            Err(e) => {
                PRICE_CYCLE_FAILURES.inc();
                tracing::error!("Price cycle ({}) failed: {}", trigger, e);
            }
        }
        result
    }

    async fn cycle_inner(&self) -> Result<PricePoint> {
        // Source I/O runs on its own task, off the caller's path
        let coordinator = self.coordinator.clone();
        let point = tokio::spawn(async move { coordinator.fetch().await })
            .await
            .map_err(|e| Error::transport("coordinator", format!("fetch task aborted: {}", e)))?;

        self.store.append(point.clone()).await;
        LATEST_PRICE.set(point.value());
        tracing::info!("Price updated: {:.6} from {}", point.value(), point.source_tier().source_name());

        if self.store.len().await >= self.config.min_indicator_points {
            let values = self.store.trailing_values(self.config.indicator_window).await;
            let snapshot = IndicatorSnapshot::compute(&values, Utc::now());
            self.push_indicators(snapshot).await;
        }

        let fired = self.alerts.lock().await.check(&point);

        let report = self.broadcaster.broadcast(&StreamEvent::PriceUpdate(point.clone())).await;
        if report.dropped > 0 {
            tracing::warn!("Price update dropped {} subscriber(s)", report.dropped);
        }
        for alert in fired {
            self.broadcast_alert(alert).await;
        }

        Ok(point)
    }

    async fn push_indicators(&self, snapshot: IndicatorSnapshot) {
        let mut rows = self.indicators.write().await;
        rows.push_back(snapshot);
        while rows.len() > self.config.max_retained {
            rows.pop_front();
        }
    }

    pub async fn current_price(&self) -> Option<PricePoint> {
        self.store.latest().await
    }

    pub async fn history(&self, query: &HistoryQuery) -> HistoryPage {
        self.store.query(query).await
    }

    /// Statistics over the last `window_hours`; `None` when the window is empty.
    pub async fn statistics(&self, window_hours: u32) -> Result<Option<PriceStatistics>> {
        if window_hours == 0 || window_hours > MAX_STATISTICS_HOURS {
            return Err(Error::Validation(format!(
                "window_hours must be between 1 and {}, got {}",
                MAX_STATISTICS_HOURS, window_hours
            )));
        }

        let now = Utc::now();
        let cutoff = now - ChronoDuration::hours(i64::from(window_hours));
        let window = self.store.since(cutoff).await;
        Ok(PriceStatistics::from_window(&window, now))
    }

    /// Latest indicator row, absent until enough points were collected.
    pub async fn indicators(&self) -> Option<IndicatorSnapshot> {
        self.indicators.read().await.back().cloned()
    }

    /// Registers a subscriber and replays the latest point to it.
    ///
    /// Holds the cycle lock so no cycle can append and broadcast between
    /// reading the latest point and registering; a cycle waits at most one
    /// catch-up send timeout.
    pub async fn subscribe(&self, transport: Arc<dyn SubscriberTransport>) -> Result<SubscriberHandle> {
        let _guard = self.cycle_lock.lock().await;
        let latest = self.store.latest().await;
        self.broadcaster.subscribe(transport, latest).await
    }

    pub async fn unsubscribe(&self, handle: SubscriberHandle) -> bool {
        self.broadcaster.unsubscribe(handle).await
    }

    pub async fn broadcast_alert(&self, alert: PriceAlert) -> BroadcastReport {
        self.broadcaster.broadcast(&StreamEvent::Alert(alert)).await
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Writes the retained history to the sink, if one is configured.
    pub async fn flush(&self) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        let history = PersistedHistory {
            prices: self.store.snapshot().await,
            indicators: self.indicators.read().await.iter().cloned().collect(),
        };
        sink.persist(&history).await?;
        tracing::info!("Flushed {} price records", history.prices.len());
        Ok(())
    }

    /// Loads persisted history into the store. Returns the number of points kept.
    pub async fn restore(&self) -> Result<usize> {
        let Some(sink) = &self.sink else {
            return Ok(0);
        };

        let PersistedHistory { prices, indicators } = sink.load().await?;
        let kept = self.store.restore(prices).await;

        {
            let mut rows = self.indicators.write().await;
            let skip = indicators.len().saturating_sub(self.config.max_retained);
            *rows = indicators.into_iter().skip(skip).collect();
        }

        let latest = self.store.latest().await;
        if let Some(point) = &latest {
            LATEST_PRICE.set(point.value());
        }
        self.alerts.lock().await.prime(latest.as_ref());

        tracing::info!("Restored {} price records from history", kept);
        Ok(kept)
    }

    pub async fn tracker_info(&self, scheduler_state: SchedulerState) -> TrackerInfo {
        TrackerInfo {
            retained_points: self.store.len().await,
            max_retained: self.store.max_retained(),
            update_interval_secs: self.config.update_interval_secs,
            scheduler_state,
            next_seed_index: self.coordinator.floor().next_index(),
            subscribers: self.broadcaster.subscriber_count(),
            sources: self.coordinator.priority(),
        }
    }

    pub fn source_priority(&self) -> Vec<String> {
        self.coordinator.priority()
    }
}
