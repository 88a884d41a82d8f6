use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use crate::monitor::PriceMonitor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

struct SchedulerInner {
    state: SchedulerState,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

/// Drives `PriceMonitor::run_cycle` at a fixed interval.
///
/// Owns the loop's join handle; `stop` waits for it, so an in-flight cycle
/// always completes before the final flush.
pub struct Scheduler {
    monitor: Arc<PriceMonitor>,
    interval: Duration,
    flush_every: u64,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    pub fn new(monitor: Arc<PriceMonitor>) -> Self {
        let interval = monitor.config().update_interval();
        let flush_every = monitor.config().flush_every.max(1);

        Scheduler {
            monitor,
            interval,
            flush_every,
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Idle,
                shutdown: None,
                handle: None,
            }),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SchedulerState::Idle {
            tracing::warn!("Price monitor is already {:?}; start ignored", inner.state);
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.monitor.clone(),
            self.interval,
            self.flush_every,
            shutdown_rx,
        ));

        inner.shutdown = Some(shutdown_tx);
        inner.handle = Some(handle);
        inner.state = SchedulerState::Running;
        tracing::info!("Price monitoring started with {:?} interval", self.interval);
    }

    pub async fn stop(&self) {
        let (shutdown, handle) = {
            let mut inner = self.inner.lock().await;
            if inner.state != SchedulerState::Running {
                tracing::debug!("Price monitor not running; stop ignored");
                return;
            }
            inner.state = SchedulerState::Stopping;
            (inner.shutdown.take(), inner.handle.take())
        };

        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Price monitor loop ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.monitor.flush().await {
            tracing::error!("Final history flush failed: {}", e);
        }

        self.inner.lock().await.state = SchedulerState::Idle;
        tracing::info!("Price monitoring stopped");
    }
}

async fn run_loop(
    monitor: Arc<PriceMonitor>,
    period: Duration,
    flush_every: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            biased;
            // A dropped sender also ends the loop
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        // Failure is already logged and counted; next tick retries
        if monitor.run_cycle().await.is_err() {
            continue;
        }

        cycles += 1;
        if cycles % flush_every == 0 {
            if let Err(e) = monitor.flush().await {
                tracing::warn!("Periodic history flush failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::history::persistence::DurabilitySink;
    use crate::history::persistence::testing::MemorySink;
    use crate::monitor::testing::{panic_once_monitor, seeded_monitor};

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            update_interval_secs: 3600,
            flush_every: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stop_while_idle_is_noop() {
        let sink = Arc::new(MemorySink::default());
        let monitor = Arc::new(seeded_monitor(fast_config(), Some(sink.clone())));
        let scheduler = Scheduler::new(monitor);

        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
        assert_eq!(sink.persist_count(), 0);
    }

    #[tokio::test]
    async fn start_twice_runs_one_loop() {
        let monitor = Arc::new(seeded_monitor(fast_config(), None));
        let scheduler = Scheduler::new(monitor.clone());

        scheduler.start().await;
        scheduler.start().await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);

        // First tick fires immediately; the next is an hour away
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let info = monitor.tracker_info(scheduler.state().await).await;
        assert_eq!(info.retained_points, 1);
        assert_eq!(info.scheduler_state, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn stop_flushes_history() {
        let sink = Arc::new(MemorySink::default());
        let monitor = Arc::new(seeded_monitor(fast_config(), Some(sink.clone() as Arc<dyn DurabilitySink>)));
        let scheduler = Scheduler::new(monitor);

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert_eq!(sink.persist_count(), 1);
        assert_eq!(sink.stored().await.prices.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_every_n_cycles() {
        let sink = Arc::new(MemorySink::default());
        let config = MonitorConfig { update_interval_secs: 10, ..fast_config() };
        let monitor = Arc::new(seeded_monitor(config, Some(sink.clone() as Arc<dyn DurabilitySink>)));
        let scheduler = Scheduler::new(monitor.clone());

        scheduler.start().await;
        // Ticks at 0s, 10s, 20s, 30s
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(monitor.tracker_info(SchedulerState::Running).await.retained_points, 4);
        assert_eq!(sink.persist_count(), 2);

        scheduler.stop().await;
        assert_eq!(sink.persist_count(), 3);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn restarts_after_stop() {
        let monitor = Arc::new(seeded_monitor(fast_config(), None));
        let scheduler = Scheduler::new(monitor.clone());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert_eq!(monitor.tracker_info(SchedulerState::Idle).await.retained_points, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_does_not_end_the_loop() {
        let config = MonitorConfig { update_interval_secs: 10, ..fast_config() };
        let monitor = Arc::new(panic_once_monitor(config));
        let scheduler = Scheduler::new(monitor.clone());

        scheduler.start().await;
        // Ticks at 0s (fetch panics), 10s and 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);

        let info = monitor.tracker_info(SchedulerState::Running).await;
        assert_eq!(info.retained_points, 2);
        assert_eq!(monitor.current_price().await.unwrap().value(), 0.1);

        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }
}
