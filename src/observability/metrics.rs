use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Cycle metrics
    pub static ref PRICE_CYCLES: IntCounter = IntCounter::new(
        "price_cycles_total",
        "Total number of completed price cycles"
    ).expect("valid metric definition");

    pub static ref PRICE_CYCLE_FAILURES: IntCounter = IntCounter::new(
        "price_cycle_failures_total",
        "Total number of price cycles that failed"
    ).expect("valid metric definition");

    pub static ref CYCLE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "price_cycle_latency_seconds",
            "Fetch, persist, derive and broadcast latency"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0])
    ).expect("valid metric definition");

    // Source metrics
    pub static ref FETCHES_BY_TIER: IntCounterVec = IntCounterVec::new(
        Opts::new("price_fetches_total", "Prices acquired, by source tier"),
        &["tier"]
    ).expect("valid metric definition");

    pub static ref SOURCE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("price_source_failures_total", "Failed fetches, by source"),
        &["source"]
    ).expect("valid metric definition");

    pub static ref LATEST_PRICE: Gauge = Gauge::new(
        "price_latest",
        "Most recently acquired price"
    ).expect("valid metric definition");

    // Subscriber metrics
    pub static ref ACTIVE_SUBSCRIBERS: IntGauge = IntGauge::new(
        "stream_subscribers",
        "Currently connected stream subscribers"
    ).expect("valid metric definition");

    pub static ref DELIVERY_FAILURES: IntCounter = IntCounter::new(
        "stream_delivery_failures_total",
        "Subscribers dropped after a failed send"
    ).expect("valid metric definition");
}

pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PRICE_CYCLES.clone()),
        Box::new(PRICE_CYCLE_FAILURES.clone()),
        Box::new(CYCLE_LATENCY.clone()),
        Box::new(FETCHES_BY_TIER.clone()),
        Box::new(SOURCE_FAILURES.clone()),
        Box::new(LATEST_PRICE.clone()),
        Box::new(ACTIVE_SUBSCRIBERS.clone()),
        Box::new(DELIVERY_FAILURES.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(Error::ConfigError(format!("metric registration failed: {}", e))),
        }
    }
    Ok(())
}

/// Prometheus text exposition of the registry.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::SerializationError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| Error::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_repeatable() {
        register_metrics().unwrap();
        register_metrics().unwrap();

        PRICE_CYCLES.inc();
        let text = gather_text().unwrap();
        assert!(text.contains("price_cycles_total"));
    }
}
