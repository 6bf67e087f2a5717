// Prometheus metrics for quota enforcement
//
// Tracks:
// - Quota check outcomes per target (counter)
// - Reporter latency per target (histogram)
// - Reporter failures per target (counter)
// - Registered reporters (gauge)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref QUOTA_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_checks_total", "Total number of quota checks"),
        &["target", "result"]
    ).expect("Failed to create quota checks metric");

    pub static ref QUOTA_LISTINGS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_listings_total", "Total number of quota listings"),
        &["scope", "status"]
    ).expect("Failed to create quota listings metric");

    pub static ref REPORTER_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("quota_reporter_duration_seconds", "Usage reporter latency in seconds"),
        &["target"]
    ).expect("Failed to create reporter duration metric");

    pub static ref REPORTER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_reporter_errors_total", "Total number of usage reporter failures"),
        &["target"]
    ).expect("Failed to create reporter errors metric");

    pub static ref REGISTERED_REPORTERS: IntGauge = IntGauge::new(
        "quota_registered_reporters",
        "Number of registered usage reporters"
    ).expect("Failed to create registered reporters metric");
}

static INIT: Once = Once::new();

/// Register all quota metrics with [`REGISTRY`]; repeated calls are no-ops
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(QUOTA_CHECKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_LISTINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REPORTER_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(REPORTER_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTERED_REPORTERS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_check_metrics_gathered() {
        init().unwrap();

        QUOTA_CHECKS_TOTAL
            .with_label_values(&["dashboard", "reached"])
            .inc();
        REPORTER_DURATION_SECONDS
            .with_label_values(&["dashboard"])
            .observe(0.01);

        let text = gather_metrics().unwrap();
        assert!(text.contains("quota_checks_total"));
        assert!(text.contains("quota_reporter_duration_seconds"));
    }
}
