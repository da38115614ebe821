use lazy_static::lazy_static;
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CONTROLLER_REQUESTS_TOTAL: IntCounterVec = {
        let counter = IntCounterVec::new(
            opts!(
                "launcher_controller_requests_total",
                "Requests issued to the framework controller by operation and outcome."
            ),
            &["operation", "outcome"],
        )
        .expect("metric definition is valid");
        REGISTRY
            .register(Box::new(counter.clone()))
            .expect("metric is registered once");
        counter
    };
}

pub fn record_request(operation: &str, outcome: &str) {
    CONTROLLER_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
