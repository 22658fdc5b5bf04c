use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "runway_executions_total",
        "Executions by language and outcome",
        &["language", "outcome"]
    )
    .expect("metric registers once");
    pub static ref EXECUTION_DURATION: HistogramVec = register_histogram_vec!(
        "runway_execution_duration_seconds",
        "Wall-clock time of finished executions",
        &["language"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric registers once");
    pub static ref BACKENDS_BUSY: IntGauge =
        register_int_gauge!("runway_backends_busy", "Executor backends currently leased")
            .expect("metric registers once");
}

/// Prometheus text exposition of the default registry
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
