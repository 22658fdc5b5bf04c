use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "runway_submissions_total",
        "Submissions by language and acceptance outcome",
        &["language", "outcome"]
    )
    .expect("metric registers once");
}

pub fn accepted(language: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[language, "accepted"]).inc();
}

pub fn rejected(language: &str, reason: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[language, reason]).inc();
}

pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
