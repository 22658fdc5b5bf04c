use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for a service binary.
///
/// Level comes from `RUST_LOG` (default `info`). `LOG_FORMAT=json` switches
/// to one JSON object per line.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true);

    if json {
        builder.json().with_current_span(true).init();
    } else {
        builder.with_thread_ids(true).init();
    }

    tracing::info!(service, "{} booting...", service);
}
