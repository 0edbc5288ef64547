use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise everything at `info` and above is
/// logged. `log_format` is `text` or `compact`; anything else falls back to
/// `text`.
pub fn init_tracing(service_name: &str, log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match log_format {
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        "text" => registry.with(tracing_subscriber::fmt::layer()).init(),
        other => {
            registry.with(tracing_subscriber::fmt::layer()).init();
            tracing::warn!(log_format = other, "unknown log format, using text");
        }
    }

    tracing::info!(service_name, log_format, "tracing initialized");
}
