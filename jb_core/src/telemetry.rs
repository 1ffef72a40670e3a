use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing - safe to call multiple times.
///
/// `json = true` selects the structured JSON layer (production-style log
/// shipping); otherwise a human-readable pretty layer is used.
pub fn init_tracing(json: bool, level: &str, service: &str) {
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

        if json {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().json())
                .with(env_filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(env_filter)
                .init();
        }

        tracing::info!(service = %service, "tracing initialized");
    });
}
