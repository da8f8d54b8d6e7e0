use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "congregation_dashboard=info";

static INIT: Once = Once::new();

/// Installs the stderr subscriber. `RUST_LOG` wins over the defaults;
/// `verbose` lowers the default to debug. Later calls are no-ops.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let default_filter = if verbose {
            "congregation_dashboard=debug"
        } else {
            DEFAULT_LOG_FILTER
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    });
}
