use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "exo=debug"
    } else if quiet {
        "exo=error"
    } else {
        "exo=warn"
    }
}

/// Installs the stderr subscriber. Later calls are no-ops.
pub fn init(verbose: bool, quiet: bool) {
    let filter = default_filter(verbose, quiet);

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
