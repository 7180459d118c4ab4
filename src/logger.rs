//! Logging configuration module

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter: debug when verbose, info otherwise
fn default_directive(verbose: bool) -> &'static str {
    if verbose || std::env::var("VERBOSE").is_ok() {
        "debug"
    } else {
        "info"
    }
}

/// Initialize logging. `RUST_LOG` overrides the default filter. Thread
/// names are shown when robots are stepped on parallel tasks.
pub fn init(verbose: bool, parallel: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(parallel)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}
