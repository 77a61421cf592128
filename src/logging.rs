//! Logging setup.
//!
//! Everything is written to stderr so the managed process owns stdout. The
//! default level is `info`; quiet mode drops to `error`. `RUST_LOG` takes
//! precedence over both:
//! ```bash
//! RUST_LOG=debug gomon ./app
//! ```

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter directive for the requested verbosity.
pub fn default_filter(quiet: bool) -> &'static str {
    if quiet { "error" } else { "info" }
}

/// Initialize logging. Safe to call multiple times (only first call takes effect).
pub fn init(quiet: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(default_filter(quiet))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    });
}
