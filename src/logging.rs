//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber. Reads per-target levels from `ATLAS_LOG`
/// (e.g. `ATLAS_LOG=code_atlas=debug`) and falls back to `code_atlas=warn`.
/// Output goes to stderr so stdout stays parseable.
///
/// Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("ATLAS_LOG")
            .unwrap_or_else(|_| EnvFilter::new("code_atlas=warn"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
