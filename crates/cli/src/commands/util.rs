use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install the stderr log subscriber.
///
/// Reads the `TAINT_QUERY_LOG` filter (e.g. `taint_query_core=debug`) and
/// falls back to `info`. Stdout carries patched source, so logs never go there.
/// Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env("TAINT_QUERY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

        // A subscriber may already be installed by an embedding host.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}
