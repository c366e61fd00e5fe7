//! Subscriber setup for the CLI
//!
//! The library crates log through the `log` facade; `tracing-subscriber`
//! picks those records up through its `tracing-log` bridge and writes them to
//! stderr. `RUST_LOG` overrides the level chosen by `--verbose`.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,fg_core=debug,fg_rules=debug,fg_background=debug,fg_cli=debug"
    } else {
        "warn"
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(default_directive(verbose)).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .compact();

    let _ = tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(layer)
        .try_init();
}
