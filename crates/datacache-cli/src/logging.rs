// SPDX-License-Identifier: Apache-2.0

use crate::LogFlags;
use datacache_core::{non_empty_env, ENV_DATACACHE_LOG_LEVEL};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Diagnostics go to stderr so stdout stays parseable.
///
/// Level precedence: `--trace`, `--verbose`, `--quiet`, then
/// `DATACACHE_LOG_LEVEL`, then `RUST_LOG`, then `info`.
pub(crate) fn init(flags: LogFlags) {
    let filter = match flag_level(flags) {
        Some(level) => EnvFilter::new(level),
        None => non_empty_env(ENV_DATACACHE_LOG_LEVEL)
            .and_then(|v| EnvFilter::try_new(v).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info")),
    };
    let result = if flags.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialised: {e}");
    }
}

fn flag_level(flags: LogFlags) -> Option<&'static str> {
    if flags.trace {
        Some("trace")
    } else if flags.verbose > 0 {
        Some("debug")
    } else if flags.quiet {
        Some("error")
    } else {
        None
    }
}
