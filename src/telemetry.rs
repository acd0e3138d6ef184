//! Logging setup for applications embedding the crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber is left
//! to the host application, which can call [`init_tracing`] or bring its own.

use tracing::Level;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

/// Level for a `-v` style verbosity count: 0 is info, 1 debug, more is trace.
pub fn level_for(verbosity: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Builds the filter: `RUST_LOG` first, then the verbosity level, with the CDP
/// client kept at warn since it logs every protocol message.
pub fn env_filter(verbosity: u8, quiet: bool) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(level_for(verbosity, quiet).into());
    if let Ok(directive) = "chromiumoxide=warn".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    filter
}

/// Installs a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, e.g. by the host or an
/// earlier call.
pub fn init_tracing(verbosity: u8, quiet: bool) -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(env_filter(verbosity, quiet))
        .try_init()
        .is_ok()
}
