//! Diagnostic logging setup for hosts embedding the vault
//!
//! Events go to stderr without ANSI colours. Nothing secret is ever logged:
//! no passwords, keys, plaintext or blob contents.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` (for example the
/// `log_filter` value from [`crate::VaultConfig`]). Returns `false` if a
/// subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .try_init()
        .is_ok()
}
