//! Switchyard command-line front end.
//!
//! Re-exports the workspace crates and hosts the pieces only the CLI
//! needs: an HTTP completion model and a console approval prompt.

pub mod approval;
pub mod model;

/// Re-export for convenience.
pub use switchyard_config as config;
pub use switchyard_core as core;
/// Re-export for convenience.
pub use switchyard_protocol as protocol;
pub use switchyard_providers as providers;
pub use switchyard_rules as rules;

/// Wire `env_logger` with millisecond timestamps; `RUST_LOG` controls the level.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
