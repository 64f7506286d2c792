//! Shared plumbing for mimic: wire protocol, configuration, status, logging, error types.
//!
//! Every other crate in the workspace speaks to the host through the types in
//! [`protocol`] and reports user-visible progress through a [`StatusBoard`].

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod status;

pub use config::{parse_ice_server_list, IceServerConfig, OfferPolicy, SurfaceConfig};
pub use error::{Error, Result};
pub use protocol::*;
pub use status::StatusBoard;

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable and
/// defaults to `info`. Output goes to stderr: stdout is reserved for the host
/// channel when the surface runs as a child process.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a specific default level.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
