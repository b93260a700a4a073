//! Chat Socket - Main Library
//!
//! Realtime channel multiplexer for chat clients, plus the pieces the
//! diagnostic binaries share.
//!
//! ## Architecture
//!
//! - **channelsocket**: the multiplexer (re-exported from workspace)
//! - **config**: YAML configuration for the `channel_probe` binary
//! - **bin_common**: Common utilities for binary executables (CLI, logging)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use chat_socket::bin_common::{config_path, init_tracing};
//! use chat_socket::config::ProbeConfig;
//! ```

// Re-export workspace library for convenience
pub use channelsocket;

pub mod config;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{config_path, resolve_config_path};
    pub use logging::init_tracing;
}
