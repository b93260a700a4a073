//! Config path resolution for `channel_probe`
//!
//! The first command line argument wins, then `PROBE_CONFIG_PATH`, then
//! [`DEFAULT_CONFIG_PATH`].

use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/probe.yaml";

pub const CONFIG_PATH_ENV: &str = "PROBE_CONFIG_PATH";

/// Resolve the config path from the process arguments and environment
///
/// # Examples
/// ```
/// let path = chat_socket::bin_common::config_path();
/// assert!(!path.as_os_str().is_empty());
/// ```
pub fn config_path() -> PathBuf {
    resolve_config_path(
        std::env::args().nth(1),
        std::env::var(CONFIG_PATH_ENV).ok(),
    )
}

/// Pick the config path from an explicit argument or an env override
pub fn resolve_config_path(arg: Option<String>, env_override: Option<String>) -> PathBuf {
    arg.or(env_override)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}
