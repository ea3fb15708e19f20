// navforge - Shared Library
// Support code used by the navigation library and the navgen tool:
// logging bootstrap, INI configuration and binary buffers.

pub mod config;
pub mod log;
pub mod util;

/// Default configuration file name used by the tools
pub const DEFAULT_CONFIG_FILE: &str = "navgen.conf";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "Navgen_";
