//! Configuration for the `cs` CLI.
//!
//! Read from `~/.cs/config` (JSON), with per-provider OAuth2 settings
//! overridable through `CS_*` environment variables.

pub mod env;
pub mod loader;
pub mod schema;

use std::{io, path::PathBuf};

pub use {
    loader::{
        config_dir, default_config_path, default_token_store_path, load_config,
        load_config_from_sources,
    },
    schema::{CsConfig, VcpConfig},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration found at {}; configure the CLI first", .path.display())]
    NotConfigured { path: PathBuf },
    #[error("failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
    #[error("no provider with id {0} is configured")]
    UnknownProvider(u32),
    #[error("unable to determine the home directory")]
    NoHomeDirectory,
}
