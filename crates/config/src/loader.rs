use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{ConfigError, CsConfig, env::apply_env_overrides};

const CONFIG_DIR: &str = ".cs";
const CONFIG_FILE: &str = "config";
const TOKEN_STORE_FILE: &str = "access-tokens.json";

/// `~/.cs`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(CONFIG_DIR))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// `~/.cs/config`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// `~/.cs/access-tokens.json`
pub fn default_token_store_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(TOKEN_STORE_FILE))
}

/// Loads the configuration file and applies environment overrides.
pub fn load_config(path: &Path) -> Result<CsConfig, ConfigError> {
    load_config_from_sources(
        path,
        |p| std::fs::read_to_string(p),
        |key| std::env::var(key).ok(),
    )
}

/// Like [`load_config`], with injectable file and environment access.
pub fn load_config_from_sources<R, E>(
    path: &Path,
    read_file: R,
    env_lookup: E,
) -> Result<CsConfig, ConfigError>
where
    R: Fn(&Path) -> io::Result<String>,
    E: Fn(&str) -> Option<String>,
{
    let text = match read_file(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::NotConfigured {
                path: path.to_path_buf(),
            });
        },
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        },
    };

    let mut config: CsConfig =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    apply_env_overrides(&mut config, env_lookup)?;

    debug!(
        path = %path.display(),
        providers = config.providers.len(),
        no_ssl_validation = config.no_ssl_validation,
        "loaded configuration"
    );
    Ok(config)
}
