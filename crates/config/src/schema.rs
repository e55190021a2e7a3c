use std::path::PathBuf;

use {
    serde::{Deserialize, Serialize},
    url::Url,
};

use crate::ConfigError;

/// Contents of `~/.cs/config`.
///
/// Only the fields needed for login are modelled; anything else in the file
/// is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsConfig {
    /// Disables TLS certificate and hostname verification.
    #[serde(default)]
    pub no_ssl_validation: bool,
    /// PEM files trusted in addition to the platform's root certificates.
    #[serde(default)]
    pub trusted_certificates: Vec<PathBuf>,
    #[serde(default)]
    pub providers: Vec<VcpConfig>,
}

impl CsConfig {
    pub fn provider(&self, id: u32) -> Result<&VcpConfig, ConfigError> {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .ok_or(ConfigError::UnknownProvider(id))
    }
}

/// One Virtual Cloud Provider and its OAuth2 client registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcpConfig {
    pub id: u32,
    pub base_url: Url,
    pub oauth2_client_id: String,
    pub oauth2_auth_endpoint_uri: Url,
    pub oauth2_token_endpoint_uri: Url,
    /// Template; the login replaces its port.
    pub oauth2_callback_url: Url,
}
