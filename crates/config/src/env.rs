use url::Url;

use crate::{ConfigError, CsConfig};

pub const NO_SSL_VALIDATION_ENV: &str = "CS_NO_SSL_VALIDATION";

/// Applies `CS_NO_SSL_VALIDATION` and the per-provider
/// `CS_VCP_<id>_OAUTH2_*` overrides on top of the file contents.
pub(crate) fn apply_env_overrides<F>(config: &mut CsConfig, env_lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env_lookup(NO_SSL_VALIDATION_ENV) {
        config.no_ssl_validation = parse_bool(NO_SSL_VALIDATION_ENV, &value)?;
    }

    for provider in &mut config.providers {
        let id = provider.id;
        let key = |suffix: &str| format!("CS_VCP_{id}_{suffix}");

        if let Some(value) = env_lookup(&key("OAUTH2_CLIENT_ID")) {
            provider.oauth2_client_id = value;
        }
        if let Some(url) = lookup_url(&env_lookup, &key("OAUTH2_AUTH_ENDPOINT_URI"))? {
            provider.oauth2_auth_endpoint_uri = url;
        }
        if let Some(url) = lookup_url(&env_lookup, &key("OAUTH2_TOKEN_ENDPOINT_URI"))? {
            provider.oauth2_token_endpoint_uri = url;
        }
        if let Some(url) = lookup_url(&env_lookup, &key("OAUTH2_CALLBACK_URL"))? {
            provider.oauth2_callback_url = url;
        }
    }
    Ok(())
}

fn lookup_url<F>(env_lookup: &F, key: &str) -> Result<Option<Url>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    env_lookup(key)
        .map(|value| {
            Url::parse(value.trim()).map_err(|e| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::VcpConfig, std::collections::HashMap};

    fn config() -> CsConfig {
        CsConfig {
            providers: vec![VcpConfig {
                id: 1,
                base_url: Url::parse("https://vcp-1.example.com").unwrap(),
                oauth2_client_id: "cs-jar".into(),
                oauth2_auth_endpoint_uri: Url::parse("https://vcp-1.example.com/auth").unwrap(),
                oauth2_token_endpoint_uri: Url::parse("https://vcp-1.example.com/token").unwrap(),
                oauth2_callback_url: Url::parse("http://127.0.0.1/callback").unwrap(),
            }],
            ..CsConfig::default()
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_provider_overrides() {
        let mut config = config();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("CS_VCP_1_OAUTH2_CLIENT_ID", "override-client"),
                ("CS_VCP_1_OAUTH2_TOKEN_ENDPOINT_URI", "https://idp.example.com/token"),
                ("CS_VCP_1_OAUTH2_CALLBACK_URL", "http://localhost/cb"),
                ("CS_VCP_2_OAUTH2_CLIENT_ID", "other-provider"),
            ]),
        )
        .unwrap();

        let provider = &config.providers[0];
        assert_eq!(provider.oauth2_client_id, "override-client");
        assert_eq!(
            provider.oauth2_token_endpoint_uri.as_str(),
            "https://idp.example.com/token"
        );
        assert_eq!(provider.oauth2_callback_url.as_str(), "http://localhost/cb");
        assert_eq!(
            provider.oauth2_auth_endpoint_uri.as_str(),
            "https://vcp-1.example.com/auth"
        );
    }

    #[test]
    fn test_no_ssl_validation_override() {
        let mut config = config();
        apply_env_overrides(&mut config, lookup(&[("CS_NO_SSL_VALIDATION", "TRUE")])).unwrap();
        assert!(config.no_ssl_validation);

        apply_env_overrides(&mut config, lookup(&[("CS_NO_SSL_VALIDATION", "0")])).unwrap();
        assert!(!config.no_ssl_validation);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = apply_env_overrides(&mut config(), lookup(&[("CS_NO_SSL_VALIDATION", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "CS_NO_SSL_VALIDATION"));

        let err = apply_env_overrides(
            &mut config(),
            lookup(&[("CS_VCP_1_OAUTH2_AUTH_ENDPOINT_URI", "not a url")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref value, .. } if value == "not a url"));
    }
}
