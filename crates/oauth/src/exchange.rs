//! Token endpoint requests: authorization code exchange and refresh.

use {
    chrono::TimeDelta,
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Deserializer},
    tracing::{debug, warn},
    url::Url,
};

use crate::{
    error::ExchangeError,
    types::{AuthorizationCode, IssuedTokens, ProviderIdentity, VcpToken},
};

/// Scope requested when refreshing tokens.
pub const REFRESH_SCOPE: &str = "offline openid";

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<SecretString>,
    id_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Exchanges an authorization code for a full token set.
///
/// `redirect_uri` must be the exact callback URL the code was issued for.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    provider: &ProviderIdentity,
    code: &AuthorizationCode,
    redirect_uri: &Url,
) -> Result<IssuedTokens, ExchangeError> {
    debug!(provider = provider.id, endpoint = %provider.token_endpoint, "exchanging authorization code");
    let response = request_tokens(http, &provider.token_endpoint, &[
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", provider.client_id.as_str()),
    ])
    .await?;

    Ok(IssuedTokens {
        access_token: required(response.access_token, "access_token")?,
        id_token: required(response.id_token, "id_token")?,
        refresh_token: required(response.refresh_token, "refresh_token")?,
        lifetime: lifetime(response.expires_in),
    })
}

/// Uses the stored refresh token to obtain new tokens.
///
/// Refresh and ID tokens the provider does not reissue are carried over
/// from `current`.
pub async fn refresh_tokens(
    http: &reqwest::Client,
    provider: &ProviderIdentity,
    current: &VcpToken,
) -> Result<IssuedTokens, ExchangeError> {
    debug!(provider = provider.id, endpoint = %provider.token_endpoint, "refreshing access token");
    let response = request_tokens(http, &provider.token_endpoint, &[
        ("grant_type", "refresh_token"),
        ("refresh_token", current.refresh_token.expose_secret().as_str()),
        ("client_id", provider.client_id.as_str()),
        ("scope", REFRESH_SCOPE),
    ])
    .await?;

    Ok(IssuedTokens {
        access_token: required(response.access_token, "access_token")?,
        id_token: non_empty(response.id_token).unwrap_or_else(|| current.id_token.clone()),
        refresh_token: non_empty(response.refresh_token)
            .unwrap_or_else(|| current.refresh_token.clone()),
        lifetime: lifetime(response.expires_in),
    })
}

async fn request_tokens(
    http: &reqwest::Client,
    endpoint: &Url,
    form: &[(&str, &str)],
) -> Result<TokenResponse, ExchangeError> {
    let response = http
        .post(endpoint.clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        warn!(%endpoint, status = status.as_u16(), "token endpoint returned an error");
        return Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => ExchangeError::Provider {
                status: status.as_u16(),
                error: err.error,
                description: err.error_description,
            },
            Err(_) => ExchangeError::Status {
                status: status.as_u16(),
                body,
            },
        });
    }

    serde_json::from_str(&body).map_err(ExchangeError::Malformed)
}

fn non_empty(value: Option<SecretString>) -> Option<SecretString> {
    value.filter(|v| !v.expose_secret().trim().is_empty())
}

fn required(
    value: Option<SecretString>,
    field: &'static str,
) -> Result<SecretString, ExchangeError> {
    non_empty(value).ok_or(ExchangeError::MissingField(field))
}

fn lifetime(expires_in: Option<i64>) -> TimeDelta {
    TimeDelta::try_seconds(expires_in.unwrap_or(DEFAULT_LIFETIME_SECS).max(0))
        .unwrap_or(TimeDelta::MAX)
}

/// Accepts `expires_in` as a JSON number or a numeric string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}
