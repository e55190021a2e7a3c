use std::{path::PathBuf, time::Duration};

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    chrono::{DateTime, SubsecRound, TimeDelta, Utc},
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize, Serializer},
    url::Url,
};

use crate::ports::PortCandidateRange;

/// How long the callback listener waits for the browser redirect by default.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Identity and OAuth2 endpoints of one configured provider (VCP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub id: u32,
    pub base_url: Url,
    pub client_id: String,
    pub auth_endpoint: Url,
    pub token_endpoint: Url,
    /// Callback URL template; its port is replaced by the listener's port.
    pub callback_url: Url,
}

/// Certificate trust applied to every outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    #[default]
    System,
    /// Certificate and hostname verification disabled.
    Insecure,
    /// PEM files trusted in addition to the platform roots.
    TrustedCertificates(Vec<PathBuf>),
}

/// Per-login anti-forgery and replay-protection values.
#[derive(Debug, Clone)]
pub struct AuthorizationState {
    pub state: SecretString,
    pub nonce: SecretString,
}

impl AuthorizationState {
    pub fn generate() -> Self {
        Self {
            state: random_token(),
            nonce: random_token(),
        }
    }
}

fn random_token() -> SecretString {
    SecretString::new(URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>()))
}

/// Authorization code delivered by the provider's redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationCode(SecretString);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(SecretString::new(code.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Tokens issued by a token endpoint, before they are bound to a provider.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: SecretString,
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    pub lifetime: TimeDelta,
}

/// Token set held for one provider, as written to the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcpToken {
    pub vcp_base_url: String,
    #[serde(serialize_with = "expose")]
    pub access_token: SecretString,
    #[serde(serialize_with = "expose")]
    pub id_token: SecretString,
    #[serde(serialize_with = "expose")]
    pub refresh_token: SecretString,
    /// Absolute expiry, stored as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl PartialEq for VcpToken {
    fn eq(&self, other: &Self) -> bool {
        self.vcp_base_url == other.vcp_base_url
            && self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.id_token.expose_secret() == other.id_token.expose_secret()
            && self.refresh_token.expose_secret() == other.refresh_token.expose_secret()
            && self.expires == other.expires
    }
}

impl Eq for VcpToken {}

impl VcpToken {
    /// Binds freshly issued tokens to a provider. Expiry is `issued_at` plus
    /// the token lifetime, truncated to the millisecond precision of the store.
    pub fn issued(base_url: &Url, issued_at: DateTime<Utc>, tokens: IssuedTokens) -> Self {
        let expires = issued_at
            .checked_add_signed(tokens.lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .trunc_subsecs(3);
        Self {
            vcp_base_url: base_url.to_string(),
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    /// Time left until expiry; negative once expired.
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires - now
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}

/// Everything a login or token store operation needs: the configured
/// providers, a TLS-configured HTTP client and the token store location.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub providers: Vec<ProviderIdentity>,
    pub http: reqwest::Client,
    pub token_store_path: PathBuf,
}

impl AuthContext {
    /// Provider whose base URL matches `base_url` (as stored in a token).
    pub fn provider_for(&self, base_url: &str) -> Option<&ProviderIdentity> {
        let wanted = Url::parse(base_url).ok()?;
        self.providers.iter().find(|p| p.base_url == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOptions {
    pub callback_ports: PortCandidateRange,
    pub callback_timeout: Duration,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            callback_ports: PortCandidateRange::default(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}
