use std::{collections::BTreeMap, io, path::PathBuf};

/// Failures opening the user's browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BrowserLaunchError {
    /// Browser launch process terminated with a non-zero exit code.
    #[error("browser launcher exited with a non-zero exit code")]
    NonZeroExitCode,
    /// Interrupted while waiting for the browser launch process to finish.
    #[error("interrupted while waiting for the browser launcher")]
    Interrupted,
    /// No launch method available for the platform.
    #[error("no browser launch method available on this platform")]
    NotSupported,
    #[error("browser launch failed")]
    Generic,
}

/// Failures waiting for the provider's redirect to the callback listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The accepted callback request carried no `code` parameter.
    #[error("callback request did not contain an authorization code")]
    MissingAuthenticationCode,
    #[error("interrupted while waiting for the callback")]
    Interrupted,
    #[error("timed out waiting for the callback")]
    TimeOut,
    #[error("unexpected failure while waiting for the callback")]
    Unexpected,
}

/// Failures starting a callback listener.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The port is taken; the caller may retry on another candidate.
    #[error("callback port {port} is already in use")]
    Conflict {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to start callback listener on {addr}: {source}")]
    Other {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("callback URL `{0}` cannot be used for a local listener")]
    InvalidCallbackUrl(String),
}

/// Failures talking to a provider's token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The provider answered with an OAuth error response.
    #[error("token endpoint rejected the request with `{error}` (HTTP {status}){}", describe(.description))]
    Provider {
        status: u16,
        error: String,
        description: Option<String>,
    },
    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed token response: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("token response did not include `{0}`")]
    MissingField(&'static str),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|text| format!(": {text}"))
        .unwrap_or_default()
}

/// Failures building the HTTP client for a TLS trust configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read trusted certificate {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("trusted certificate file {} contains no PEM certificate", .path.display())]
    Empty { path: PathBuf },
    #[error("invalid trusted certificate in {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Underlying cause of a token store read or write failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreIoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures loading, persisting or refreshing the token store.
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("reading token store failed: {0}")]
    ReadingTokenStoreFailed(#[source] StoreIoError),
    #[error("persisting token store failed: {0}")]
    PersistingTokenStoreFailed(#[source] StoreIoError),
    /// No configured provider matches the token's base URL.
    #[error("no configuration available for provider {0}")]
    VcpConfigurationUnavailable(String),
    #[error("refreshing token for provider {base_url} failed: {source}")]
    RefreshingTokenFailed {
        base_url: String,
        #[source]
        source: ExchangeError,
    },
    /// Per-provider failures of a refresh, keyed by provider base URL.
    #[error("refreshing tokens failed: {}", describe_failures(.0))]
    ByToken(BTreeMap<String, TokenStoreError>),
}

fn describe_failures(failures: &BTreeMap<String, TokenStoreError>) -> String {
    failures
        .values()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failures of an interactive login.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("could not open a browser for provider {provider}: {source}")]
    BrowserLaunch {
        provider: u32,
        #[source]
        source: BrowserLaunchError,
    },
    #[error("authorization failed for provider {provider}: {source}")]
    Callback {
        provider: u32,
        #[source]
        source: CallbackError,
    },
    #[error("no callback port available for provider {provider}")]
    PortRangeExhaustion { provider: u32 },
    #[error("could not exchange code for token for provider {provider}: {source}")]
    FailedToGetAccessToken {
        provider: u32,
        #[source]
        source: ExchangeError,
    },
    #[error("login failed unexpectedly for provider {provider}: {source}")]
    Unexpected {
        provider: u32,
        #[source]
        source: BindError,
    },
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),
}
