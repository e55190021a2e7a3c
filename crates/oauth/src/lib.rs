//! Browser-based OAuth2 / OpenID Connect login against the configured
//! providers (VCPs) and the local access token store.

pub mod browser;
pub mod callback_server;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod login;
pub mod ports;
pub mod storage;
pub mod tls;
pub mod types;

pub use {
    browser::{BrowserLauncher, SystemBrowser},
    callback_server::CallbackServer,
    error::{
        BindError, BrowserLaunchError, CallbackError, ExchangeError, LoginError, StoreIoError,
        TlsError, TokenStoreError,
    },
    flow::ProviderLoginSession,
    login::LoginOrchestrator,
    ports::{InvalidPortRange, PortCandidateRange},
    storage::TokenStore,
    tls::build_http_client,
    types::{
        AuthContext, AuthorizationCode, AuthorizationState, DEFAULT_CALLBACK_TIMEOUT,
        IssuedTokens, LoginOptions, ProviderIdentity, TlsPolicy, VcpToken,
    },
};
