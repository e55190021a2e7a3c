use {
    chrono::Utc,
    secrecy::ExposeSecret,
    tracing::{debug, error, info, warn},
    url::Url,
};

use crate::{
    browser::BrowserLauncher,
    callback_server::CallbackServer,
    error::{BindError, LoginError},
    exchange::exchange_authorization_code,
    ports::PortCandidateRange,
    types::{AuthorizationCode, AuthorizationState, LoginOptions, ProviderIdentity, VcpToken},
};

/// Scopes requested in the authorization request.
pub const AUTHORIZATION_SCOPES: &str = "openid offline";

/// One interactive Authorization Code login against a single provider.
pub struct ProviderLoginSession<'a> {
    provider: &'a ProviderIdentity,
    http: &'a reqwest::Client,
    browser: &'a dyn BrowserLauncher,
    options: LoginOptions,
}

impl<'a> ProviderLoginSession<'a> {
    pub fn new(
        provider: &'a ProviderIdentity,
        http: &'a reqwest::Client,
        browser: &'a dyn BrowserLauncher,
        options: LoginOptions,
    ) -> Self {
        Self {
            provider,
            http,
            browser,
            options,
        }
    }

    /// Runs the login: bind a callback listener, open the browser, wait for
    /// the redirect and exchange the code. The listener is closed before any
    /// outcome is returned.
    pub async fn run(&self) -> Result<VcpToken, LoginError> {
        let authorization = AuthorizationState::generate();
        let (mut listener, callback_url) = self.bind_listener(&authorization).await?;
        info!(provider = self.provider.id, %callback_url, "waiting for browser login");

        let code = self
            .authorize(&mut listener, &callback_url, &authorization)
            .await;
        listener.close().await;
        let code = code?;

        let issued_at = Utc::now();
        let tokens = exchange_authorization_code(self.http, self.provider, &code, &callback_url)
            .await
            .map_err(|source| {
                error!(provider = self.provider.id, error = %source, "token exchange failed");
                LoginError::FailedToGetAccessToken {
                    provider: self.provider.id,
                    source,
                }
            })?;

        info!(provider = self.provider.id, "login succeeded");
        Ok(VcpToken::issued(&self.provider.base_url, issued_at, tokens))
    }

    async fn bind_listener(
        &self,
        authorization: &AuthorizationState,
    ) -> Result<(CallbackServer, Url), LoginError> {
        let bound = bind_first_free(self.options.callback_ports, move |port| async move {
            let callback_url = callback_url_for(&self.provider.callback_url, port)?;
            let listener = CallbackServer::bind(
                &callback_url,
                authorization.state.clone(),
                self.options.callback_timeout,
            )
            .await?;
            Ok::<_, BindError>((listener, callback_url))
        })
        .await
        .map_err(|source| self.unexpected(source))?;

        bound.ok_or_else(|| {
            warn!(
                provider = self.provider.id,
                ports = %self.options.callback_ports,
                "no free callback port"
            );
            LoginError::PortRangeExhaustion {
                provider: self.provider.id,
            }
        })
    }

    async fn authorize(
        &self,
        listener: &mut CallbackServer,
        callback_url: &Url,
        authorization: &AuthorizationState,
    ) -> Result<AuthorizationCode, LoginError> {
        let url = authorization_url(self.provider, callback_url, authorization);
        debug!(provider = self.provider.id, %url, "authorization request");

        self.browser
            .browse(&url)
            .await
            .map_err(|source| LoginError::BrowserLaunch {
                provider: self.provider.id,
                source,
            })?;
        listener
            .get_authorization_code()
            .await
            .map_err(|source| LoginError::Callback {
                provider: self.provider.id,
                source,
            })
    }

    fn unexpected(&self, source: BindError) -> LoginError {
        error!(provider = self.provider.id, error = %source, "cannot start callback listener");
        LoginError::Unexpected {
            provider: self.provider.id,
            source,
        }
    }
}

/// Tries `bind` on each candidate port, lowest first, moving past ports that
/// are in use. `Ok(None)` once every candidate was taken; any other bind
/// failure ends the search.
async fn bind_first_free<T, F, Fut>(
    ports: PortCandidateRange,
    mut bind: F,
) -> Result<Option<T>, BindError>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = Result<T, BindError>>,
{
    let mut candidates = Some(ports);
    while let Some(range) = candidates {
        let port = range.lowest();
        match bind(port).await {
            Ok(bound) => return Ok(Some(bound)),
            Err(BindError::Conflict { .. }) => {
                debug!(port, remaining = range.length() - 1, "callback port in use, trying next");
                candidates = range.consume_lower();
            },
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Authorization request URL for the provider's authorization endpoint.
pub fn authorization_url(
    provider: &ProviderIdentity,
    callback_url: &Url,
    authorization: &AuthorizationState,
) -> Url {
    let mut url = provider.auth_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &provider.client_id)
        .append_pair("redirect_uri", callback_url.as_str())
        .append_pair("scope", AUTHORIZATION_SCOPES)
        .append_pair("state", authorization.state.expose_secret())
        .append_pair("nonce", authorization.nonce.expose_secret());
    url
}

/// The configured callback URL with its port replaced.
fn callback_url_for(template: &Url, port: u16) -> Result<Url, BindError> {
    let mut url = template.clone();
    url.set_port(Some(port))
        .map_err(|()| BindError::InvalidCallbackUrl(template.to_string()))?;
    Ok(url)
}
